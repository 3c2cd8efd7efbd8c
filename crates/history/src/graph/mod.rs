//! The branching history graph.
//!
//! A persistent, mutable tree of immutable snapshots, stored as an
//! arena (stable id → node map) rather than pointer-linked nodes so
//! traversal, serialization, and removal are plain index operations.
//!
//! # Invariants
//!
//! - Exactly one node has `parent_id = None`: the root.
//! - Every non-root node's parent exists and lists it in `children`.
//! - `cursor_id` and `root_id` always resolve.
//! - The structure is a tree: no cycles, a single path to the root.
//!
//! Pushing after navigating to an ancestor never overwrites forward
//! history; it appends a sibling branch. This is the origin of
//! multiple redo destinations.


use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};
use uuid::Uuid;
use weave_primitives::StateSnapshot;

use crate::action::ActionMeta;
use crate::error::GraphError;

/// Stable identifier of a history node, unique across sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(Uuid);

impl NodeId {
	/// Allocates a fresh random id.
	pub fn new() -> Self {
		Self(Uuid::new_v4())
	}

	/// Builds an id from raw bits. Intended for deterministic tests.
	pub fn from_u128(bits: u128) -> Self {
		Self(Uuid::from_u128(bits))
	}
}

impl Default for NodeId {
	fn default() -> Self {
		Self::new()
	}
}

impl std::fmt::Display for NodeId {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		self.0.fmt(f)
	}
}

impl std::str::FromStr for NodeId {
	type Err = uuid::Error;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Uuid::parse_str(s).map(Self)
	}
}

/// One entry in the history tree.
///
/// Immutable once inserted except for `children` (append-only while
/// the node lives) and wholesale replacement during reconciliation.
#[derive(Debug, Clone)]
pub struct HistoryNode {
	/// This node's id.
	pub id: NodeId,
	/// Parent node; `None` only for the root.
	pub parent_id: Option<NodeId>,
	/// Child branches in creation order.
	pub(crate) children: Vec<NodeId>,
	/// Timeline label.
	pub label: String,
	/// Document state after the action this node records.
	pub state: StateSnapshot,
	/// Creation time, used for FIFO eviction ordering.
	pub created_at: DateTime<Utc>,
	/// Classified action that produced this entry, if known.
	pub meta: Option<ActionMeta>,
}

impl HistoryNode {
	/// Builds a leaf node. Used when rehydrating or merging; ordinary
	/// entries are allocated by [`HistoryGraph::push`].
	pub fn leaf(
		id: NodeId,
		parent_id: Option<NodeId>,
		label: impl Into<String>,
		state: StateSnapshot,
		created_at: DateTime<Utc>,
		meta: Option<ActionMeta>,
	) -> Self {
		Self {
			id,
			parent_id,
			children: Vec::new(),
			label: label.into(),
			state,
			created_at,
			meta,
		}
	}

	/// Child branches in creation order.
	pub fn children(&self) -> &[NodeId] {
		&self.children
	}
}

/// Result of a [`HistoryGraph::push`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
	/// A new node was created and the cursor moved onto it.
	Recorded(NodeId),
	/// The snapshot was hash-equal to the cursor's state; nothing
	/// changed.
	Unchanged,
}

/// The versioned snapshot tree.
#[derive(Debug, Clone)]
pub struct HistoryGraph {
	root_id: NodeId,
	cursor_id: NodeId,
	nodes: HashMap<NodeId, HistoryNode>,
	/// Root-to-cursor path, recomputed lazily after cursor mutations.
	cached_path: Option<Vec<NodeId>>,
}

impl HistoryGraph {
	/// Creates a single-node graph: root = cursor = the given state.
	pub fn new(state: StateSnapshot) -> Self {
		let id = NodeId::new();
		let root = HistoryNode::leaf(id, None, "Initial state", state, Utc::now(), None);
		let mut nodes = HashMap::new();
		nodes.insert(id, root);
		Self {
			root_id: id,
			cursor_id: id,
			nodes,
			cached_path: None,
		}
	}

	/// Rehydrates a graph from its parts, validating every tree
	/// invariant. Used by the wire decoder.
	pub fn from_parts(
		root_id: NodeId,
		cursor_id: NodeId,
		nodes: HashMap<NodeId, HistoryNode>,
	) -> Result<Self, GraphError> {
		let root = nodes
			.get(&root_id)
			.ok_or_else(|| GraphError::Corrupt("root id does not resolve".into()))?;
		if root.parent_id.is_some() {
			return Err(GraphError::Corrupt("root has a parent".into()));
		}
		if !nodes.contains_key(&cursor_id) {
			return Err(GraphError::Corrupt("cursor id does not resolve".into()));
		}

		// Walk the tree from the root: every node must be reached
		// exactly once, through a parent that it agrees on.
		let mut visited = std::collections::HashSet::new();
		visited.insert(root_id);
		let mut stack = vec![root_id];
		while let Some(current) = stack.pop() {
			let Some(node) = nodes.get(&current) else {
				continue;
			};
			for child_id in node.children.clone() {
				let Some(child) = nodes.get(&child_id) else {
					return Err(GraphError::Corrupt(format!(
						"dangling child id {child_id}"
					)));
				};
				if child.parent_id != Some(current) {
					return Err(GraphError::Corrupt(format!(
						"node {child_id} disagrees with its parent"
					)));
				}
				if !visited.insert(child_id) {
					return Err(GraphError::Corrupt(format!(
						"node {child_id} reached twice (cycle or double link)"
					)));
				}
				stack.push(child_id);
			}
		}
		if visited.len() != nodes.len() {
			return Err(GraphError::Corrupt(format!(
				"{} nodes unreachable from the root",
				nodes.len() - visited.len()
			)));
		}

		Ok(Self {
			root_id,
			cursor_id,
			nodes,
			cached_path: None,
		})
	}

	/// The root node's id.
	pub fn root_id(&self) -> NodeId {
		self.root_id
	}

	/// The cursor node's id. The cursor's state equals the live
	/// document state.
	pub fn cursor_id(&self) -> NodeId {
		self.cursor_id
	}

	/// Number of nodes in the graph.
	pub fn len(&self) -> usize {
		self.nodes.len()
	}

	/// Always `false`: a graph holds at least its root.
	pub fn is_empty(&self) -> bool {
		self.nodes.is_empty()
	}

	/// Looks up a node by id.
	pub fn get(&self, id: NodeId) -> Option<&HistoryNode> {
		self.nodes.get(&id)
	}

	/// Iterates over all nodes in arbitrary order.
	pub fn iter(&self) -> impl Iterator<Item = &HistoryNode> {
		self.nodes.values()
	}

	/// The cursor node's state, if the cursor resolves.
	pub fn cursor_state(&self) -> Option<&StateSnapshot> {
		self.nodes.get(&self.cursor_id).map(|n| &n.state)
	}

	/// Returns `true` when both anchor ids resolve and the root is
	/// parentless. The controller checks this on every entry point
	/// and resynthesizes a root instead of failing when it is false.
	pub fn is_coherent(&self) -> bool {
		self.nodes.contains_key(&self.cursor_id)
			&& self
				.nodes
				.get(&self.root_id)
				.is_some_and(|root| root.parent_id.is_none())
	}

	/// Records a new state as a child of the cursor and moves the
	/// cursor onto it.
	///
	/// Idempotent on content: a snapshot hash-equal to the cursor's
	/// state is a no-op. Pushing from an ancestor creates a sibling
	/// branch; existing forward history is never overwritten.
	pub fn push(
		&mut self,
		label: impl Into<String>,
		state: StateSnapshot,
		meta: Option<ActionMeta>,
	) -> Result<PushOutcome, GraphError> {
		let cursor = self
			.nodes
			.get(&self.cursor_id)
			.ok_or(GraphError::UnknownNode(self.cursor_id))?;
		if cursor.state.hash() == state.hash() {
			trace!(cursor = %self.cursor_id, "push: state unchanged, no-op");
			return Ok(PushOutcome::Unchanged);
		}

		let id = NodeId::new();
		let label = label.into();
		let node = HistoryNode::leaf(id, Some(self.cursor_id), label, state, Utc::now(), meta);
		trace!(
			id = %id,
			parent = %self.cursor_id,
			label = %node.label,
			nodes = self.nodes.len() + 1,
			"push: recorded"
		);
		if let Some(parent) = self.nodes.get_mut(&self.cursor_id) {
			parent.children.push(id);
		}
		self.nodes.insert(id, node);
		self.cursor_id = id;
		self.cached_path = None;
		Ok(PushOutcome::Recorded(id))
	}

	/// Moves the cursor to its parent and returns the parent's state.
	pub fn undo(&mut self) -> Result<StateSnapshot, GraphError> {
		let cursor = self
			.nodes
			.get(&self.cursor_id)
			.ok_or(GraphError::UnknownNode(self.cursor_id))?;
		let parent_id = cursor.parent_id.ok_or(GraphError::AtRoot)?;
		let parent = self
			.nodes
			.get(&parent_id)
			.ok_or(GraphError::UnknownNode(parent_id))?;
		trace!(from = %self.cursor_id, to = %parent_id, "undo");
		self.cursor_id = parent_id;
		self.cached_path = None;
		Ok(parent.state.clone())
	}

	/// Moves the cursor to a child and returns that child's state.
	///
	/// With no `branch` the first-created child is taken. An explicit
	/// `branch` must be a direct child of the cursor.
	pub fn redo(&mut self, branch: Option<NodeId>) -> Result<StateSnapshot, GraphError> {
		let cursor = self
			.nodes
			.get(&self.cursor_id)
			.ok_or(GraphError::UnknownNode(self.cursor_id))?;
		if cursor.children.is_empty() {
			return Err(GraphError::NoChildren);
		}
		let target = match branch {
			Some(id) => {
				if !cursor.children.contains(&id) {
					return Err(GraphError::InvalidBranch(id));
				}
				id
			}
			None => cursor.children[0],
		};
		let node = self
			.nodes
			.get(&target)
			.ok_or(GraphError::UnknownNode(target))?;
		trace!(from = %self.cursor_id, to = %target, "redo");
		self.cursor_id = target;
		self.cached_path = None;
		Ok(node.state.clone())
	}

	/// Redo destinations from the cursor: its children in creation
	/// order. More than one means the history has branched here.
	pub fn redo_targets(&self) -> &[NodeId] {
		self.nodes
			.get(&self.cursor_id)
			.map(|n| n.children.as_slice())
			.unwrap_or_default()
	}

	/// Root-to-cursor path. Cached; invalidated by every mutation
	/// that can move the cursor or change connectivity.
	pub fn path_to_cursor(&mut self) -> &[NodeId] {
		if self.cached_path.is_none() {
			let mut path = Vec::new();
			let mut current = Some(self.cursor_id);
			while let Some(id) = current {
				path.push(id);
				current = self.nodes.get(&id).and_then(|n| n.parent_id);
			}
			path.reverse();
			self.cached_path = Some(path);
		}
		self.cached_path.as_deref().unwrap_or_default()
	}

	/// Depth of the cursor below the root (root alone = 1).
	pub fn depth(&self) -> usize {
		let mut depth = 0;
		let mut current = Some(self.cursor_id);
		while let Some(id) = current {
			depth += 1;
			current = self.nodes.get(&id).and_then(|n| n.parent_id);
		}
		depth
	}

	/// Number of nodes where the history forks.
	pub fn branch_count(&self) -> usize {
		self.nodes.values().filter(|n| n.children.len() > 1).count()
	}

	/// FIFO-prunes the graph down to `max_nodes` by repeated root
	/// promotion. Returns the number of nodes removed.
	///
	/// Each step promotes the old root's chronologically-first child
	/// to be the new root and deletes the old root together with the
	/// entire subtrees of its other children: only one branch can
	/// survive a single-root tree, and keeping the losers around as
	/// unreachable orphans would defeat the size limit. Stops when the
	/// root has no children; the sole remaining state is never
	/// discarded, so `max_nodes = 0` prunes to one node.
	pub fn prune_to_limit(&mut self, max_nodes: usize) -> usize {
		let mut removed = 0;
		while self.nodes.len() > max_nodes.max(1) {
			let Some(root) = self.nodes.get(&self.root_id) else {
				break;
			};
			if root.children.is_empty() {
				break;
			}
			let children = root.children.clone();
			let promoted = children
				.iter()
				.copied()
				.min_by_key(|id| {
					self.nodes
						.get(id)
						.map_or(DateTime::<Utc>::MAX_UTC, |n| n.created_at)
				})
				.unwrap_or(children[0]);

			for sibling in children.into_iter().filter(|c| *c != promoted) {
				let doomed = self.collect_subtree(sibling);
				removed += doomed.len();
				for id in doomed {
					self.nodes.remove(&id);
				}
			}

			let old_root = self.root_id;
			self.nodes.remove(&old_root);
			removed += 1;
			if let Some(new_root) = self.nodes.get_mut(&promoted) {
				new_root.parent_id = None;
			}
			self.root_id = promoted;
			if !self.nodes.contains_key(&self.cursor_id) {
				self.cursor_id = promoted;
			}
			debug!(evicted = %old_root, promoted = %promoted, nodes = self.nodes.len(), "prune: root promoted");
		}
		if removed > 0 {
			self.cached_path = None;
		}
		removed
	}

	/// Caps the graph to `max_nodes` by evicting one node at a time:
	/// always the chronologically oldest node that can go without
	/// breaking the tree. The root is evictable while it has exactly
	/// one child (the child is promoted); otherwise the oldest
	/// non-cursor leaf goes. The cursor itself is never evicted.
	///
	/// Unlike [`prune_to_limit`](Self::prune_to_limit) this removes
	/// exactly `len - max_nodes` nodes, so a capped projection of a
	/// branchy graph keeps its surviving branches intact. Used for
	/// outgoing payload budgets, where dropping whole branches would
	/// overshoot the excess.
	pub fn cap_oldest(&mut self, max_nodes: usize) -> usize {
		let max_nodes = max_nodes.max(1);
		let mut removed = 0;
		while self.nodes.len() > max_nodes {
			let victim = self
				.nodes
				.values()
				.filter(|n| {
					if n.id == self.root_id {
						n.children.len() == 1 && self.cursor_id != self.root_id
					} else {
						n.children.is_empty() && n.id != self.cursor_id
					}
				})
				.min_by_key(|n| n.created_at)
				.map(|n| n.id);
			let Some(victim) = victim else {
				break;
			};
			if victim == self.root_id {
				let Some(promoted) = self
					.nodes
					.get(&victim)
					.and_then(|n| n.children.first().copied())
				else {
					break;
				};
				self.nodes.remove(&victim);
				if let Some(new_root) = self.nodes.get_mut(&promoted) {
					new_root.parent_id = None;
				}
				self.root_id = promoted;
			} else {
				let parent_id = self.nodes.get(&victim).and_then(|n| n.parent_id);
				self.nodes.remove(&victim);
				if let Some(parent) = parent_id.and_then(|p| self.nodes.get_mut(&p)) {
					parent.children.retain(|c| *c != victim);
				}
			}
			removed += 1;
		}
		if removed > 0 {
			self.cached_path = None;
			trace!(removed, nodes = self.nodes.len(), "cap: oldest evicted");
		}
		removed
	}

	/// Removes a node and its entire subtree. The root is never
	/// removable. If the cursor is inside the removed subtree it is
	/// reassigned to the removed node's surviving parent.
	///
	/// Returns the number of nodes removed.
	pub fn remove_subtree(&mut self, id: NodeId) -> Result<usize, GraphError> {
		if id == self.root_id {
			return Err(GraphError::RemoveRoot);
		}
		let node = self.nodes.get(&id).ok_or(GraphError::UnknownNode(id))?;
		let parent_id = node.parent_id;

		let doomed = self.collect_subtree(id);
		if doomed.contains(&self.cursor_id) {
			// id != root, so the parent exists and survives.
			self.cursor_id = parent_id.unwrap_or(self.root_id);
		}
		if let Some(pid) = parent_id
			&& let Some(parent) = self.nodes.get_mut(&pid)
		{
			parent.children.retain(|c| *c != id);
		}
		let count = doomed.len();
		for d in &doomed {
			self.nodes.remove(d);
		}
		self.cached_path = None;
		debug!(removed = count, at = %id, "remove_subtree");
		Ok(count)
	}

	/// Writes a reconciled node into the graph: overwrite in place
	/// when the id exists, otherwise attach a new leaf under its
	/// recorded parent (falling back to the cursor when that parent
	/// is not part of this graph).
	pub fn merge_external(
		&mut self,
		id: NodeId,
		parent_id: Option<NodeId>,
		label: impl Into<String>,
		state: StateSnapshot,
		created_at: DateTime<Utc>,
		meta: Option<ActionMeta>,
	) {
		self.cached_path = None;
		if let Some(existing) = self.nodes.get_mut(&id) {
			existing.state = state;
			existing.label = label.into();
			existing.created_at = created_at;
			existing.meta = meta;
			return;
		}
		let attach = parent_id
			.filter(|p| self.nodes.contains_key(p))
			.unwrap_or(self.cursor_id);
		if let Some(parent) = self.nodes.get_mut(&attach) {
			parent.children.push(id);
		}
		self.nodes.insert(
			id,
			HistoryNode::leaf(id, Some(attach), label, state, created_at, meta),
		);
	}

	/// Moves the cursor to an existing node.
	pub fn set_cursor(&mut self, id: NodeId) -> Result<(), GraphError> {
		if !self.nodes.contains_key(&id) {
			return Err(GraphError::UnknownNode(id));
		}
		self.cursor_id = id;
		self.cached_path = None;
		Ok(())
	}

	/// Test hook: moves the cursor without validation to simulate a
	/// dangling anchor.
	#[cfg(test)]
	pub(crate) fn force_cursor_unchecked(&mut self, id: NodeId) {
		self.cursor_id = id;
		self.cached_path = None;
	}

	/// Collects `id` plus all descendants, depth-first.
	fn collect_subtree(&self, id: NodeId) -> Vec<NodeId> {
		let mut collected = Vec::new();
		let mut stack = vec![id];
		while let Some(current) = stack.pop() {
			collected.push(current);
			if let Some(node) = self.nodes.get(&current) {
				stack.extend(node.children.iter().copied());
			}
		}
		collected
	}
}
