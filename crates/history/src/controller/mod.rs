//! The history controller: public API and orchestration.
//!
//! Owns the graph (single writer), the classifier, the offline
//! buffer, the cache, and the write scheduler. The host injects two
//! ports and keeps a reference to the controller; there is no global
//! registration.
//!
//! ```text
//! HistoryController                 DocumentPort (host implements)
//! ┌───────────────────────┐         ┌──────────────────────────┐
//! │ graph / classifier    │◄───────►│ capture_snapshot()       │
//! │ buffer / cache        │         │ apply_snapshot()         │
//! │ scheduler             │         └──────────────────────────┘
//! │                       │         PersistencePort (transport)
//! │ undo()/redo()/...     │◄───────►  read / write / clear
//! └───────────────────────┘
//! ```
//!
//! Every entry point validates that the graph's anchors resolve and
//! resynthesizes a root from the live document when they do not:
//! structural corruption is a recoverable condition here, never a
//! user-visible error. Operation-not-applicable conditions come back
//! as `false`. Persistence failures are logged and swallowed; the
//! in-memory graph stays authoritative.


use std::time::Instant;

use tracing::{debug, info, trace, warn};
use weave_primitives::StateSnapshot;

use crate::action::ActionMeta;
use crate::classifier::{ClassifiedAction, EditClassifier};
use crate::config::HistoryConfig;
use crate::error::GraphError;
use crate::graph::{HistoryGraph, NodeId, PushOutcome};
use crate::persist::{
	LocalOfflineBuffer, OfflineDiffRecord, PersistencePort, SnapshotCache, WireGraph,
	WriteScheduler, reconcile,
};

/// Host-side document access: synchronously replace or read the live
/// entity collections.
pub trait DocumentPort {
	/// Replaces the live document state with a snapshot.
	fn apply_snapshot(&mut self, state: &StateSnapshot);

	/// Captures the live document state, hash included.
	fn capture_snapshot(&self) -> StateSnapshot;
}

/// One row of the history panel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimelineEntry {
	pub id: NodeId,
	pub label: String,
	pub created_at: chrono::DateTime<chrono::Utc>,
	pub is_cursor: bool,
}

/// A redo destination when history has branched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchOption {
	pub id: NodeId,
	pub label: String,
	pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Aggregate graph statistics surfaced with the timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryStats {
	pub node_count: usize,
	pub depth: usize,
	pub branch_count: usize,
}

/// Snapshot of the history surface for the UI.
#[derive(Debug, Clone)]
pub struct Timeline {
	/// Root-to-cursor path.
	pub entries: Vec<TimelineEntry>,
	/// Index of the cursor within `entries`. Because `entries` is the
	/// root-to-cursor path this is always the last index; the field
	/// exists for hosts that index rather than scan for `is_cursor`.
	pub current_index: usize,
	pub can_undo: bool,
	pub can_redo: bool,
	pub branch_options: Vec<BranchOption>,
	pub stats: HistoryStats,
}

/// Orchestrates push/undo/redo/prune/remove over the injected ports.
pub struct HistoryController<D, P> {
	cfg: HistoryConfig,
	/// Storage key scoping this history to one (document, user) pair.
	key: String,
	graph: HistoryGraph,
	classifier: EditClassifier,
	buffer: LocalOfflineBuffer,
	cache: SnapshotCache,
	scheduler: WriteScheduler,
	doc: D,
	port: P,
	gesture_active: bool,
}

impl<D: DocumentPort, P: PersistencePort> HistoryController<D, P> {
	/// Creates a controller rooted at the live document's current
	/// state. Call [`bootstrap`](Self::bootstrap) afterwards to pick
	/// up the remote graph.
	pub fn new(cfg: HistoryConfig, key: impl Into<String>, doc: D, port: P) -> Self {
		let initial = doc.capture_snapshot();
		let classifier = EditClassifier::new(&cfg, initial.clone());
		let buffer = LocalOfflineBuffer::new(cfg.offline_buffer_cap);
		let scheduler = WriteScheduler::new(cfg.write_debounce);
		Self {
			graph: HistoryGraph::new(initial),
			classifier,
			buffer,
			cache: SnapshotCache::new(),
			scheduler,
			cfg,
			key: key.into(),
			doc,
			port,
			gesture_active: false,
		}
	}

	/// Seeds the local cache with a payload the host persisted in an
	/// earlier session.
	pub fn with_cache(mut self, cache: SnapshotCache) -> Self {
		self.cache = cache;
		self
	}

	/// Read-only view of the graph, for hosts and tests.
	pub fn graph(&self) -> &HistoryGraph {
		&self.graph
	}

	/// The live offline buffer depth, for diagnostics.
	pub fn buffered_diffs(&self) -> usize {
		self.buffer.len()
	}

	/// Session start: use the cached graph as an interim state, then
	/// perform the one-shot remote read, reconcile buffered offline
	/// diffs onto the result, and write the merged graph back.
	///
	/// Never fails: a missing, unreadable, or corrupt remote snapshot
	/// leaves the best known state in place.
	pub async fn bootstrap(&mut self) {
		if let Some(cached) = self.cache.load() {
			info!(nodes = cached.len(), "using cached graph while remote read is in flight");
			self.install_graph(cached);
		}

		match self.port.read(&self.key).await {
			Ok(Some(payload)) => {
				match WireGraph::decode(&payload).and_then(WireGraph::into_graph) {
					Ok(remote) => {
						let (merged, report) = reconcile(remote, &mut self.buffer);
						info!(
							nodes = merged.len(),
							reconciled = report.applied,
							"remote graph loaded"
						);
						self.install_graph(merged);
						self.write_through().await;
					}
					Err(err) => {
						warn!(error = %err, "remote graph payload is corrupt, keeping local state");
					}
				}
			}
			Ok(None) => {
				trace!("no remote graph under this key yet");
				self.write_through().await;
			}
			Err(err) => {
				warn!(error = %err, "remote read failed, keeping local state");
			}
		}
	}

	// --- event intake -------------------------------------------------

	/// Reports that the live document changed. Captures a snapshot,
	/// feeds the classifier, and commits whatever came due.
	pub fn note_change(&mut self, now: Instant) {
		self.ensure_coherent();
		let current = self.doc.capture_snapshot();
		let due = self.classifier.observe(&current, now);
		self.commit_actions(due, now);
	}

	/// Drives pending debounce windows. The host's event loop calls
	/// this periodically or at
	/// [`next_deadline`](EditClassifier::next_deadline).
	pub fn tick(&mut self, now: Instant) {
		self.ensure_coherent();
		let due = self.classifier.poll(now);
		self.commit_actions(due, now);
	}

	/// Marks the start of a continuous gesture (drag). Until the
	/// gesture ends, persistence writes are redirected to the local
	/// offline buffer.
	pub fn begin_gesture(&mut self) {
		self.gesture_active = true;
	}

	/// Ends a gesture: flushes the pending move window immediately and
	/// resumes full-graph persistence.
	pub fn end_gesture(&mut self, now: Instant) {
		let released = self.classifier.gesture_released();
		self.commit_actions(released.into_iter().collect(), now);
		self.gesture_active = false;
		self.scheduler.mark_dirty(now);
	}

	// --- public history API -------------------------------------------

	/// Records a host-initiated action against the current document
	/// state. Returns `false` when the state is unchanged.
	pub fn record_action(&mut self, meta: ActionMeta, now: Instant) -> bool {
		self.ensure_coherent();
		let state = self.doc.capture_snapshot();
		match self.graph.push(meta.label(), state.clone(), Some(meta)) {
			Ok(PushOutcome::Recorded(_)) => {
				self.classifier.reset_baseline(state);
				self.after_mutation(now);
				true
			}
			Ok(PushOutcome::Unchanged) => false,
			Err(err) => {
				warn!(error = %err, "record_action hit a corrupt graph");
				self.resynthesize_root();
				false
			}
		}
	}

	/// Steps the cursor to its parent and applies that state to the
	/// document. Returns `false` at the root.
	pub fn undo(&mut self, now: Instant) -> bool {
		self.ensure_coherent();
		let pending = self.classifier.flush_all();
		self.commit_actions(pending, now);

		match self.graph.undo() {
			Ok(state) => {
				self.apply_to_document(&state);
				self.after_mutation(now);
				true
			}
			Err(GraphError::AtRoot) => {
				trace!("undo: nothing to undo");
				false
			}
			Err(err) => {
				warn!(error = %err, "undo hit a corrupt graph");
				self.resynthesize_root();
				false
			}
		}
	}

	/// Steps the cursor to a child (default: first-created) and
	/// applies that state. Returns `false` when there is no child or
	/// `branch` is not a child of the cursor.
	pub fn redo(&mut self, branch: Option<NodeId>, now: Instant) -> bool {
		self.ensure_coherent();
		let pending = self.classifier.flush_all();
		self.commit_actions(pending, now);

		match self.graph.redo(branch) {
			Ok(state) => {
				self.apply_to_document(&state);
				self.after_mutation(now);
				true
			}
			Err(GraphError::NoChildren) => {
				trace!("redo: nothing to redo");
				false
			}
			Err(GraphError::InvalidBranch(id)) => {
				trace!(branch = %id, "redo: not a branch of the cursor");
				false
			}
			Err(err) => {
				warn!(error = %err, "redo hit a corrupt graph");
				self.resynthesize_root();
				false
			}
		}
	}

	/// Drops all history and restarts from the live document state.
	pub fn clear_history(&mut self, now: Instant) {
		debug!("history cleared");
		self.resynthesize_root();
		self.buffer.clear();
		self.cache.clear();
		self.scheduler.mark_dirty(now);
	}

	/// Removes a node's subtree (default: the cursor's). Returns
	/// `false` for the root or an unknown id.
	pub fn remove_node(&mut self, id: Option<NodeId>, now: Instant) -> bool {
		self.ensure_coherent();
		let target = id.unwrap_or_else(|| self.graph.cursor_id());
		let cursor_before = self.graph.cursor_id();
		match self.graph.remove_subtree(target) {
			Ok(removed) => {
				debug!(removed, at = %target, "subtree removed");
				if self.graph.cursor_id() != cursor_before
					&& let Some(state) = self.graph.cursor_state().cloned()
				{
					self.apply_to_document(&state);
				}
				self.after_mutation(now);
				true
			}
			Err(err) => {
				trace!(error = %err, "remove_node not applicable");
				false
			}
		}
	}

	/// The history surface for the UI: root-to-cursor entries, redo
	/// branches, and aggregate stats.
	pub fn timeline(&mut self) -> Timeline {
		self.ensure_coherent();
		let path = self.graph.path_to_cursor().to_vec();
		let cursor_id = self.graph.cursor_id();
		let entries: Vec<TimelineEntry> = path
			.iter()
			.filter_map(|id| self.graph.get(*id))
			.map(|node| TimelineEntry {
				id: node.id,
				label: node.label.clone(),
				created_at: node.created_at,
				is_cursor: node.id == cursor_id,
			})
			.collect();
		let can_undo = self
			.graph
			.get(cursor_id)
			.is_some_and(|n| n.parent_id.is_some());
		let branch_options = self.branch_options();
		Timeline {
			current_index: entries.len().saturating_sub(1),
			can_undo,
			can_redo: !branch_options.is_empty(),
			branch_options,
			stats: HistoryStats {
				node_count: self.graph.len(),
				depth: self.graph.depth(),
				branch_count: self.graph.branch_count(),
			},
			entries,
		}
	}

	/// Redo destinations from the cursor, in creation order.
	pub fn branch_options(&self) -> Vec<BranchOption> {
		self.graph
			.redo_targets()
			.iter()
			.filter_map(|id| self.graph.get(*id))
			.map(|node| BranchOption {
				id: node.id,
				label: node.label.clone(),
				created_at: node.created_at,
			})
			.collect()
	}

	// --- persistence driver -------------------------------------------

	/// Performs the debounced remote write when it is due. Failures
	/// are logged and re-armed; the in-memory graph stays
	/// authoritative.
	pub async fn sync(&mut self, now: Instant) {
		if !self.scheduler.due(now) {
			return;
		}
		self.write_due(now).await;
	}

	/// Teardown: flushes pending debounce windows synchronously so the
	/// last in-flight edit is not lost, then writes out regardless of
	/// the debounce window.
	pub async fn shutdown(&mut self, now: Instant) {
		let pending = self.classifier.flush_all();
		self.commit_actions(pending, now);
		if self.scheduler.is_dirty() || !self.buffer.is_empty() {
			self.write_due(now).await;
		}
	}

	async fn write_due(&mut self, now: Instant) {
		let Some(payload) = self.encode_outgoing() else {
			self.scheduler.note_failed(now);
			return;
		};
		let Some(outgoing) = self.scheduler.accept(payload) else {
			trace!("write skipped: payload identical to last write");
			return;
		};
		match self.port.write(&self.key, &outgoing).await {
			Ok(()) => {
				trace!(bytes = outgoing.len(), "graph written");
				self.cache.store(outgoing.clone());
				self.scheduler.note_written(outgoing);
			}
			Err(err) => {
				warn!(error = %err, "graph write failed, retrying on next debounce");
				self.scheduler.note_failed(now);
			}
		}
	}

	/// Immediate write-through, used after reconciliation.
	async fn write_through(&mut self) {
		let Some(payload) = self.encode_outgoing() else {
			return;
		};
		match self.port.write(&self.key, &payload).await {
			Ok(()) => {
				self.cache.store(payload.clone());
				self.scheduler.note_written(payload);
			}
			Err(err) => {
				warn!(error = %err, "post-reconciliation write failed");
			}
		}
	}

	fn encode_outgoing(&self) -> Option<String> {
		WireGraph::from_graph(&self.graph, true, self.cfg.payload_node_budget)
			.encode(self.cfg.compress_threshold)
			.inspect_err(|err| {
				warn!(error = %err, "failed to encode graph payload");
			})
			.ok()
	}

	// --- internals ----------------------------------------------------

	fn commit_actions(&mut self, actions: Vec<ClassifiedAction>, now: Instant) {
		for action in actions {
			let label = action.meta.label();
			match self.graph.push(label, action.state, Some(action.meta)) {
				Ok(PushOutcome::Recorded(id)) => {
					self.graph.prune_to_limit(self.cfg.max_nodes);
					if self.gesture_active {
						// Burst write: local durability only, the
						// remote port is bypassed.
						if let Some(node) = self.graph.get(id) {
							self.buffer.push(OfflineDiffRecord {
								id,
								parent_id: node.parent_id,
								resulting_state: node.state.clone(),
								created_at: node.created_at,
							});
						}
					} else {
						self.scheduler.mark_dirty(now);
					}
				}
				Ok(PushOutcome::Unchanged) => {}
				Err(err) => {
					warn!(error = %err, "push hit a corrupt graph");
					self.resynthesize_root();
				}
			}
		}
	}

	fn after_mutation(&mut self, now: Instant) {
		self.graph.prune_to_limit(self.cfg.max_nodes);
		self.scheduler.mark_dirty(now);
	}

	/// Applies history state to the live document with the replay
	/// guard held, then rebases the classifier so the replay is never
	/// recorded as an edit.
	fn apply_to_document(&mut self, state: &StateSnapshot) {
		self.classifier.begin_replay();
		self.doc.apply_snapshot(state);
		self.classifier.end_replay();
		self.classifier.reset_baseline(state.clone());
	}

	fn install_graph(&mut self, graph: HistoryGraph) {
		self.graph = graph;
		if let Some(state) = self.graph.cursor_state().cloned() {
			self.apply_to_document(&state);
		}
	}

	/// Self-healing entry guard: a dangling cursor or root is repaired
	/// by restarting from the live document, never surfaced.
	fn ensure_coherent(&mut self) {
		if !self.graph.is_coherent() {
			warn!("history graph anchors do not resolve, resynthesizing root from live document");
			self.resynthesize_root();
		}
	}

	fn resynthesize_root(&mut self) {
		let state = self.doc.capture_snapshot();
		self.graph = HistoryGraph::new(state.clone());
		self.classifier.reset_baseline(state);
	}

	#[cfg(test)]
	fn graph_mut(&mut self) -> &mut HistoryGraph {
		&mut self.graph
	}
}
