//! Debounced classification of raw document deltas.
//!
//! The host reports every document change by calling
//! [`EditClassifier::observe`] with the current snapshot. The
//! classifier diffs it against the last captured baseline and folds
//! the result into one of two pending windows:
//!
//! - **Position track**: entities displaced beyond a jitter threshold
//!   accumulate into a move window with a trailing debounce deadline,
//!   so per-frame drag updates coalesce into a single "Move N
//!   entities" entry.
//! - **Structural track**: additions, removals, and parameter edits
//!   share an action-separator window so bursts (pasting ten nodes)
//!   collapse into one entry, labeled from the node/relation count
//!   deltas with a bulk-update fallback when several classes land at
//!   once.
//!
//! There are no timers here. Deadlines are plain [`Instant`]s; the
//! host's event loop drives [`EditClassifier::poll`] and flushes
//! whatever is due. Both tracks are suppressed while the replay flag
//! is set, so the controller's own undo/redo application is never
//! re-recorded.

#[cfg(test)]
mod tests;

use std::time::{Duration, Instant};

use rustc_hash::FxHashSet;
use tracing::{debug, trace};
use weave_primitives::{EntityId, EntityValue, StateSnapshot};

use crate::action::ActionMeta;
use crate::config::HistoryConfig;

/// A coherent history entry distilled from an edit burst.
#[derive(Debug, Clone)]
pub struct ClassifiedAction {
	/// What kind of edit the burst was.
	pub meta: ActionMeta,
	/// Document state at the end of the burst.
	pub state: StateSnapshot,
}

/// Transient aggregation of a drag gesture.
struct PendingMoveWindow {
	/// Entities displaced beyond the jitter threshold since baseline.
	moved: FxHashSet<EntityId>,
	deadline: Instant,
	latest: StateSnapshot,
}

/// Transient aggregation of a structural burst.
struct PendingStructuralWindow {
	deadline: Instant,
	latest: StateSnapshot,
}

/// Debounced diff detector turning raw state deltas into labeled
/// actions.
pub struct EditClassifier {
	position_epsilon: f32,
	move_debounce: Duration,
	action_separator: Duration,
	/// Baseline the next flush will be labeled against.
	last_captured: StateSnapshot,
	pending_move: Option<PendingMoveWindow>,
	pending_structural: Option<PendingStructuralWindow>,
	/// Re-entrancy flag: set while the controller replays history
	/// state into the document.
	applying_history: bool,
}

impl EditClassifier {
	/// Creates a classifier with the given baseline state.
	pub fn new(cfg: &HistoryConfig, initial: StateSnapshot) -> Self {
		Self {
			position_epsilon: cfg.position_epsilon,
			move_debounce: cfg.move_debounce,
			action_separator: cfg.action_separator,
			last_captured: initial,
			pending_move: None,
			pending_structural: None,
			applying_history: false,
		}
	}

	/// Marks the start of an undo/redo replay; observations are
	/// suppressed until [`end_replay`](Self::end_replay).
	pub fn begin_replay(&mut self) {
		self.applying_history = true;
	}

	/// Ends a replay window.
	pub fn end_replay(&mut self) {
		self.applying_history = false;
	}

	/// Returns `true` while a replay window is open.
	pub fn is_replaying(&self) -> bool {
		self.applying_history
	}

	/// Resets the baseline and discards pending windows. Called after
	/// history state has been applied to the document, so the replay
	/// itself never reads as an edit.
	pub fn reset_baseline(&mut self, state: StateSnapshot) {
		self.pending_move = None;
		self.pending_structural = None;
		self.last_captured = state;
	}

	/// Returns `true` when a window is open and awaiting its deadline.
	pub fn has_pending(&self) -> bool {
		self.pending_move.is_some() || self.pending_structural.is_some()
	}

	/// Earliest pending deadline, for hosts that schedule their next
	/// poll precisely.
	pub fn next_deadline(&self) -> Option<Instant> {
		match (&self.pending_move, &self.pending_structural) {
			(Some(m), Some(s)) => Some(m.deadline.min(s.deadline)),
			(Some(m), None) => Some(m.deadline),
			(None, Some(s)) => Some(s.deadline),
			(None, None) => None,
		}
	}

	/// Feeds the current document state into the classifier.
	///
	/// Returns any actions whose windows came due at or before `now`;
	/// the new event itself stays pending until its own deadline
	/// passes or a gesture release flushes it.
	pub fn observe(&mut self, current: &StateSnapshot, now: Instant) -> Vec<ClassifiedAction> {
		if self.applying_history {
			// The controller is writing history state into the live
			// document; follow along silently.
			self.last_captured = current.clone();
			self.pending_move = None;
			self.pending_structural = None;
			return Vec::new();
		}

		let due = self.poll(now);

		// Remount-race heuristic, not a correctness guarantee: a
		// transition from non-empty to fully-empty content can be the
		// host re-initializing rather than the user deleting
		// everything. Prefer the last known non-empty snapshot over a
		// spurious "delete everything" entry.
		if !self.last_captured.is_empty() && current.is_empty() {
			debug!("ignoring non-empty -> empty transition (possible remount)");
			return due;
		}

		if current.hash() == self.last_captured.hash() {
			return due;
		}

		let delta = self.diff_against_baseline(current);
		if delta.structural {
			let deadline = now + self.action_separator;
			match &mut self.pending_structural {
				Some(window) => {
					window.latest = current.clone();
					window.deadline = deadline;
				}
				None => {
					trace!("structural window opened");
					self.pending_structural = Some(PendingStructuralWindow {
						deadline,
						latest: current.clone(),
					});
				}
			}
			// A concurrent drag folds into the structural entry.
			if let Some(window) = &mut self.pending_move {
				window.latest = current.clone();
			}
		} else if !delta.moved.is_empty() {
			let deadline = now + self.move_debounce;
			match &mut self.pending_move {
				Some(window) => {
					window.moved.extend(delta.moved);
					window.latest = current.clone();
					window.deadline = deadline;
				}
				None => {
					trace!(moved = delta.moved.len(), "move window opened");
					self.pending_move = Some(PendingMoveWindow {
						moved: delta.moved,
						deadline,
						latest: current.clone(),
					});
				}
			}
		}
		// Hash changed but neither track fired: sub-threshold jitter
		// or a viewport-only change. The difference rides along with
		// the next recorded action.

		due
	}

	/// Flushes windows whose deadline has passed, earliest first.
	pub fn poll(&mut self, now: Instant) -> Vec<ClassifiedAction> {
		let mut out = Vec::new();
		loop {
			let structural_due = self
				.pending_structural
				.as_ref()
				.filter(|w| w.deadline <= now)
				.map(|w| w.deadline);
			let move_due = self
				.pending_move
				.as_ref()
				.filter(|w| w.deadline <= now)
				.map(|w| w.deadline);
			match (structural_due, move_due) {
				(Some(s), Some(m)) if m < s => out.extend(self.flush_move()),
				(Some(_), _) => out.extend(self.flush_structural()),
				(None, Some(_)) => out.extend(self.flush_move()),
				(None, None) => break,
			}
		}
		out
	}

	/// Flushes the move window immediately. The host calls this when
	/// a drag gesture ends, so the entry lands without waiting out the
	/// debounce.
	pub fn gesture_released(&mut self) -> Option<ClassifiedAction> {
		self.flush_move()
	}

	/// Flushes everything regardless of deadlines. Called on teardown
	/// and before undo/redo so no in-flight edit is lost.
	pub fn flush_all(&mut self) -> Vec<ClassifiedAction> {
		let mut out = Vec::new();
		out.extend(self.flush_structural());
		out.extend(self.flush_move());
		out
	}

	fn flush_move(&mut self) -> Option<ClassifiedAction> {
		let window = self.pending_move.take()?;
		let meta = ActionMeta::Move {
			count: window.moved.len(),
		};
		trace!(label = %meta.label(), "move window flushed");
		self.last_captured = window.latest.clone();
		Some(ClassifiedAction {
			meta,
			state: window.latest,
		})
	}

	fn flush_structural(&mut self) -> Option<ClassifiedAction> {
		let window = self.pending_structural.take()?;
		let meta = self.classify_structural(&window.latest);
		trace!(label = %meta.label(), "structural window flushed");
		self.last_captured = window.latest.clone();
		Some(ClassifiedAction {
			meta,
			state: window.latest,
		})
	}

	/// Picks the action kind from the count deltas between the
	/// baseline and the flushed state.
	fn classify_structural(&self, latest: &StateSnapshot) -> ActionMeta {
		let before = self.last_captured.items();
		let after = latest.items();

		let mut added_nodes = 0usize;
		let mut added_relations = 0usize;
		for (id, value) in after {
			if !before.contains_key(id) {
				if value.is_node() {
					added_nodes += 1;
				} else {
					added_relations += 1;
				}
			}
		}
		let mut removed_nodes = 0usize;
		let mut removed_relations = 0usize;
		for (id, value) in before {
			if !after.contains_key(id) {
				if value.is_node() {
					removed_nodes += 1;
				} else {
					removed_relations += 1;
				}
			}
		}

		let classes = [added_nodes, removed_nodes, added_relations, removed_relations];
		match classes.iter().filter(|c| **c > 0).count() {
			0 => ActionMeta::Bulk,
			1 => {
				if added_nodes > 0 {
					ActionMeta::AddNodes { count: added_nodes }
				} else if removed_nodes > 0 {
					ActionMeta::RemoveNodes {
						count: removed_nodes,
					}
				} else if added_relations > 0 {
					ActionMeta::AddRelations {
						count: added_relations,
					}
				} else {
					ActionMeta::RemoveRelations {
						count: removed_relations,
					}
				}
			}
			_ => ActionMeta::Bulk,
		}
	}

	/// Diffs `current` against the baseline snapshot.
	fn diff_against_baseline(&self, current: &StateSnapshot) -> BaselineDelta {
		let before = self.last_captured.items();
		let after = current.items();

		let ids_changed = after.keys().any(|id| !before.contains_key(id))
			|| before.keys().any(|id| !after.contains_key(id));

		let mut moved = FxHashSet::default();
		let mut edited_in_place = false;
		for (id, value) in after {
			let Some(old) = before.get(id) else { continue };
			if old == value {
				continue;
			}
			match (old, value) {
				(EntityValue::Node(was), EntityValue::Node(is)) => {
					let displaced = was.position.distance(is.position) > self.position_epsilon;
					let beyond_position = {
						// Normalize away position and runtime output: a
						// recomputed output is host-derived, not an edit.
						let mut normalized = is.clone();
						normalized.position = was.position;
						normalized.output = was.output.clone();
						*was != normalized
					};
					if beyond_position {
						edited_in_place = true;
					} else if displaced {
						moved.insert(id.clone());
					}
					// Sub-threshold position jitter alone is ignored.
				}
				_ => edited_in_place = true,
			}
		}

		BaselineDelta {
			structural: ids_changed || edited_in_place,
			moved,
		}
	}
}

/// What changed between the baseline and an observed snapshot.
struct BaselineDelta {
	/// Entities appeared, disappeared, or changed beyond position.
	structural: bool,
	/// Node ids displaced beyond the jitter threshold.
	moved: FxHashSet<EntityId>,
}
