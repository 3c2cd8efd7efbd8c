//! Reconciliation of buffered offline diffs onto a remote snapshot.
//!
//! Once a session has the canonical remote graph, every diff the user
//! recorded while offline is replayed onto it in `created_at` order:
//! the diff's id is written (or overwritten) into the node map with
//! the diff's resulting state, and the cursor advances to that id.
//! This is last-writer-wins per node id, not a three-way merge;
//! concurrent edits from another session are out of scope. No failure
//! escapes this boundary: a diff that cannot be applied is discarded
//! and the last good state kept.

use tracing::{debug, warn};

use crate::graph::HistoryGraph;
use crate::persist::offline::LocalOfflineBuffer;

/// Outcome counters for one reconciliation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReconcileReport {
	/// Diffs merged into the graph.
	pub applied: usize,
	/// Diffs dropped as unusable.
	pub discarded: usize,
}

/// Replays all buffered offline diffs onto `remote`, draining the
/// buffer. Returns the merged graph and what happened.
pub fn reconcile(
	mut remote: HistoryGraph,
	buffer: &mut LocalOfflineBuffer,
) -> (HistoryGraph, ReconcileReport) {
	let mut report = ReconcileReport::default();
	for diff in buffer.drain_ordered() {
		// A diff that names itself as its own parent cannot come from
		// a healthy recording path.
		if diff.parent_id == Some(diff.id) {
			warn!(id = %diff.id, "discarding self-parented offline diff");
			report.discarded += 1;
			continue;
		}
		remote.merge_external(
			diff.id,
			diff.parent_id,
			"Offline edit",
			diff.resulting_state,
			diff.created_at,
			None,
		);
		if remote.set_cursor(diff.id).is_err() {
			// merge_external just inserted or updated this id; a miss
			// here means the graph is corrupt beyond this diff.
			warn!(id = %diff.id, "offline diff vanished after merge, discarding");
			report.discarded += 1;
			continue;
		}
		report.applied += 1;
	}
	debug!(
		applied = report.applied,
		discarded = report.discarded,
		nodes = remote.len(),
		"reconciliation complete"
	);
	(remote, report)
}
