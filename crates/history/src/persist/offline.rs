//! Local offline diff buffer.
//!
//! During continuous gestures the controller trades full-graph
//! durability for low-latency local durability: instead of a network
//! write per burst, it appends a fine-grained diff here. The buffer
//! is append-only and capped; past capacity the oldest record is
//! evicted. Records are replayed onto the remote snapshot by
//! [`reconcile`](super::reconcile::reconcile) once a session has one.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use weave_primitives::StateSnapshot;

use crate::graph::NodeId;

/// One buffered fine-grained edit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfflineDiffRecord {
	/// History node id this diff belongs to.
	pub id: NodeId,
	/// Parent of that node at record time.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub parent_id: Option<NodeId>,
	/// Document state after the edit.
	pub resulting_state: StateSnapshot,
	/// Record time; replay order during reconciliation.
	pub created_at: DateTime<Utc>,
}

/// Append-only capped ring buffer of offline diffs, scoped to one
/// (document, user) pair. Never shared across instances.
#[derive(Debug)]
pub struct LocalOfflineBuffer {
	cap: usize,
	records: VecDeque<OfflineDiffRecord>,
}

impl LocalOfflineBuffer {
	/// Creates a buffer holding at most `cap` records.
	pub fn new(cap: usize) -> Self {
		Self {
			cap: cap.max(1),
			records: VecDeque::new(),
		}
	}

	/// Appends a record, evicting the oldest past capacity.
	pub fn push(&mut self, record: OfflineDiffRecord) {
		if self.records.len() == self.cap {
			if let Some(evicted) = self.records.pop_front() {
				warn!(id = %evicted.id, "offline buffer full, evicting oldest diff");
			}
		}
		self.records.push_back(record);
	}

	/// Number of buffered records.
	pub fn len(&self) -> usize {
		self.records.len()
	}

	/// Returns `true` when nothing is buffered.
	pub fn is_empty(&self) -> bool {
		self.records.is_empty()
	}

	/// Drains all records ordered by `created_at` (stable for ties).
	pub fn drain_ordered(&mut self) -> Vec<OfflineDiffRecord> {
		let mut drained: Vec<OfflineDiffRecord> = self.records.drain(..).collect();
		drained.sort_by_key(|r| r.created_at);
		drained
	}

	/// Discards all records.
	pub fn clear(&mut self) {
		self.records.clear();
	}

	/// Iterates over buffered records in append order.
	pub fn iter(&self) -> impl Iterator<Item = &OfflineDiffRecord> {
		self.records.iter()
	}
}
