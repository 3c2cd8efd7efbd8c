//! Local cache of the last known-good serialized graph.
//!
//! On session start the remote read is in flight while the editor is
//! already interactive; the cached payload, when present and still
//! decodable, serves as the interim graph so the UI never blocks on
//! network latency. A payload that fails to decode is dropped rather
//! than surfaced: the cache only ever offers best-effort state.

use tracing::warn;

use crate::graph::HistoryGraph;
use crate::persist::wire::WireGraph;

/// Durable-by-host cache of one encoded graph payload, scoped to one
/// (document, user) pair.
#[derive(Debug, Default)]
pub struct SnapshotCache {
	payload: Option<String>,
}

impl SnapshotCache {
	/// Creates an empty cache.
	pub fn new() -> Self {
		Self::default()
	}

	/// Seeds the cache with a payload the host persisted earlier.
	pub fn seed(payload: String) -> Self {
		Self {
			payload: Some(payload),
		}
	}

	/// Stores a known-good payload.
	pub fn store(&mut self, payload: String) {
		self.payload = Some(payload);
	}

	/// The raw cached payload, for hosts that persist it.
	pub fn payload(&self) -> Option<&str> {
		self.payload.as_deref()
	}

	/// Decodes the cached payload into a graph. A corrupt payload is
	/// cleared and reported as absent.
	pub fn load(&mut self) -> Option<HistoryGraph> {
		let payload = self.payload.as_deref()?;
		match WireGraph::decode(payload).and_then(WireGraph::into_graph) {
			Ok(graph) => Some(graph),
			Err(err) => {
				warn!(error = %err, "cached graph payload is corrupt, discarding");
				self.payload = None;
				None
			}
		}
	}

	/// Discards the cached payload.
	pub fn clear(&mut self) {
		self.payload = None;
	}
}
