//! Persistence: wire codec, offline buffering, caching, and
//! reconciliation.
//!
//! The transport is an opaque key-value service behind
//! [`PersistencePort`]. Everything that leaves through it is
//! sanitized, capped to a node budget, deterministically encoded, and
//! optionally compressed. Writes are debounced by the
//! [`WriteScheduler`]; burst writes during continuous gestures never
//! reach the port and land in the [`LocalOfflineBuffer`] instead.

#[cfg(test)]
mod tests;

pub mod cache;
pub mod offline;
pub mod reconcile;
pub mod wire;

use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::error::PersistResult;

pub use cache::SnapshotCache;
pub use offline::{LocalOfflineBuffer, OfflineDiffRecord};
pub use reconcile::{ReconcileReport, reconcile};
pub use wire::WireGraph;

/// Opaque key-value persistence service (the remote snapshot store).
///
/// `read` is one-shot: the engine calls it once per session and never
/// subscribes. Implementations own retries and transport concerns;
/// the engine treats any error as "try again on the next debounce".
#[async_trait]
pub trait PersistencePort {
	/// Reads the payload stored under `key`, if any.
	async fn read(&self, key: &str) -> PersistResult<Option<String>>;

	/// Stores `payload` under `key`, replacing any previous value.
	async fn write(&self, key: &str, payload: &str) -> PersistResult<()>;

	/// Deletes the value under `key`.
	async fn clear(&self, key: &str) -> PersistResult<()>;
}

/// Debounce state for remote graph writes.
///
/// Deadline-based like the classifier: the controller marks the graph
/// dirty after connectivity-changing mutations and drives
/// [`due`](Self::due) from its event loop. A payload byte-identical
/// to the last successful write is skipped.
#[derive(Debug)]
pub struct WriteScheduler {
	debounce: Duration,
	dirty_since: Option<Instant>,
	last_written: Option<String>,
}

impl WriteScheduler {
	/// Creates a scheduler with the given debounce window.
	pub fn new(debounce: Duration) -> Self {
		Self {
			debounce,
			dirty_since: None,
			last_written: None,
		}
	}

	/// Notes a graph mutation worth persisting. Restarts the trailing
	/// debounce window.
	pub fn mark_dirty(&mut self, now: Instant) {
		self.dirty_since = Some(now);
	}

	/// Returns `true` when a write is pending and its window elapsed.
	pub fn due(&self, now: Instant) -> bool {
		self.dirty_since
			.is_some_and(|since| now.duration_since(since) >= self.debounce)
	}

	/// Returns `true` when a write is pending, due or not.
	pub fn is_dirty(&self) -> bool {
		self.dirty_since.is_some()
	}

	/// Decides whether `payload` actually needs to go out. Clears the
	/// dirty flag either way; a skipped write is a satisfied write.
	pub fn accept(&mut self, payload: String) -> Option<String> {
		self.dirty_since = None;
		if self.last_written.as_deref() == Some(payload.as_str()) {
			return None;
		}
		Some(payload)
	}

	/// Records a successful write so identical payloads are skipped.
	pub fn note_written(&mut self, payload: String) {
		self.last_written = Some(payload);
	}

	/// Re-arms the debounce after a failed write; the payload goes out
	/// on the next natural trigger instead of immediately.
	pub fn note_failed(&mut self, now: Instant) {
		self.dirty_since = Some(now);
	}
}
