//! Branching undo/redo history for a node-graph document.
//!
//! The document's edit history is a tree of full state snapshots, not
//! a linear stack: undoing and then editing creates a sibling branch
//! and never discards forward history. A cursor marks the entry whose
//! state equals the live document.
//!
//! The crate splits into:
//!
//! - [`graph`]: the snapshot tree (push/undo/redo/prune/remove).
//! - [`classifier`]: turns raw change notifications into debounced,
//!   labeled history entries.
//! - [`persist`]: wire codec, write scheduling, offline buffering, and
//!   reconciliation against a remote snapshot store.
//! - [`controller`]: the public orchestration layer hosts embed.
//!
//! Hosts implement [`DocumentPort`] for snapshot capture/apply and
//! [`PersistencePort`] for the remote store, then drive a
//! [`HistoryController`] from their event loop.

pub mod action;
pub mod classifier;
pub mod config;
pub mod controller;
pub mod error;
pub mod graph;
pub mod persist;

pub use action::ActionMeta;
pub use classifier::{ClassifiedAction, EditClassifier};
pub use config::HistoryConfig;
pub use controller::{
	BranchOption, DocumentPort, HistoryController, HistoryStats, Timeline, TimelineEntry,
};
pub use error::{GraphError, PersistError, PersistResult};
pub use graph::{HistoryGraph, HistoryNode, NodeId, PushOutcome};
pub use persist::{
	LocalOfflineBuffer, OfflineDiffRecord, PersistencePort, ReconcileReport, SnapshotCache,
	WireGraph, WriteScheduler, reconcile,
};
