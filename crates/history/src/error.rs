//! Error types for the history engine.
//!
//! Graph operations distinguish "not applicable" conditions (undo at
//! the root, redo with no children) from structural problems; the
//! controller maps the former to boolean results at the public API
//! and recovers from the latter by resynthesizing a root. Persistence
//! errors are logged and swallowed at the controller boundary; the
//! in-memory graph stays authoritative.

use thiserror::Error;

use crate::graph::NodeId;

/// Errors from history graph operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
	/// Undo requested while the cursor is at the root.
	#[error("cannot undo: cursor is at the root")]
	AtRoot,

	/// Redo requested on a node without children.
	#[error("cannot redo: cursor has no children")]
	NoChildren,

	/// Redo requested toward a node that is not a child of the cursor.
	#[error("node {0} is not a redo branch of the cursor")]
	InvalidBranch(NodeId),

	/// The root node can never be removed.
	#[error("the root node cannot be removed")]
	RemoveRoot,

	/// A referenced node does not exist in the graph.
	#[error("unknown history node {0}")]
	UnknownNode(NodeId),

	/// The node map does not describe a single rooted tree.
	#[error("corrupt graph structure: {0}")]
	Corrupt(String),
}

/// Errors from encoding, decoding, or storing serialized graphs.
#[derive(Debug, Error)]
pub enum PersistError {
	/// JSON serialization or deserialization failed.
	#[error("graph payload JSON error: {0}")]
	Json(#[from] serde_json::Error),

	/// A compressed payload was not valid base64.
	#[error("compressed payload is not valid base64: {0}")]
	Base64(#[from] base64::DecodeError),

	/// Compression or decompression failed.
	#[error("payload compression error: {0}")]
	Compression(#[from] std::io::Error),

	/// The decoded payload does not describe a valid tree.
	#[error("corrupt graph payload: {0}")]
	Corrupt(String),

	/// The storage backend rejected or failed the operation.
	#[error("persistence backend: {0}")]
	Backend(String),
}

/// Result alias for persistence operations.
pub type PersistResult<T> = Result<T, PersistError>;
