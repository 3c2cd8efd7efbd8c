//! Serialized graph format and its codec.
//!
//! The wire shape is stable JSON with camelCase keys:
//!
//! ```json
//! {
//!   "root": "…", "cursor": "…",
//!   "nodes": { "<id>": { "id", "parentId", "childrenIds", "label",
//!                        "resultingState": { "items": [...], "extra"? },
//!                        "createdAt", "meta"? } }
//! }
//! ```
//!
//! Node keys live in a `BTreeMap` so encoding is deterministic; the
//! byte-identical write skip depends on that. Payloads at or above
//! the compression threshold are brotli-compressed and base64-wrapped
//! behind the `b64br:` prefix; [`decode`](WireGraph::decode) detects
//! the prefix and decompresses transparently, so readers never need
//! to know whether a writer compressed.

use std::collections::{BTreeMap, HashMap};
use std::io::Read;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::trace;
use weave_primitives::StateSnapshot;

use crate::action::ActionMeta;
use crate::error::{PersistError, PersistResult};
use crate::graph::{HistoryGraph, HistoryNode, NodeId};

/// Marker prefix for compressed payloads.
pub const COMPRESSED_PREFIX: &str = "b64br:";

const BROTLI_BUFFER: usize = 4096;
const BROTLI_QUALITY: u32 = 5;
const BROTLI_WINDOW: u32 = 22;

/// One node in the wire format.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireNode {
	pub id: NodeId,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub parent_id: Option<NodeId>,
	pub children_ids: Vec<NodeId>,
	pub label: String,
	pub resulting_state: StateSnapshot,
	pub created_at: DateTime<Utc>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub meta: Option<ActionMeta>,
}

/// The serialized graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireGraph {
	pub root: NodeId,
	pub cursor: NodeId,
	pub nodes: BTreeMap<String, WireNode>,
}

impl WireGraph {
	/// Projects an in-memory graph into wire form.
	///
	/// When `sanitize` is set every snapshot is reduced to its
	/// structural allow-list. Graphs over `node_budget` are capped by
	/// cloning and evicting the clone's oldest evictable nodes one at
	/// a time, so the payload loses exactly the excess and the
	/// earliest survivor becomes its root. The in-memory graph is
	/// untouched.
	pub fn from_graph(graph: &HistoryGraph, sanitize: bool, node_budget: usize) -> Self {
		if node_budget > 0 && graph.len() > node_budget {
			let mut clipped = graph.clone();
			let removed = clipped.cap_oldest(node_budget);
			trace!(removed, budget = node_budget, "payload capped");
			return Self::project(&clipped, sanitize);
		}
		Self::project(graph, sanitize)
	}

	fn project(graph: &HistoryGraph, sanitize: bool) -> Self {
		let nodes = graph
			.iter()
			.map(|node| {
				let resulting_state = if sanitize {
					node.state.sanitized()
				} else {
					node.state.clone()
				};
				(
					node.id.to_string(),
					WireNode {
						id: node.id,
						parent_id: node.parent_id,
						children_ids: node.children().to_vec(),
						label: node.label.clone(),
						resulting_state,
						created_at: node.created_at,
						meta: node.meta.clone(),
					},
				)
			})
			.collect();
		Self {
			root: graph.root_id(),
			cursor: graph.cursor_id(),
			nodes,
		}
	}

	/// Rebuilds a validated in-memory graph.
	pub fn into_graph(self) -> PersistResult<HistoryGraph> {
		let mut nodes = HashMap::with_capacity(self.nodes.len());
		for (_, wire) in self.nodes {
			let mut node = HistoryNode::leaf(
				wire.id,
				wire.parent_id,
				wire.label,
				wire.resulting_state,
				wire.created_at,
				wire.meta,
			);
			node.children = wire.children_ids;
			nodes.insert(wire.id, node);
		}
		HistoryGraph::from_parts(self.root, self.cursor, nodes)
			.map_err(|err| PersistError::Corrupt(err.to_string()))
	}

	/// Encodes to the textual payload, compressing when the plain
	/// JSON reaches `compress_threshold` bytes (0 = never compress).
	pub fn encode(&self, compress_threshold: usize) -> PersistResult<String> {
		let json = serde_json::to_string(self)?;
		if compress_threshold == 0 || json.len() < compress_threshold {
			return Ok(json);
		}
		let mut compressed = Vec::new();
		{
			let mut writer = brotli::CompressorWriter::new(
				&mut compressed,
				BROTLI_BUFFER,
				BROTLI_QUALITY,
				BROTLI_WINDOW,
			);
			std::io::Write::write_all(&mut writer, json.as_bytes())?;
		}
		trace!(
			plain = json.len(),
			compressed = compressed.len(),
			"payload compressed"
		);
		Ok(format!("{COMPRESSED_PREFIX}{}", BASE64.encode(compressed)))
	}

	/// Decodes a payload, transparently handling compression.
	pub fn decode(payload: &str) -> PersistResult<Self> {
		let json = match payload.strip_prefix(COMPRESSED_PREFIX) {
			Some(encoded) => {
				let compressed = BASE64.decode(encoded)?;
				let mut plain = Vec::new();
				brotli::Decompressor::new(compressed.as_slice(), BROTLI_BUFFER)
					.read_to_end(&mut plain)?;
				String::from_utf8(plain)
					.map_err(|_| PersistError::Corrupt("decompressed payload is not UTF-8".into()))?
			}
			None => payload.to_string(),
		};
		Ok(serde_json::from_str(&json)?)
	}
}
