//! Document entity model: nodes, relations, and their identifiers.
//!
//! A document is two collections folded into one map: node entities
//! (placed on the canvas) and relation entities (wires between node
//! ports). [`EntityValue`] is a closed enum so consumers can match
//! exhaustively on the entity class.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Stable identifier for a document entity.
///
/// Opaque to this crate; the host editor allocates them. Relations
/// reference node ids through this type as well.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub String);

impl EntityId {
	/// Returns the id as a string slice.
	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl From<&str> for EntityId {
	fn from(s: &str) -> Self {
		Self(s.to_string())
	}
}

impl From<String> for EntityId {
	fn from(s: String) -> Self {
		Self(s)
	}
}

impl std::fmt::Display for EntityId {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(&self.0)
	}
}

/// 2D canvas position or extent.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec2 {
	pub x: f32,
	pub y: f32,
}

impl Vec2 {
	pub fn new(x: f32, y: f32) -> Self {
		Self { x, y }
	}

	/// Euclidean distance to another point.
	pub fn distance(self, other: Self) -> f32 {
		let dx = self.x - other.x;
		let dy = self.y - other.y;
		(dx * dx + dy * dy).sqrt()
	}
}

/// A node placed on the canvas.
///
/// The typed fields are the structural projection of a node: they are
/// what persists, hashes, and travels over the wire. `output` is the
/// node's last computed runtime payload; it is carried in memory so
/// undo/redo can restore it, but it is stripped by
/// [`sanitized`](EntityValue::sanitized) before any network write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeEntity {
	/// Node type identifier (factory key in the host editor).
	pub kind: String,
	/// Canvas position of the node's top-left corner.
	pub position: Vec2,
	/// Explicit width, if the node has been resized.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub width: Option<f32>,
	/// Explicit height, if the node has been resized.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub height: Option<f32>,
	/// Structural configuration parameters, in insertion order.
	#[serde(default, skip_serializing_if = "IndexMap::is_empty")]
	pub params: IndexMap<String, serde_json::Value>,
	/// Last computed runtime payload. Never serialized to the remote
	/// store; see [`EntityValue::sanitized`].
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub output: Option<serde_json::Value>,
}

impl NodeEntity {
	/// Creates a node of the given kind at a position.
	pub fn new(kind: impl Into<String>, position: Vec2) -> Self {
		Self {
			kind: kind.into(),
			position,
			width: None,
			height: None,
			params: IndexMap::new(),
			output: None,
		}
	}
}

/// A wire between two node ports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationEntity {
	/// Source node.
	pub from: EntityId,
	/// Target node.
	pub to: EntityId,
	/// Output port name on the source node.
	pub from_port: String,
	/// Input port name on the target node.
	pub to_port: String,
}

/// A document entity: either a node or a relation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EntityValue {
	Node(NodeEntity),
	Relation(RelationEntity),
}

impl EntityValue {
	/// Returns `true` for node entities.
	pub fn is_node(&self) -> bool {
		matches!(self, Self::Node(_))
	}

	/// Returns `true` for relation entities.
	pub fn is_relation(&self) -> bool {
		matches!(self, Self::Relation(_))
	}

	/// Canvas position, for node entities.
	pub fn position(&self) -> Option<Vec2> {
		match self {
			Self::Node(n) => Some(n.position),
			Self::Relation(_) => None,
		}
	}

	/// Structural projection of this entity for outgoing persistence.
	///
	/// The typed fields of [`NodeEntity`] and [`RelationEntity`] are
	/// the allow-list; the only field outside it is the node's runtime
	/// `output` payload, which is dropped here. Relations are already
	/// fully structural.
	pub fn sanitized(&self) -> Self {
		match self {
			Self::Node(n) => Self::Node(NodeEntity {
				output: None,
				..n.clone()
			}),
			Self::Relation(r) => Self::Relation(r.clone()),
		}
	}
}
