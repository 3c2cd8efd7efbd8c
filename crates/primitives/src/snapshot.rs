//! Immutable document state snapshots.
//!
//! A [`StateSnapshot`] is the full entity collection at one point in
//! time plus an optional viewport, with its structural hash computed
//! at construction. Fields are private and there are no mutators:
//! every derived state goes through [`StateSnapshot::new`] so the
//! hash can never drift from the content.

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::entity::{EntityId, EntityValue, Vec2};
use crate::hash::{self, StateHash};

/// Camera state of the canvas at snapshot time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewportInfo {
	/// Canvas pan offset.
	pub pan: Vec2,
	/// Zoom factor, 1.0 = 100%.
	pub zoom: f32,
}

/// Immutable snapshot of the document's entity collections.
#[derive(Debug, Clone, PartialEq)]
pub struct StateSnapshot {
	items: IndexMap<EntityId, EntityValue>,
	viewport: Option<ViewportInfo>,
	hash: StateHash,
}

impl StateSnapshot {
	/// Builds a snapshot, computing its structural hash.
	pub fn new(items: IndexMap<EntityId, EntityValue>, viewport: Option<ViewportInfo>) -> Self {
		let hash = hash::hash_state(&items, viewport.as_ref());
		Self {
			items,
			viewport,
			hash,
		}
	}

	/// The empty document.
	pub fn empty() -> Self {
		Self::new(IndexMap::new(), None)
	}

	/// All entities, in insertion order.
	pub fn items(&self) -> &IndexMap<EntityId, EntityValue> {
		&self.items
	}

	/// Viewport at capture time, if recorded.
	pub fn viewport(&self) -> Option<&ViewportInfo> {
		self.viewport.as_ref()
	}

	/// Structural digest of this snapshot's content.
	pub fn hash(&self) -> StateHash {
		self.hash
	}

	/// Returns `true` when the snapshot holds no entities.
	pub fn is_empty(&self) -> bool {
		self.items.is_empty()
	}

	/// Number of node entities.
	pub fn node_count(&self) -> usize {
		self.items.values().filter(|v| v.is_node()).count()
	}

	/// Number of relation entities.
	pub fn relation_count(&self) -> usize {
		self.items.values().filter(|v| v.is_relation()).count()
	}

	/// Structural projection for outgoing persistence.
	///
	/// Every entity is reduced to its allow-listed structural fields
	/// (see [`EntityValue::sanitized`]). The hash is unchanged: runtime
	/// output does not participate in structural identity, so a
	/// sanitized snapshot still compares equal to the live state it
	/// was projected from.
	pub fn sanitized(&self) -> Self {
		let items = self
			.items
			.iter()
			.map(|(id, value)| (id.clone(), value.sanitized()))
			.collect();
		Self::new(items, self.viewport)
	}
}

/// Wire shape of a snapshot: an ordered item list plus the optional
/// viewport. The hash is deliberately not serialized; it is recomputed
/// on deserialization so a tampered or stale payload can never carry a
/// hash that disagrees with its content.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SnapshotRepr {
	items: Vec<ItemRepr>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	extra: Option<ViewportInfo>,
}

#[derive(Serialize, Deserialize)]
struct ItemRepr {
	id: EntityId,
	value: EntityValue,
}

impl Serialize for StateSnapshot {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		let repr = SnapshotRepr {
			items: self
				.items
				.iter()
				.map(|(id, value)| ItemRepr {
					id: id.clone(),
					value: value.clone(),
				})
				.collect(),
			extra: self.viewport,
		};
		repr.serialize(serializer)
	}
}

impl<'de> Deserialize<'de> for StateSnapshot {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		let repr = SnapshotRepr::deserialize(deserializer)?;
		let items = repr
			.items
			.into_iter()
			.map(|item| (item.id, item.value))
			.collect();
		Ok(Self::new(items, repr.extra))
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;
	use crate::entity::NodeEntity;

	fn snapshot_with_output() -> StateSnapshot {
		let mut node = NodeEntity::new("render", Vec2::new(0.0, 0.0));
		node.params.insert("samples".into(), json!(64));
		node.output = Some(json!({"pixels": [1, 2, 3]}));
		let mut items = IndexMap::new();
		items.insert(EntityId::from("n1"), EntityValue::Node(node));
		StateSnapshot::new(items, None)
	}

	#[test]
	fn sanitized_strips_runtime_output() {
		let snap = snapshot_with_output();
		let clean = snap.sanitized();
		let EntityValue::Node(node) = &clean.items()[&EntityId::from("n1")] else {
			panic!("expected node");
		};
		assert!(node.output.is_none());
		assert_eq!(node.params["samples"], json!(64));
		assert_eq!(
			snap.hash(),
			clean.hash(),
			"sanitization never changes structural identity"
		);
	}

	#[test]
	fn serde_round_trip_recomputes_hash() {
		let snap = snapshot_with_output();
		let text = serde_json::to_string(&snap).unwrap();
		assert!(!text.contains("hash"));
		let back: StateSnapshot = serde_json::from_str(&text).unwrap();
		assert_eq!(back.hash(), snap.hash());
		assert_eq!(back.items(), snap.items());
	}

	#[test]
	fn empty_snapshot_counts() {
		let snap = StateSnapshot::empty();
		assert!(snap.is_empty());
		assert_eq!(snap.node_count(), 0);
		assert_eq!(snap.relation_count(), 0);
	}
}
