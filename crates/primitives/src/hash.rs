//! Structural hashing for snapshot equality.
//!
//! History pushes compare the incoming document state against the
//! cursor's state on every candidate entry, so equality has to be
//! O(1) rather than a deep walk. Each snapshot carries a fixed-width
//! digest of its content; equal digests are treated as content-equal.
//! The collision probability of a 64-bit digest is an accepted
//! tradeoff for speed.
//!
//! The digest is a pure function of content: map entries are combined
//! with an order-independent fold so two snapshots that differ only in
//! insertion order hash equally. Runtime node `output` is excluded, so
//! a sanitized snapshot hashes the same as the live one it came from.

use std::hash::Hasher;

use indexmap::IndexMap;
use rustc_hash::FxHasher;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::entity::{EntityId, EntityValue, NodeEntity, RelationEntity, Vec2};
use crate::snapshot::ViewportInfo;

/// Fixed-width structural digest of a snapshot's content.
///
/// Serialized as a 16-digit hex string so it survives JSON consumers
/// that cannot represent the full u64 range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StateHash(pub u64);

impl std::fmt::Display for StateHash {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{:016x}", self.0)
	}
}

impl Serialize for StateHash {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_str(&format!("{:016x}", self.0))
	}
}

impl<'de> Deserialize<'de> for StateHash {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		let s = String::deserialize(deserializer)?;
		u64::from_str_radix(&s, 16)
			.map(StateHash)
			.map_err(serde::de::Error::custom)
	}
}

/// Computes the structural digest of a snapshot's content.
pub fn hash_state(items: &IndexMap<EntityId, EntityValue>, viewport: Option<&ViewportInfo>) -> StateHash {
	// Order-independent fold over entries: two snapshots holding the
	// same entities in different insertion order are the same state.
	let mut acc: u64 = 0xcbf2_9ce4_8422_2325;
	for (id, value) in items {
		acc = acc.wrapping_add(hash_entry(id, value));
	}
	if let Some(vp) = viewport {
		acc = acc.wrapping_add(hash_viewport(vp));
	}
	StateHash(acc)
}

fn hash_entry(id: &EntityId, value: &EntityValue) -> u64 {
	let mut h = FxHasher::default();
	h.write(id.as_str().as_bytes());
	match value {
		EntityValue::Node(n) => hash_node(&mut h, n),
		EntityValue::Relation(r) => hash_relation(&mut h, r),
	}
	h.finish()
}

fn hash_node(h: &mut FxHasher, n: &NodeEntity) {
	h.write_u8(1);
	h.write(n.kind.as_bytes());
	hash_vec2(h, n.position);
	hash_opt_f32(h, n.width);
	hash_opt_f32(h, n.height);
	// Params are keyed config; fold order-independently like the item
	// map itself.
	let mut params_acc: u64 = 0;
	for (key, value) in &n.params {
		let mut ph = FxHasher::default();
		ph.write(key.as_bytes());
		ph.write_u64(hash_json(value));
		params_acc = params_acc.wrapping_add(ph.finish());
	}
	h.write_u64(params_acc);
	// Runtime `output` is host-derived, not content: sanitized and
	// live snapshots must hash equal, and an output recompute is not
	// an edit.
}

fn hash_relation(h: &mut FxHasher, r: &RelationEntity) {
	h.write_u8(2);
	h.write(r.from.as_str().as_bytes());
	h.write(r.from_port.as_bytes());
	h.write(r.to.as_str().as_bytes());
	h.write(r.to_port.as_bytes());
}

fn hash_viewport(vp: &ViewportInfo) -> u64 {
	let mut h = FxHasher::default();
	h.write_u8(3);
	hash_vec2(&mut h, vp.pan);
	h.write_u32(vp.zoom.to_bits());
	h.finish()
}

fn hash_vec2(h: &mut FxHasher, v: Vec2) {
	h.write_u32(v.x.to_bits());
	h.write_u32(v.y.to_bits());
}

fn hash_opt_f32(h: &mut FxHasher, v: Option<f32>) {
	match v {
		Some(f) => {
			h.write_u8(1);
			h.write_u32(f.to_bits());
		}
		None => h.write_u8(0),
	}
}

/// Digests an arbitrary JSON value.
///
/// Arrays are order-sensitive, objects are not (JSON object key order
/// carries no meaning for equality here).
fn hash_json(value: &serde_json::Value) -> u64 {
	use serde_json::Value;
	let mut h = FxHasher::default();
	match value {
		Value::Null => h.write_u8(0),
		Value::Bool(b) => {
			h.write_u8(1);
			h.write_u8(*b as u8);
		}
		Value::Number(n) => {
			h.write_u8(2);
			// Canonicalize through the display form so 1 and 1.0
			// coming from different producers stay distinct only when
			// serde_json itself distinguishes them.
			h.write(n.to_string().as_bytes());
		}
		Value::String(s) => {
			h.write_u8(3);
			h.write(s.as_bytes());
		}
		Value::Array(items) => {
			h.write_u8(4);
			h.write_usize(items.len());
			for item in items {
				h.write_u64(hash_json(item));
			}
		}
		Value::Object(map) => {
			h.write_u8(5);
			let mut acc: u64 = 0;
			for (key, val) in map {
				let mut eh = FxHasher::default();
				eh.write(key.as_bytes());
				eh.write_u64(hash_json(val));
				acc = acc.wrapping_add(eh.finish());
			}
			h.write_u64(acc);
		}
	}
	h.finish()
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;
	use crate::entity::NodeEntity;

	fn node(kind: &str, x: f32, y: f32) -> EntityValue {
		EntityValue::Node(NodeEntity::new(kind, Vec2::new(x, y)))
	}

	#[test]
	fn equal_content_hashes_equal() {
		let mut a = IndexMap::new();
		a.insert(EntityId::from("n1"), node("osc", 10.0, 20.0));
		a.insert(EntityId::from("n2"), node("gain", 30.0, 40.0));
		let mut b = IndexMap::new();
		b.insert(EntityId::from("n1"), node("osc", 10.0, 20.0));
		b.insert(EntityId::from("n2"), node("gain", 30.0, 40.0));
		assert_eq!(hash_state(&a, None), hash_state(&b, None));
	}

	#[test]
	fn insertion_order_does_not_matter() {
		let mut a = IndexMap::new();
		a.insert(EntityId::from("n1"), node("osc", 1.0, 1.0));
		a.insert(EntityId::from("n2"), node("gain", 2.0, 2.0));
		let mut b = IndexMap::new();
		b.insert(EntityId::from("n2"), node("gain", 2.0, 2.0));
		b.insert(EntityId::from("n1"), node("osc", 1.0, 1.0));
		assert_eq!(hash_state(&a, None), hash_state(&b, None));
	}

	#[test]
	fn position_change_changes_hash() {
		let mut a = IndexMap::new();
		a.insert(EntityId::from("n1"), node("osc", 1.0, 1.0));
		let mut b = IndexMap::new();
		b.insert(EntityId::from("n1"), node("osc", 1.0, 2.0));
		assert_ne!(hash_state(&a, None), hash_state(&b, None));
	}

	#[test]
	fn runtime_output_is_excluded_from_hash() {
		let mut with_output = NodeEntity::new("render", Vec2::new(1.0, 1.0));
		with_output.output = Some(json!({"pixels": [0, 1, 2]}));
		let mut a = IndexMap::new();
		a.insert(EntityId::from("n1"), EntityValue::Node(with_output));
		let mut b = IndexMap::new();
		b.insert(EntityId::from("n1"), node("render", 1.0, 1.0));
		assert_eq!(hash_state(&a, None), hash_state(&b, None));
	}

	#[test]
	fn viewport_participates_in_hash() {
		let items = IndexMap::new();
		let vp = ViewportInfo {
			pan: Vec2::new(5.0, 5.0),
			zoom: 1.5,
		};
		assert_ne!(hash_state(&items, None), hash_state(&items, Some(&vp)));
	}

	#[test]
	fn json_object_key_order_is_irrelevant() {
		assert_eq!(
			hash_json(&json!({"a": 1, "b": [1, 2]})),
			hash_json(&json!({"b": [1, 2], "a": 1})),
		);
		assert_ne!(
			hash_json(&json!({"a": [1, 2]})),
			hash_json(&json!({"a": [2, 1]})),
		);
	}

	#[test]
	fn hash_serde_is_hex() {
		let h = StateHash(0xdead_beef);
		let s = serde_json::to_string(&h).unwrap();
		assert_eq!(s, "\"00000000deadbeef\"");
		let back: StateHash = serde_json::from_str(&s).unwrap();
		assert_eq!(back, h);
	}
}
