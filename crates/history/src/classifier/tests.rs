//! Behavior-lock tests for the debounced edit classifier.

use std::time::{Duration, Instant};

use indexmap::IndexMap;
use serde_json::json;
use weave_primitives::{
	EntityId, EntityValue, NodeEntity, RelationEntity, StateSnapshot, Vec2,
};

use super::*;

fn node(kind: &str, x: f32, y: f32) -> EntityValue {
	EntityValue::Node(NodeEntity::new(kind, Vec2::new(x, y)))
}

fn relation(from: &str, to: &str) -> EntityValue {
	EntityValue::Relation(RelationEntity {
		from: EntityId::from(from),
		to: EntityId::from(to),
		from_port: "out".into(),
		to_port: "in".into(),
	})
}

fn snapshot(entries: &[(&str, EntityValue)]) -> StateSnapshot {
	let mut items = IndexMap::new();
	for (id, value) in entries {
		items.insert(EntityId::from(*id), value.clone());
	}
	StateSnapshot::new(items, None)
}

fn classifier(initial: StateSnapshot) -> EditClassifier {
	EditClassifier::new(&HistoryConfig::default(), initial)
}

#[test]
fn rapid_drag_updates_coalesce_into_one_action() {
	// Scenario: 60 per-frame position updates inside the debounce
	// window yield exactly one history entry.
	let start = Instant::now();
	let mut cl = classifier(snapshot(&[("n1", node("osc", 0.0, 0.0))]));

	let mut flushed = Vec::new();
	for frame in 1..=60u32 {
		let x = frame as f32 * 4.0;
		let now = start + Duration::from_millis(frame as u64);
		flushed.extend(cl.observe(&snapshot(&[("n1", node("osc", x, 0.0))]), now));
	}
	assert!(flushed.is_empty(), "nothing flushes inside the window");
	assert!(cl.has_pending());

	let after = start + Duration::from_millis(60 + 121);
	let actions = cl.poll(after);
	assert_eq!(actions.len(), 1);
	assert_eq!(actions[0].meta, ActionMeta::Move { count: 1 });
	let position = actions[0].state.items()[&EntityId::from("n1")]
		.position()
		.unwrap();
	assert_eq!(position.x, 240.0, "flushed state is the final drag frame");
	assert!(!cl.has_pending());
}

#[test]
fn gesture_release_flushes_before_the_deadline() {
	let start = Instant::now();
	let mut cl = classifier(snapshot(&[("n1", node("osc", 0.0, 0.0))]));
	cl.observe(&snapshot(&[("n1", node("osc", 50.0, 0.0))]), start);

	let action = cl.gesture_released().expect("pending move flushes");
	assert_eq!(action.meta, ActionMeta::Move { count: 1 });
	assert!(!cl.has_pending());
}

#[test]
fn sub_threshold_jitter_is_ignored() {
	let start = Instant::now();
	let mut cl = classifier(snapshot(&[("n1", node("osc", 0.0, 0.0))]));
	cl.observe(&snapshot(&[("n1", node("osc", 1.0, 0.5))]), start);
	assert!(!cl.has_pending());
}

#[test]
fn paste_burst_collapses_into_one_add_entry() {
	let start = Instant::now();
	let mut cl = classifier(StateSnapshot::empty());

	let mut entries: Vec<(String, EntityValue)> = Vec::new();
	for i in 0..10 {
		entries.push((format!("n{i}"), node("osc", i as f32 * 10.0, 0.0)));
		let borrowed: Vec<(&str, EntityValue)> = entries
			.iter()
			.map(|(id, v)| (id.as_str(), v.clone()))
			.collect();
		let now = start + Duration::from_millis(i as u64 * 10);
		let due = cl.observe(&snapshot(&borrowed), now);
		assert!(due.is_empty());
	}

	let actions = cl.poll(start + Duration::from_millis(90 + 201));
	assert_eq!(actions.len(), 1);
	assert_eq!(actions[0].meta, ActionMeta::AddNodes { count: 10 });
}

#[test]
fn spaced_structural_edits_become_separate_entries() {
	let start = Instant::now();
	let mut cl = classifier(StateSnapshot::empty());

	cl.observe(&snapshot(&[("n1", node("osc", 0.0, 0.0))]), start);
	let first = cl.observe(
		&snapshot(&[
			("n1", node("osc", 0.0, 0.0)),
			("n2", node("gain", 10.0, 0.0)),
		]),
		start + Duration::from_millis(500),
	);
	assert_eq!(first.len(), 1, "first add flushed when the separator elapsed");
	assert_eq!(first[0].meta, ActionMeta::AddNodes { count: 1 });

	let second = cl.poll(start + Duration::from_millis(800));
	assert_eq!(second.len(), 1);
	assert_eq!(second[0].meta, ActionMeta::AddNodes { count: 1 });
}

#[test]
fn relation_deltas_label_as_relations() {
	let start = Instant::now();
	let base = snapshot(&[
		("n1", node("osc", 0.0, 0.0)),
		("n2", node("gain", 10.0, 0.0)),
	]);
	let mut cl = classifier(base.clone());

	cl.observe(
		&snapshot(&[
			("n1", node("osc", 0.0, 0.0)),
			("n2", node("gain", 10.0, 0.0)),
			("r1", relation("n1", "n2")),
		]),
		start,
	);
	let actions = cl.poll(start + Duration::from_millis(201));
	assert_eq!(actions.len(), 1);
	assert_eq!(actions[0].meta, ActionMeta::AddRelations { count: 1 });
}

#[test]
fn simultaneous_deltas_fall_back_to_bulk() {
	let start = Instant::now();
	let mut cl = classifier(snapshot(&[("n1", node("osc", 0.0, 0.0))]));

	// n1 removed and n2 added in one burst.
	cl.observe(&snapshot(&[("n2", node("gain", 5.0, 5.0))]), start);
	let actions = cl.poll(start + Duration::from_millis(201));
	assert_eq!(actions.len(), 1);
	assert_eq!(actions[0].meta, ActionMeta::Bulk);
}

#[test]
fn param_edit_flows_through_the_structural_track() {
	let start = Instant::now();
	let mut cl = classifier(snapshot(&[("n1", node("osc", 0.0, 0.0))]));

	let mut edited = NodeEntity::new("osc", Vec2::new(0.0, 0.0));
	edited.params.insert("freq".into(), json!(440));
	cl.observe(
		&snapshot(&[("n1", EntityValue::Node(edited))]),
		start,
	);
	let actions = cl.poll(start + Duration::from_millis(201));
	assert_eq!(actions.len(), 1);
	assert_eq!(actions[0].meta, ActionMeta::Bulk);
}

#[test]
fn output_recompute_is_not_an_edit() {
	// The host re-deriving a node's runtime output (routine after any
	// evaluation pass) must never open a window or produce an entry.
	let start = Instant::now();
	let mut cl = classifier(snapshot(&[("n1", node("osc", 0.0, 0.0))]));

	let mut recomputed = NodeEntity::new("osc", Vec2::new(0.0, 0.0));
	recomputed.output = Some(json!({"samples": [0.0, 0.5, 1.0]}));
	let due = cl.observe(
		&snapshot(&[("n1", EntityValue::Node(recomputed))]),
		start,
	);

	assert!(due.is_empty());
	assert!(!cl.has_pending());
	assert!(cl.poll(start + Duration::from_millis(1000)).is_empty());
}

#[test]
fn drag_with_output_recompute_still_classifies_as_move() {
	let start = Instant::now();
	let mut cl = classifier(snapshot(&[("n1", node("osc", 0.0, 0.0))]));

	let mut dragged = NodeEntity::new("osc", Vec2::new(40.0, 0.0));
	dragged.output = Some(json!({"samples": [1.0]}));
	cl.observe(&snapshot(&[("n1", EntityValue::Node(dragged))]), start);

	let actions = cl.poll(start + Duration::from_millis(121));
	assert_eq!(actions.len(), 1);
	assert_eq!(actions[0].meta, ActionMeta::Move { count: 1 });
}

#[test]
fn replay_is_never_recorded() {
	let start = Instant::now();
	let mut cl = classifier(snapshot(&[("n1", node("osc", 0.0, 0.0))]));

	cl.begin_replay();
	let during = cl.observe(&snapshot(&[("n2", node("gain", 9.0, 9.0))]), start);
	cl.end_replay();

	assert!(during.is_empty());
	assert!(!cl.has_pending());
	assert!(cl
		.poll(start + Duration::from_millis(1000))
		.is_empty());
}

#[test]
fn empty_transition_is_not_auto_recorded() {
	let start = Instant::now();
	let mut cl = classifier(snapshot(&[("n1", node("osc", 0.0, 0.0))]));

	cl.observe(&StateSnapshot::empty(), start);
	assert!(!cl.has_pending(), "non-empty -> empty is treated as a remount");

	// A later real edit still diffs against the non-empty baseline.
	cl.observe(
		&snapshot(&[
			("n1", node("osc", 0.0, 0.0)),
			("n2", node("gain", 1.0, 1.0)),
		]),
		start + Duration::from_millis(10),
	);
	let actions = cl.poll(start + Duration::from_millis(10 + 201));
	assert_eq!(actions.len(), 1);
	assert_eq!(actions[0].meta, ActionMeta::AddNodes { count: 1 });
}

#[test]
fn flush_all_drains_pending_windows() {
	let start = Instant::now();
	let mut cl = classifier(snapshot(&[("n1", node("osc", 0.0, 0.0))]));
	cl.observe(&snapshot(&[("n1", node("osc", 80.0, 0.0))]), start);
	assert!(cl.has_pending());

	let drained = cl.flush_all();
	assert_eq!(drained.len(), 1);
	assert!(!cl.has_pending());
	assert!(cl.next_deadline().is_none());
}
