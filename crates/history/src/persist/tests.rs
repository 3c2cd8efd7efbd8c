//! Tests for the wire codec, schedulers, buffers, and reconciliation.

use std::time::{Duration, Instant};

use chrono::{TimeZone, Utc};
use indexmap::IndexMap;
use serde_json::json;
use weave_primitives::{EntityId, EntityValue, NodeEntity, StateSnapshot, Vec2};

use super::*;
use crate::graph::{HistoryGraph, NodeId};

fn snap(x: f32) -> StateSnapshot {
	let mut items = IndexMap::new();
	items.insert(
		EntityId::from("n1"),
		EntityValue::Node(NodeEntity::new("osc", Vec2::new(x, 0.0))),
	);
	StateSnapshot::new(items, None)
}

fn chain(len: usize) -> HistoryGraph {
	let mut graph = HistoryGraph::new(snap(0.0));
	for i in 1..len {
		graph.push("step", snap(i as f32), None).unwrap();
	}
	graph
}

#[test]
fn wire_round_trip_preserves_structure() {
	let mut graph = chain(4);
	graph.undo().unwrap();

	let payload = WireGraph::from_graph(&graph, false, 0).encode(0).unwrap();
	assert!(!payload.starts_with(wire::COMPRESSED_PREFIX));

	let back = WireGraph::decode(&payload).unwrap().into_graph().unwrap();
	assert_eq!(back.len(), graph.len());
	assert_eq!(back.root_id(), graph.root_id());
	assert_eq!(back.cursor_id(), graph.cursor_id());
	assert_eq!(
		back.cursor_state().unwrap().hash(),
		graph.cursor_state().unwrap().hash()
	);
}

#[test]
fn wire_encoding_is_deterministic() {
	let graph = chain(5);
	let a = WireGraph::from_graph(&graph, true, 0).encode(0).unwrap();
	let b = WireGraph::from_graph(&graph, true, 0).encode(0).unwrap();
	assert_eq!(a, b);
}

#[test]
fn large_payloads_compress_transparently() {
	let graph = chain(30);
	let wire = WireGraph::from_graph(&graph, false, 0);
	let plain = wire.encode(0).unwrap();
	let compressed = wire.encode(64).unwrap();

	assert!(compressed.starts_with(wire::COMPRESSED_PREFIX));
	assert!(compressed.len() < plain.len());

	let back = WireGraph::decode(&compressed).unwrap().into_graph().unwrap();
	assert_eq!(back.len(), graph.len());
}

#[test]
fn decode_rejects_garbage_compressed_payload() {
	assert!(WireGraph::decode("b64br:@@not-base64@@").is_err());
	assert!(WireGraph::decode("{\"not\": \"a graph\"}").is_err());
}

#[test]
fn sanitized_payload_strips_runtime_output() {
	let mut node = NodeEntity::new("render", Vec2::new(0.0, 0.0));
	node.output = Some(json!({"pixels": [0, 1, 2]}));
	let mut items = IndexMap::new();
	items.insert(EntityId::from("n1"), EntityValue::Node(node));
	let graph = HistoryGraph::new(StateSnapshot::new(items, None));

	let payload = WireGraph::from_graph(&graph, true, 0).encode(0).unwrap();
	assert!(!payload.contains("pixels"));
}

#[test]
fn payload_capping_leaves_in_memory_graph_untouched() {
	let graph = chain(10);
	let wire = WireGraph::from_graph(&graph, false, 3);
	assert_eq!(wire.nodes.len(), 3);
	assert_eq!(graph.len(), 10, "capping works on a clone");

	let capped = wire.into_graph().unwrap();
	assert_eq!(capped.len(), 3);
	// Newest state survives as the tip of the capped payload.
	assert_eq!(
		capped.cursor_state().unwrap().hash(),
		graph.cursor_state().unwrap().hash()
	);
}

#[test]
fn capping_branchy_graph_drops_exactly_the_excess() {
	// Two branches of two nodes each under the root; a budget one
	// short costs one node, not a whole branch.
	let mut graph = HistoryGraph::new(snap(0.0));
	graph.push("A", snap(1.0), None).unwrap();
	graph.push("B", snap(2.0), None).unwrap();
	let root = graph.root_id();
	graph.set_cursor(root).unwrap();
	graph.push("C", snap(3.0), None).unwrap();
	graph.push("D", snap(4.0), None).unwrap();

	let wire = WireGraph::from_graph(&graph, false, 4);
	assert_eq!(wire.nodes.len(), 4);

	let capped = wire.into_graph().unwrap();
	assert_eq!(capped.cursor_id(), graph.cursor_id());
	assert_eq!(capped.root_id(), root);
	assert_eq!(
		capped.get(root).unwrap().children().len(),
		2,
		"both branches survive the cap"
	);
}

#[test]
fn corrupt_wire_graph_fails_validation() {
	let graph = chain(3);
	let mut wire = WireGraph::from_graph(&graph, false, 0);
	wire.cursor = NodeId::new();
	assert!(wire.into_graph().is_err());
}

#[test]
fn offline_buffer_evicts_oldest_past_capacity() {
	let mut buffer = LocalOfflineBuffer::new(3);
	let base = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
	let ids: Vec<NodeId> = (0..5).map(|i| NodeId::from_u128(i as u128 + 1)).collect();
	for (i, id) in ids.iter().enumerate() {
		buffer.push(OfflineDiffRecord {
			id: *id,
			parent_id: None,
			resulting_state: snap(i as f32),
			created_at: base + chrono::Duration::seconds(i as i64),
		});
	}
	assert_eq!(buffer.len(), 3);
	let drained = buffer.drain_ordered();
	assert_eq!(
		drained.iter().map(|r| r.id).collect::<Vec<_>>(),
		&ids[2..],
		"two oldest were evicted"
	);
	assert!(buffer.is_empty());
}

#[test]
fn reconcile_replays_buffered_diffs_in_order() {
	// Scenario: a remote snapshot plus two buffered diffs yields a
	// cursor on the second diff's id and both ids in the node map.
	let remote = chain(2);
	let cursor = remote.cursor_id();
	let base = Utc.with_ymd_and_hms(2026, 1, 2, 9, 0, 0).unwrap();

	let first = NodeId::from_u128(0xa1);
	let second = NodeId::from_u128(0xa2);
	let mut buffer = LocalOfflineBuffer::new(8);
	// Inserted out of order; created_at decides replay order.
	buffer.push(OfflineDiffRecord {
		id: second,
		parent_id: Some(first),
		resulting_state: snap(21.0),
		created_at: base + chrono::Duration::seconds(2),
	});
	buffer.push(OfflineDiffRecord {
		id: first,
		parent_id: Some(cursor),
		resulting_state: snap(20.0),
		created_at: base + chrono::Duration::seconds(1),
	});

	let (merged, report) = reconcile(remote, &mut buffer);
	assert_eq!(report.applied, 2);
	assert_eq!(report.discarded, 0);
	assert!(buffer.is_empty());
	assert_eq!(merged.cursor_id(), second);
	assert_eq!(merged.get(first).unwrap().parent_id, Some(cursor));
	assert_eq!(merged.get(second).unwrap().parent_id, Some(first));
	assert_eq!(
		merged.cursor_state().unwrap().hash(),
		snap(21.0).hash()
	);
}

#[test]
fn reconcile_overwrites_existing_ids_last_writer_wins() {
	let remote = chain(3);
	let existing = remote.cursor_id();
	let mut buffer = LocalOfflineBuffer::new(8);
	buffer.push(OfflineDiffRecord {
		id: existing,
		parent_id: remote.get(existing).unwrap().parent_id,
		resulting_state: snap(99.0),
		created_at: Utc::now(),
	});

	let (merged, report) = reconcile(remote, &mut buffer);
	assert_eq!(report.applied, 1);
	assert_eq!(merged.len(), 3, "overwrite does not grow the graph");
	assert_eq!(merged.get(existing).unwrap().state.hash(), snap(99.0).hash());
}

#[test]
fn reconcile_discards_self_parented_diffs() {
	let remote = chain(2);
	let mut buffer = LocalOfflineBuffer::new(8);
	let id = NodeId::from_u128(0xbad);
	buffer.push(OfflineDiffRecord {
		id,
		parent_id: Some(id),
		resulting_state: snap(1.0),
		created_at: Utc::now(),
	});

	let (merged, report) = reconcile(remote, &mut buffer);
	assert_eq!(report.applied, 0);
	assert_eq!(report.discarded, 1);
	assert!(merged.get(id).is_none());
}

#[test]
fn cache_discards_corrupt_payloads() {
	let mut cache = SnapshotCache::seed("definitely not json".into());
	assert!(cache.load().is_none());
	assert!(cache.payload().is_none(), "corrupt payload cleared");

	let graph = chain(2);
	let payload = WireGraph::from_graph(&graph, false, 0).encode(0).unwrap();
	cache.store(payload);
	let loaded = cache.load().expect("good payload decodes");
	assert_eq!(loaded.len(), 2);
}

#[test]
fn write_scheduler_debounces_and_skips_identical_payloads() {
	let start = Instant::now();
	let mut sched = WriteScheduler::new(Duration::from_millis(750));
	assert!(!sched.due(start));

	sched.mark_dirty(start);
	assert!(!sched.due(start + Duration::from_millis(500)));
	// A new mutation restarts the trailing window.
	sched.mark_dirty(start + Duration::from_millis(500));
	assert!(!sched.due(start + Duration::from_millis(1000)));
	assert!(sched.due(start + Duration::from_millis(1250)));

	let payload = sched.accept("payload-a".into()).expect("first write goes out");
	sched.note_written(payload);
	assert!(!sched.is_dirty());

	sched.mark_dirty(start + Duration::from_millis(2000));
	assert!(
		sched.accept("payload-a".into()).is_none(),
		"byte-identical payload skipped"
	);
	assert!(!sched.is_dirty(), "skipped write still satisfies the flag");

	sched.mark_dirty(start + Duration::from_millis(3000));
	assert!(sched.accept("payload-b".into()).is_some());
}

#[test]
fn write_scheduler_rearms_after_failure() {
	let start = Instant::now();
	let mut sched = WriteScheduler::new(Duration::from_millis(750));
	sched.mark_dirty(start);
	assert!(sched.due(start + Duration::from_millis(750)));

	let _ = sched.accept("payload".into());
	sched.note_failed(start + Duration::from_millis(750));
	assert!(sched.is_dirty());
	assert!(!sched.due(start + Duration::from_millis(1000)));
	assert!(sched.due(start + Duration::from_millis(1500)));
}
