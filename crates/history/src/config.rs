//! Tunables for the history engine.

use std::time::Duration;

use serde::Deserialize;

/// Configuration for graph limits, debounce windows, and payload
/// budgets.
///
/// All durations deserialize from integer milliseconds. The defaults
/// match interactive canvas editing: per-frame drag updates coalesce
/// into one entry, paste bursts collapse, and remote writes trail the
/// last mutation by most of a second.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HistoryConfig {
	/// Maximum nodes kept in the in-memory graph before FIFO pruning.
	pub max_nodes: usize,
	/// Maximum nodes in one outgoing serialized payload.
	pub payload_node_budget: usize,
	/// Minimum displacement (canvas units) before a move is recorded.
	pub position_epsilon: f32,
	/// Trailing debounce for the position track.
	#[serde(with = "duration_ms")]
	pub move_debounce: Duration,
	/// Separator window for the structural track.
	#[serde(with = "duration_ms")]
	pub action_separator: Duration,
	/// Debounce for remote persistence writes.
	#[serde(with = "duration_ms")]
	pub write_debounce: Duration,
	/// Capacity of the local offline diff buffer.
	pub offline_buffer_cap: usize,
	/// Serialized payloads at or above this many bytes are compressed.
	pub compress_threshold: usize,
}

impl Default for HistoryConfig {
	fn default() -> Self {
		Self {
			max_nodes: 500,
			payload_node_budget: 400,
			position_epsilon: 2.0,
			move_debounce: Duration::from_millis(120),
			action_separator: Duration::from_millis(200),
			write_debounce: Duration::from_millis(750),
			offline_buffer_cap: 64,
			compress_threshold: 16 * 1024,
		}
	}
}

mod duration_ms {
	use std::time::Duration;

	use serde::{Deserialize, Deserializer};

	pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
		let ms = u64::deserialize(deserializer)?;
		Ok(Duration::from_millis(ms))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn defaults_are_sane() {
		let cfg = HistoryConfig::default();
		assert!(cfg.payload_node_budget <= cfg.max_nodes);
		assert!(cfg.move_debounce < cfg.action_separator);
		assert!(cfg.action_separator < cfg.write_debounce);
	}

	#[test]
	fn durations_deserialize_from_millis() {
		let cfg: HistoryConfig =
			serde_json::from_str(r#"{"moveDebounce": 50, "maxNodes": 10}"#).unwrap();
		assert_eq!(cfg.move_debounce, Duration::from_millis(50));
		assert_eq!(cfg.max_nodes, 10);
		assert_eq!(cfg.write_debounce, Duration::from_millis(750));
	}
}
