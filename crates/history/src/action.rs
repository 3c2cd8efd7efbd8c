//! Classified edit actions and their history labels.
//!
//! Every history entry carries an [`ActionMeta`] describing what kind
//! of edit produced it. This is a closed enum rather than a free-form
//! metadata bag so label selection in the classifier is exhaustively
//! matched and new action kinds cannot silently fall through.

use serde::{Deserialize, Serialize};

/// Kind of edit that produced a history entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ActionMeta {
	/// One or more entities dragged to new positions.
	Move { count: usize },
	/// Node entities added.
	AddNodes { count: usize },
	/// Node entities removed.
	RemoveNodes { count: usize },
	/// Relations wired.
	AddRelations { count: usize },
	/// Relations removed.
	RemoveRelations { count: usize },
	/// Several structural deltas landed in one window.
	Bulk,
	/// A host-initiated action recorded through the public API.
	Manual { action: String },
}

impl ActionMeta {
	/// Human-readable label shown in the history timeline.
	pub fn label(&self) -> String {
		fn plural(count: usize, singular: &str, plural: &str) -> String {
			if count == 1 {
				format!("1 {singular}")
			} else {
				format!("{count} {plural}")
			}
		}
		match self {
			Self::Move { count } => format!("Move {}", plural(*count, "entity", "entities")),
			Self::AddNodes { count } => format!("Add {}", plural(*count, "node", "nodes")),
			Self::RemoveNodes { count } => {
				format!("Delete {}", plural(*count, "node", "nodes"))
			}
			Self::AddRelations { count } => {
				format!("Connect {}", plural(*count, "relation", "relations"))
			}
			Self::RemoveRelations { count } => {
				format!("Disconnect {}", plural(*count, "relation", "relations"))
			}
			Self::Bulk => "Bulk update".to_string(),
			Self::Manual { action } => action.clone(),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn labels_pluralize() {
		assert_eq!(ActionMeta::Move { count: 1 }.label(), "Move 1 entity");
		assert_eq!(ActionMeta::Move { count: 3 }.label(), "Move 3 entities");
		assert_eq!(ActionMeta::AddNodes { count: 1 }.label(), "Add 1 node");
		assert_eq!(
			ActionMeta::RemoveRelations { count: 2 }.label(),
			"Disconnect 2 relations"
		);
		assert_eq!(ActionMeta::Bulk.label(), "Bulk update");
	}

	#[test]
	fn meta_serde_is_tagged() {
		let text = serde_json::to_string(&ActionMeta::AddNodes { count: 2 }).unwrap();
		assert_eq!(text, r#"{"kind":"addNodes","count":2}"#);
	}
}
