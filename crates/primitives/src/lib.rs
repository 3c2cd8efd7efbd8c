//! Core value types shared across the weave editor.
//!
//! This crate defines the entity model of a document (nodes and the
//! relations wired between them), immutable state snapshots of that
//! model, and the structural hash used to decide snapshot equality
//! without deep comparison.
//!
//! Everything here is a plain value type: no I/O, no timers, no
//! history semantics. The history engine (`weave-history`) builds on
//! these types.

pub mod entity;
pub mod hash;
pub mod snapshot;

pub use entity::{EntityId, EntityValue, NodeEntity, RelationEntity, Vec2};
pub use hash::StateHash;
pub use snapshot::{StateSnapshot, ViewportInfo};
