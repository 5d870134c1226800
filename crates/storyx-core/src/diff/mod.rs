//! State diff engine.
//!
//! Compares two materialized entity states and produces a field-path-keyed
//! change set for review displays and comparison requests.
//!
//! ## Entry point
//!
//! ```
//! use serde_json::json;
//! use storyx_core::diff::diff;
//! use storyx_core::model::EntityState;
//!
//! let a = EntityState::from_json(&json!({"name": "Alice"}));
//! let b = EntityState::from_json(&json!({"name": "Alicia", "age": "30"}));
//! let changes = diff(&a, &b);
//! assert_eq!(changes.keys().collect::<Vec<_>>(), vec!["age", "name"]);
//! ```
//!
//! ## Guarantees
//!
//! - **Determinism**: results iterate in lexicographic field-path order.
//! - **Structural equality**: values compare by canonical serialization, so
//!   object key order never produces a change.
//! - **Symmetry**: `diff(a, b)` and `diff(b, a)` cover the same paths with
//!   sides swapped.

pub mod engine;
pub mod human_summary;
pub mod model;

pub use engine::{canonical_json, diff, diff_states};
pub use human_summary::render_human_summary;
pub use model::{ChangeCounts, ChangeSet, FieldChange, FieldChanges};
