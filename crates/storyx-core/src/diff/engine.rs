//! State diff computation.
//!
//! The entry point is [`diff`], which compares two materialized states field by
//! field. Values are compared through their canonical serialization, so two
//! objects that differ only in key order are equal.

use crate::diff::model::{ChangeSet, FieldChange, FieldChanges};
use crate::model::EntityState;
use serde_json::Value;
use std::collections::BTreeSet;

/// Serialize `value` with object keys sorted recursively.
///
/// Two values are structurally equal iff their canonical forms are
/// byte-identical.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                if let Some(inner) = map.get(key) {
                    write_canonical(inner, out);
                }
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// Structural equality of two JSON values
pub fn values_equal(a: &Value, b: &Value) -> bool {
    canonical_json(a) == canonical_json(b)
}

/// Compute the field changes that turn `from` into `to`.
///
/// Only paths whose values differ are emitted. A side is `None` exactly when
/// the path is absent from that state. The result iterates in lexicographic
/// field-path order.
pub fn diff(from: &EntityState, to: &EntityState) -> FieldChanges {
    let paths: BTreeSet<&String> = from.paths().chain(to.paths()).collect();

    let mut changes = FieldChanges::new();
    for path in paths {
        // A stored null counts as absent
        let old = from.get(path).filter(|v| !v.is_null());
        let new = to.get(path).filter(|v| !v.is_null());
        let unchanged = match (old, new) {
            (Some(a), Some(b)) => values_equal(a, b),
            (None, None) => true,
            _ => false,
        };
        if !unchanged {
            changes.insert(
                path.clone(),
                FieldChange::new(path.clone(), old.cloned(), new.cloned()),
            );
        }
    }

    tracing::debug!(
        from_fields = from.len(),
        to_fields = to.len(),
        change_count = changes.len(),
        "computed state diff"
    );

    changes
}

/// Diff two states and wrap the result with the snapshot identities
pub fn diff_states(
    entity_id: &str,
    from_snapshot_id: &str,
    from: &EntityState,
    to_snapshot_id: &str,
    to: &EntityState,
) -> ChangeSet {
    ChangeSet {
        entity_id: entity_id.to_string(),
        from_snapshot_id: from_snapshot_id.to_string(),
        to_snapshot_id: to_snapshot_id.to_string(),
        changes: diff(from, to),
    }
}
