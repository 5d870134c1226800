//! Diff output types.
//!
//! Collections use `BTreeMap` so that iteration and serialization follow the
//! lexicographic order of field paths.

use crate::rules::classification::ChangeKind;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// One changed field between two states.
///
/// Also the unit of a delta snapshot's payload. An absent `old_value` means
/// the field was added, an absent `new_value` that it was removed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldChange {
    pub field_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_text: Option<String>,
}

impl FieldChange {
    /// Build a change, treating JSON `null` on either side as absent
    pub fn new(
        field_path: impl Into<String>,
        old_value: Option<Value>,
        new_value: Option<Value>,
    ) -> Self {
        Self {
            field_path: field_path.into(),
            old_value: old_value.filter(|v| !v.is_null()),
            new_value: new_value.filter(|v| !v.is_null()),
            change_reason: None,
            source_text: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.change_reason = Some(reason.into());
        self
    }

    pub fn with_source_text(mut self, text: impl Into<String>) -> Self {
        self.source_text = Some(text.into());
        self
    }

    /// Derived classification; `None` only for a degenerate change where both
    /// sides are absent.
    pub fn kind(&self) -> Option<ChangeKind> {
        ChangeKind::classify(self.old_value.as_ref(), self.new_value.as_ref())
    }

    /// The same change seen from the other direction
    pub fn reversed(&self) -> Self {
        Self {
            field_path: self.field_path.clone(),
            old_value: self.new_value.clone(),
            new_value: self.old_value.clone(),
            change_reason: self.change_reason.clone(),
            source_text: self.source_text.clone(),
        }
    }
}

/// Field changes keyed by field path
pub type FieldChanges = BTreeMap<String, FieldChange>;

/// Per-kind tallies of a change set
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeCounts {
    pub added: usize,
    pub removed: usize,
    pub modified: usize,
}

impl ChangeCounts {
    pub fn total(&self) -> usize {
        self.added + self.removed + self.modified
    }
}

/// The result of comparing two snapshots of one entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeSet {
    pub entity_id: String,
    pub from_snapshot_id: String,
    pub to_snapshot_id: String,
    pub changes: FieldChanges,
}

impl ChangeSet {
    pub fn counts(&self) -> ChangeCounts {
        let mut counts = ChangeCounts::default();
        for change in self.changes.values() {
            match change.kind() {
                Some(ChangeKind::Added) => counts.added += 1,
                Some(ChangeKind::Removed) => counts.removed += 1,
                Some(ChangeKind::Modified) => counts.modified += 1,
                None => {}
            }
        }
        counts
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Changes of one kind, in field-path order
    pub fn of_kind(&self, kind: ChangeKind) -> impl Iterator<Item = &FieldChange> {
        self.changes
            .values()
            .filter(move |c| c.kind() == Some(kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_null_is_normalized_to_absent() {
        let change = FieldChange::new("age", Some(Value::Null), Some(json!("30")));
        assert_eq!(change.old_value, None);
        assert_eq!(change.kind(), Some(ChangeKind::Added));
    }

    #[test]
    fn test_serialized_shape_is_camel_case() {
        let change = FieldChange::new("name", Some(json!("Alice")), Some(json!("Alicia")))
            .with_reason("renamed in chapter 3");
        let v = serde_json::to_value(&change).unwrap();
        assert_eq!(v["fieldPath"], json!("name"));
        assert_eq!(v["oldValue"], json!("Alice"));
        assert_eq!(v["newValue"], json!("Alicia"));
        assert_eq!(v["changeReason"], json!("renamed in chapter 3"));
        assert!(v.get("sourceText").is_none());
    }

    #[test]
    fn test_counts_by_kind() {
        let mut changes = FieldChanges::new();
        for c in [
            FieldChange::new("a", None, Some(json!(1))),
            FieldChange::new("b", Some(json!(1)), None),
            FieldChange::new("c", Some(json!(1)), Some(json!(2))),
            FieldChange::new("d", Some(json!(1)), Some(json!(3))),
        ] {
            changes.insert(c.field_path.clone(), c);
        }
        let set = ChangeSet {
            entity_id: "e".into(),
            from_snapshot_id: "s1".into(),
            to_snapshot_id: "s2".into(),
            changes,
        };
        let counts = set.counts();
        assert_eq!((counts.added, counts.removed, counts.modified), (1, 1, 2));
        assert_eq!(counts.total(), 4);
        assert_eq!(set.of_kind(ChangeKind::Modified).count(), 2);
    }
}
