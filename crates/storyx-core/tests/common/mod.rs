use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;
use storyx_core::model::{ChangeType, EntityState, EntityType, RawFinding, StateSnapshot, WarningType};
use storyx_core::FieldChange;

/// Fixed base time plus `secs`
#[allow(dead_code)]
pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

/// Keyframe for `entity` built from a nested JSON object
#[allow(dead_code)]
pub fn keyframe(entity: &str, secs: i64, value: Value) -> StateSnapshot {
    StateSnapshot::keyframe(
        entity,
        EntityType::Character,
        ChangeType::Initial,
        EntityState::from_json(&value),
    )
    .at(at(secs))
}

/// Single-field delta; `None` on a side means the field is absent there
#[allow(dead_code)]
pub fn delta(entity: &str, secs: i64, path: &str, old: Option<Value>, new: Option<Value>) -> StateSnapshot {
    StateSnapshot::delta(
        entity,
        EntityType::Character,
        ChangeType::Update,
        vec![FieldChange::new(path, old, new)],
    )
    .at(at(secs))
}

#[allow(dead_code)]
pub fn finding(id: &str, warning_type: WarningType, severity: Option<&str>) -> RawFinding {
    RawFinding {
        id: Some(id.to_string()),
        entity_id: "alice".to_string(),
        entity_type: EntityType::Character,
        entity_name: "Alice".to_string(),
        warning_type,
        severity: severity.map(String::from),
        description: format!("finding {}", id),
        suggestion: Some("check chapter 3".to_string()),
        expected_value: Some("Alice".to_string()),
        actual_value: None,
    }
}
