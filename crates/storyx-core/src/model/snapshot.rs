//! Snapshot domain model
//!
//! A [`StateSnapshot`] is one record in an entity's append-only evolution log.
//! Keyframes carry the complete state; deltas carry only the fields that
//! changed relative to the previous snapshot in log order.

use crate::diff::model::{FieldChange, FieldChanges};
use crate::model::{EntityState, EntityType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why the snapshot was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeType {
    Initial,
    Update,
    MajorChange,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::Initial => "INITIAL",
            ChangeType::Update => "UPDATE",
            ChangeType::MajorChange => "MAJOR_CHANGE",
        }
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ChangeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INITIAL" => Ok(ChangeType::Initial),
            "UPDATE" => Ok(ChangeType::Update),
            "MAJOR_CHANGE" => Ok(ChangeType::MajorChange),
            other => Err(format!("unknown change type: {}", other)),
        }
    }
}

/// Snapshot body: a full state or a set of field changes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "fields", rename_all = "lowercase")]
pub enum SnapshotPayload {
    Keyframe(EntityState),
    Delta(FieldChanges),
}

impl SnapshotPayload {
    /// Build a delta payload keyed by each change's field path
    pub fn delta(changes: impl IntoIterator<Item = FieldChange>) -> Self {
        SnapshotPayload::Delta(
            changes
                .into_iter()
                .map(|c| (c.field_path.clone(), c))
                .collect(),
        )
    }

    pub fn is_keyframe(&self) -> bool {
        matches!(self, SnapshotPayload::Keyframe(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateSnapshot {
    /// Unique, time-ordered identifier (UUIDv7 unless supplied by the caller)
    pub id: String,
    pub entity_id: String,
    pub entity_type: EntityType,
    pub created_at: DateTime<Utc>,
    pub change_type: ChangeType,
    pub payload: SnapshotPayload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_summary: Option<String>,
    /// Confidence of the AI edit that produced this snapshot, 0..=1
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chapter_order: Option<i64>,
    /// Quote from the manuscript that motivated the change
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_text: Option<String>,
}

impl StateSnapshot {
    fn build(
        entity_id: impl Into<String>,
        entity_type: EntityType,
        change_type: ChangeType,
        payload: SnapshotPayload,
    ) -> Self {
        Self {
            id: uuid::Uuid::now_v7().to_string(),
            entity_id: entity_id.into(),
            entity_type,
            created_at: Utc::now(),
            change_type,
            payload,
            change_summary: None,
            ai_confidence: None,
            chapter_order: None,
            source_text: None,
        }
    }

    /// A snapshot carrying the complete state
    pub fn keyframe(
        entity_id: impl Into<String>,
        entity_type: EntityType,
        change_type: ChangeType,
        state: EntityState,
    ) -> Self {
        Self::build(
            entity_id,
            entity_type,
            change_type,
            SnapshotPayload::Keyframe(state),
        )
    }

    /// A snapshot carrying only changed fields
    pub fn delta(
        entity_id: impl Into<String>,
        entity_type: EntityType,
        change_type: ChangeType,
        changes: impl IntoIterator<Item = FieldChange>,
    ) -> Self {
        Self::build(
            entity_id,
            entity_type,
            change_type,
            SnapshotPayload::delta(changes),
        )
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.change_summary = Some(summary.into());
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.ai_confidence = Some(confidence);
        self
    }

    pub fn with_chapter_order(mut self, order: i64) -> Self {
        self.chapter_order = Some(order);
        self
    }

    pub fn with_source_text(mut self, text: impl Into<String>) -> Self {
        self.source_text = Some(text.into());
        self
    }

    pub fn is_keyframe(&self) -> bool {
        self.payload.is_keyframe()
    }
}
