//! Snapshot production from full states
//!
//! Callers that only know an entity's new complete state hand it over as a
//! [`StateUpdate`]; the producer diffs it against the tail and decides between
//! a delta and a keyframe.

use crate::diff::engine::diff;
use crate::errors::Result;
use crate::model::{ChangeType, EntityState, EntityType, SnapshotPayload, StateSnapshot};
use crate::snapshot::log::CompactionPolicy;
use crate::snapshot::reconstruct::{materialize_at, snapshot_ref};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;

/// A new complete state for an entity plus provenance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateUpdate {
    pub entity_id: String,
    pub entity_type: EntityType,
    pub change_type: ChangeType,
    pub state: EntityState,
    #[serde(default)]
    pub change_summary: Option<String>,
    #[serde(default)]
    pub ai_confidence: Option<f64>,
    #[serde(default)]
    pub chapter_order: Option<i64>,
    #[serde(default)]
    pub source_text: Option<String>,
    /// Copied onto every field change of the produced delta
    #[serde(default)]
    pub change_reason: Option<String>,
}

impl StateUpdate {
    pub fn new(
        entity_id: impl Into<String>,
        entity_type: EntityType,
        change_type: ChangeType,
        state: EntityState,
    ) -> Self {
        Self {
            entity_id: entity_id.into(),
            entity_type,
            change_type,
            state,
            change_summary: None,
            ai_confidence: None,
            chapter_order: None,
            source_text: None,
            change_reason: None,
        }
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

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.change_reason = Some(reason.into());
        self
    }
}

/// Turn `update` into the next snapshot of `log`.
///
/// Returns `None` when the new state equals the tail's materialized state.
/// The timestamp is `now`, clamped so it never precedes the tail.
///
/// # Errors
///
/// Propagates replay failures of a malformed log.
pub fn produce_snapshot<S: Borrow<StateSnapshot>>(
    log: &[S],
    update: StateUpdate,
    policy: &CompactionPolicy,
    now: DateTime<Utc>,
) -> Result<Option<StateSnapshot>> {
    let keyframe = policy.wants_keyframe(log, update.change_type);

    let (payload, created_at) = match log.last() {
        None => (SnapshotPayload::Keyframe(update.state), now),
        Some(tail) => {
            let tail = snapshot_ref(tail);
            let current = materialize_at(&update.entity_id, log, log.len() - 1)?;
            let mut changes = diff(&current, &update.state);
            if changes.is_empty() {
                return Ok(None);
            }
            let created_at = now.max(tail.created_at);
            if keyframe {
                (SnapshotPayload::Keyframe(update.state), created_at)
            } else {
                for change in changes.values_mut() {
                    change.change_reason = update.change_reason.clone();
                }
                (SnapshotPayload::Delta(changes), created_at)
            }
        }
    };

    Ok(Some(StateSnapshot {
        id: uuid::Uuid::now_v7().to_string(),
        entity_id: update.entity_id,
        entity_type: update.entity_type,
        created_at,
        change_type: update.change_type,
        payload,
        change_summary: update.change_summary,
        ai_confidence: update.ai_confidence,
        chapter_order: update.chapter_order,
        source_text: update.source_text,
    }))
}
