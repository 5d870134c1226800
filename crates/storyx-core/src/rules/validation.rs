//! Snapshot and warning validation
//!
//! Checks that depend only on the record itself. Ordering and keyframe
//! placement are checked by the log, which knows the tail.

use crate::errors::{Result, StoryXError};
use crate::model::{ConsistencyWarning, SnapshotPayload, StateSnapshot, WarningStatus};

/// Validate a snapshot before it is appended to any log.
///
/// # Errors
///
/// - `InvalidDelta` if a delta key disagrees with its change's field path, a
///   path is empty, or a change carries neither an old nor a new value
/// - `InvalidConfidence` if `ai_confidence` is outside `0..=1` or not finite
pub fn validate_snapshot(snapshot: &StateSnapshot) -> Result<()> {
    if let Some(value) = snapshot.ai_confidence {
        if !(0.0..=1.0).contains(&value) {
            return Err(StoryXError::InvalidConfidence {
                snapshot_id: snapshot.id.clone(),
                value,
            });
        }
    }

    if let SnapshotPayload::Delta(changes) = &snapshot.payload {
        for (key, change) in changes {
            if key.is_empty() {
                return Err(invalid_delta(snapshot, "empty field path".to_string()));
            }
            if key != &change.field_path {
                return Err(invalid_delta(
                    snapshot,
                    format!(
                        "key '{}' does not match field path '{}'",
                        key, change.field_path
                    ),
                ));
            }
            if change.kind().is_none() {
                return Err(invalid_delta(
                    snapshot,
                    format!("change to '{}' has neither old nor new value", key),
                ));
            }
        }
    }

    Ok(())
}

/// Validate a warning about to be inserted.
///
/// Warnings leave PENDING only through resolve or dismiss, so a new one
/// carries no resolution.
///
/// # Errors
///
/// `InvalidWarning` if the status is not PENDING or a resolution note or
/// resolution time is set.
pub fn validate_new_warning(warning: &ConsistencyWarning) -> Result<()> {
    let reason = if warning.status != WarningStatus::Pending {
        format!("new warnings must be PENDING, got {}", warning.status.as_str())
    } else if warning.resolution.is_some() {
        "a PENDING warning carries no resolution".to_string()
    } else if warning.resolved_at.is_some() {
        "a PENDING warning carries no resolved_at".to_string()
    } else {
        return Ok(());
    };
    Err(StoryXError::InvalidWarning {
        warning_id: warning.id.clone(),
        reason,
    })
}

fn invalid_delta(snapshot: &StateSnapshot, reason: String) -> StoryXError {
    StoryXError::InvalidDelta {
        snapshot_id: snapshot.id.clone(),
        reason,
    }
}
