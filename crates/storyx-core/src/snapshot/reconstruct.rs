//! Reconstruction by replay
//!
//! A state is materialized by starting from the nearest keyframe at or before
//! the requested snapshot and applying every following delta up to and
//! including it. Functions here work on any ordered slice of snapshots, so the
//! in-memory log and the SQLite layer share one replay implementation.

use crate::diff::model::FieldChanges;
use crate::errors::{Result, StoryXError};
use crate::model::{EntityState, SnapshotPayload, StateSnapshot};
use std::borrow::Borrow;

/// View an element of an ordered log as a snapshot
pub fn snapshot_ref<S: Borrow<StateSnapshot>>(s: &S) -> &StateSnapshot {
    Borrow::<StateSnapshot>::borrow(s)
}

/// Apply one delta to `state`: every path is set to its new value, an absent
/// new value removes the path.
pub fn apply_delta(state: &mut EntityState, changes: &FieldChanges) {
    for (path, change) in changes {
        match &change.new_value {
            Some(value) => state.set(path.clone(), value.clone()),
            None => {
                state.remove(path);
            }
        }
    }
}

/// Position of `snapshot_id` within an ordered log
pub fn position_of<S: Borrow<StateSnapshot>>(log: &[S], snapshot_id: &str) -> Option<usize> {
    log.iter().position(|s| snapshot_ref(s).id == snapshot_id)
}

/// Index of the nearest keyframe at or before `index`
pub fn base_keyframe<S: Borrow<StateSnapshot>>(log: &[S], index: usize) -> Option<usize> {
    log.get(..=index)?
        .iter()
        .rposition(|s| snapshot_ref(s).is_keyframe())
}

/// Materialize the state at position `index` of an ordered log.
///
/// # Errors
///
/// - `SnapshotNotFound` if `index` is past the end of the log
/// - `MissingBaseKeyframe` if no keyframe precedes `index`
pub fn materialize_at<S: Borrow<StateSnapshot>>(
    entity_id: &str,
    log: &[S],
    index: usize,
) -> Result<EntityState> {
    let target = log.get(index).ok_or_else(|| StoryXError::SnapshotNotFound {
        entity_id: entity_id.to_string(),
        snapshot_id: format!("#{}", index),
    })?;
    let base = base_keyframe(log, index).ok_or_else(|| StoryXError::MissingBaseKeyframe {
        entity_id: entity_id.to_string(),
        snapshot_id: snapshot_ref(target).id.clone(),
    })?;

    let mut state = EntityState::new();
    for snapshot in &log[base..=index] {
        match &snapshot_ref(snapshot).payload {
            SnapshotPayload::Keyframe(full) => state = full.clone(),
            SnapshotPayload::Delta(changes) => apply_delta(&mut state, changes),
        }
    }

    tracing::debug!(
        entity_id = entity_id,
        replay_len = index - base + 1,
        "materialized state"
    );

    Ok(state)
}

/// Materialize the state at `snapshot_id` from an entity's ordered log.
///
/// # Errors
///
/// - `SnapshotNotFound` if `snapshot_id` is not part of `log`
/// - `MissingBaseKeyframe` if the log does not start with a keyframe
pub fn materialize_from<S: Borrow<StateSnapshot>>(
    entity_id: &str,
    log: &[S],
    snapshot_id: &str,
) -> Result<EntityState> {
    let index = position_of(log, snapshot_id).ok_or_else(|| StoryXError::SnapshotNotFound {
        entity_id: entity_id.to_string(),
        snapshot_id: snapshot_id.to_string(),
    })?;
    materialize_at(entity_id, log, index)
}

/// Attach provenance to diff output.
///
/// For each changed path, the latest `change_reason` and `source_text`
/// recorded by a delta in `chain` are copied onto the change. A delta without
/// a field-level quote contributes its snapshot-level `source_text`. `chain`
/// is the ordered run of snapshots between the two compared points.
pub fn annotate<S: Borrow<StateSnapshot>>(changes: &mut FieldChanges, chain: &[S]) {
    for snapshot in chain {
        let snapshot = snapshot_ref(snapshot);
        let SnapshotPayload::Delta(delta) = &snapshot.payload else {
            continue;
        };
        for (path, recorded) in delta {
            let Some(change) = changes.get_mut(path) else {
                continue;
            };
            if let Some(reason) = &recorded.change_reason {
                change.change_reason = Some(reason.clone());
            }
            if let Some(quote) = recorded.source_text.as_ref().or(snapshot.source_text.as_ref()) {
                change.source_text = Some(quote.clone());
            }
        }
    }
}

/// Snapshots strictly after the earlier of two positions, up to and including
/// the later one
pub fn chain_between<S>(log: &[S], a: usize, b: usize) -> &[S] {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    log.get(lo + 1..=hi).unwrap_or(&[])
}
