//! Append-only snapshot log
//!
//! Each entity owns one ordered sequence of snapshots. Order is
//! `(created_at, insertion sequence)`: a snapshot with the same timestamp as
//! existing ones lands after them. History is never rewritten; compaction only
//! adds keyframes.
//!
//! ## Concurrency
//!
//! Appends for one entity are serialized by that entity's mutex. The entity
//! map is behind a `RwLock` that is only held long enough to fetch or create
//! an entity's log, so different entities proceed in parallel. Readers copy
//! the entity's `Arc<StateSnapshot>` vector under the mutex and replay without
//! holding it (snapshot isolation): a concurrent checkpoint is either fully
//! visible to a reader or not at all.

use crate::errors::{Result, StoryXError};
use crate::model::{ChangeType, EntityState, StateSnapshot};
use crate::rules::validation::validate_snapshot;
use crate::snapshot::producer::{produce_snapshot, StateUpdate};
use crate::snapshot::reconstruct::{materialize_at, position_of, snapshot_ref};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Summary recorded on keyframes inserted by [`SnapshotLog::checkpoint_after`]
pub const CHECKPOINT_SUMMARY: &str = "checkpoint";

/// Keyframes per delta run when no configuration overrides it
pub const DEFAULT_KEYFRAME_INTERVAL: usize = 10;

/// Decides whether a produced snapshot is stored as a keyframe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompactionPolicy {
    /// Every n-th snapshot since the last keyframe is a keyframe; 0 disables
    pub keyframe_interval: usize,
    /// Store MAJOR_CHANGE snapshots as keyframes
    pub keyframe_on_major_change: bool,
}

impl Default for CompactionPolicy {
    fn default() -> Self {
        Self {
            keyframe_interval: DEFAULT_KEYFRAME_INTERVAL,
            keyframe_on_major_change: false,
        }
    }
}

impl CompactionPolicy {
    /// Number of deltas after the last keyframe of `log`
    pub fn deltas_since_keyframe<S: Borrow<StateSnapshot>>(log: &[S]) -> usize {
        log.iter()
            .rev()
            .take_while(|s| !snapshot_ref(*s).is_keyframe())
            .count()
    }

    /// Whether the next snapshot appended to `log` should be a keyframe
    pub fn wants_keyframe<S: Borrow<StateSnapshot>>(
        &self,
        log: &[S],
        change_type: ChangeType,
    ) -> bool {
        if log.is_empty() {
            return true;
        }
        if self.keyframe_on_major_change && change_type == ChangeType::MajorChange {
            return true;
        }
        self.keyframe_interval > 0
            && Self::deltas_since_keyframe(log) + 1 >= self.keyframe_interval
    }
}

/// Where `snapshot` belongs in an entity's ordered log.
///
/// # Errors
///
/// - `OutOfOrder` if the snapshot precedes the tail and `backfill` is unset
/// - `MissingBaseKeyframe` if it would open the log and is not a keyframe
pub fn placement<S: Borrow<StateSnapshot>>(
    log: &[S],
    snapshot: &StateSnapshot,
    backfill: bool,
) -> Result<usize> {
    let position = match log.last().map(snapshot_ref) {
        Some(tail) if snapshot.created_at < tail.created_at => {
            if !backfill {
                return Err(StoryXError::OutOfOrder {
                    entity_id: snapshot.entity_id.clone(),
                    snapshot_id: snapshot.id.clone(),
                    created_at: snapshot.created_at.to_rfc3339(),
                    tail_created_at: tail.created_at.to_rfc3339(),
                });
            }
            log.partition_point(|s| snapshot_ref(s).created_at <= snapshot.created_at)
        }
        _ => log.len(),
    };

    if position == 0 && !snapshot.is_keyframe() {
        return Err(StoryXError::MissingBaseKeyframe {
            entity_id: snapshot.entity_id.clone(),
            snapshot_id: snapshot.id.clone(),
        });
    }

    Ok(position)
}

/// Accept a re-submitted id only if the content is identical.
///
/// # Errors
///
/// `SnapshotIdConflict` if `stored` and `incoming` differ.
pub fn check_resubmission(stored: &StateSnapshot, incoming: &StateSnapshot) -> Result<()> {
    if stored == incoming {
        Ok(())
    } else {
        Err(StoryXError::SnapshotIdConflict {
            snapshot_id: incoming.id.clone(),
        })
    }
}

/// Build the keyframe that [`SnapshotLog::checkpoint_after`] inserts.
///
/// The keyframe shares the target's timestamp and goes after the run of
/// snapshots with that timestamp; its content is the state at the end of
/// that run. Returns the insert position and the keyframe.
///
/// # Errors
///
/// `SnapshotNotFound` if `snapshot_id` is not in `log`.
pub fn plan_checkpoint<S: Borrow<StateSnapshot>>(
    entity_id: &str,
    log: &[S],
    snapshot_id: &str,
) -> Result<(usize, StateSnapshot)> {
    let target_idx = position_of(log, snapshot_id).ok_or_else(|| StoryXError::SnapshotNotFound {
        entity_id: entity_id.to_string(),
        snapshot_id: snapshot_id.to_string(),
    })?;
    let target = snapshot_ref(&log[target_idx]);
    let run_end = target_idx
        + log[target_idx + 1..]
            .iter()
            .take_while(|s| snapshot_ref(*s).created_at == target.created_at)
            .count();

    let state = materialize_at(entity_id, log, run_end)?;
    let keyframe = StateSnapshot::keyframe(
        entity_id,
        target.entity_type.clone(),
        ChangeType::Update,
        state,
    )
    .at(target.created_at)
    .with_summary(CHECKPOINT_SUMMARY);

    Ok((run_end + 1, keyframe))
}

/// Outcome of an append
#[derive(Debug, Clone)]
pub struct Appended {
    pub snapshot: Arc<StateSnapshot>,
    /// Index in the entity's log
    pub position: usize,
    /// The id was already stored with identical content
    pub duplicate: bool,
}

#[derive(Debug, Default)]
struct EntityLog {
    entries: Vec<Arc<StateSnapshot>>,
    /// Set once the entity is deleted; appends holding a stale handle retry
    retired: bool,
}

type EntityHandle = Arc<Mutex<EntityLog>>;

/// In-memory snapshot log for all entities of one project
#[derive(Debug, Default)]
pub struct SnapshotLog {
    entities: RwLock<HashMap<String, EntityHandle>>,
    by_id: RwLock<HashMap<String, Arc<StateSnapshot>>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

fn read<T>(l: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    l.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(l: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    l.write().unwrap_or_else(PoisonError::into_inner)
}

impl SnapshotLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn existing(&self, entity_id: &str) -> Option<EntityHandle> {
        read(&self.entities).get(entity_id).cloned()
    }

    fn handle(&self, entity_id: &str) -> EntityHandle {
        if let Some(h) = self.existing(entity_id) {
            return h;
        }
        write(&self.entities)
            .entry(entity_id.to_string())
            .or_default()
            .clone()
    }

    /// Run `f` with the entity's log locked, retrying if the entity was
    /// deleted between fetching and locking its handle
    fn with_entity<T>(&self, entity_id: &str, mut f: impl FnMut(&mut EntityLog) -> T) -> T {
        loop {
            let handle = self.handle(entity_id);
            let mut log = lock(&handle);
            if !log.retired {
                return f(&mut *log);
            }
        }
    }

    /// Insert a validated snapshot at its placement, deduplicating by id
    fn insert_locked(
        &self,
        log: &mut EntityLog,
        snapshot: StateSnapshot,
        backfill: bool,
    ) -> Result<Appended> {
        if let Some(stored) = read(&self.by_id).get(&snapshot.id).cloned() {
            return self.resubmitted(log, stored, &snapshot);
        }

        let position = placement(&log.entries, &snapshot, backfill)?;
        let snapshot = Arc::new(snapshot);
        {
            let mut by_id = write(&self.by_id);
            if let Some(stored) = by_id.get(&snapshot.id).cloned() {
                drop(by_id);
                return self.resubmitted(log, stored, &snapshot);
            }
            by_id.insert(snapshot.id.clone(), snapshot.clone());
        }
        log.entries.insert(position, snapshot.clone());

        tracing::debug!(
            entity_id = %snapshot.entity_id,
            snapshot_id = %snapshot.id,
            position,
            keyframe = snapshot.is_keyframe(),
            log_len = log.entries.len(),
            "appended snapshot"
        );

        Ok(Appended {
            snapshot,
            position,
            duplicate: false,
        })
    }

    fn resubmitted(
        &self,
        log: &EntityLog,
        stored: Arc<StateSnapshot>,
        incoming: &StateSnapshot,
    ) -> Result<Appended> {
        check_resubmission(&stored, incoming)?;
        let position = position_of(&log.entries, &stored.id).unwrap_or(0);
        tracing::debug!(snapshot_id = %stored.id, "duplicate append ignored");
        Ok(Appended {
            snapshot: stored,
            position,
            duplicate: true,
        })
    }

    /// Append a snapshot to its entity's log.
    ///
    /// With `backfill` set, a snapshot older than the tail is placed by its
    /// timestamp instead of being rejected.
    ///
    /// # Errors
    ///
    /// - `InvalidDelta` / `InvalidConfidence` for malformed snapshots
    /// - `OutOfOrder` if it precedes the tail without `backfill`
    /// - `MissingBaseKeyframe` if it would open the log as a delta
    /// - `SnapshotIdConflict` if the id is stored with different content
    pub fn append(&self, snapshot: StateSnapshot, backfill: bool) -> Result<Appended> {
        validate_snapshot(&snapshot)?;
        let entity_id = snapshot.entity_id.clone();
        let mut pending = Some(snapshot);
        self.with_entity(&entity_id, |log| match pending.take() {
            Some(s) => self.insert_locked(log, s, backfill),
            None => Err(StoryXError::Internal {
                message: "append retried without a snapshot".to_string(),
            }),
        })
    }

    /// Diff a new full state against the tail and append the result as a
    /// delta, or as a keyframe when `policy` asks for one. Returns `None`
    /// when the state is unchanged.
    ///
    /// # Errors
    ///
    /// Same as [`Self::append`].
    pub fn record(
        &self,
        update: StateUpdate,
        policy: &CompactionPolicy,
    ) -> Result<Option<Appended>> {
        let entity_id = update.entity_id.clone();
        let mut pending = Some(update);
        self.with_entity(&entity_id, |log| {
            let Some(update) = pending.take() else {
                return Err(StoryXError::Internal {
                    message: "record retried without an update".to_string(),
                });
            };
            match produce_snapshot(&log.entries, update, policy, Utc::now())? {
                Some(snapshot) => {
                    validate_snapshot(&snapshot)?;
                    self.insert_locked(log, snapshot, false).map(Some)
                }
                None => Ok(None),
            }
        })
    }

    /// Insert an additive keyframe holding the materialized state right
    /// after `snapshot_id` and any snapshots sharing its timestamp.
    ///
    /// # Errors
    ///
    /// `SnapshotNotFound` if the id is not in the entity's log.
    pub fn checkpoint_after(&self, entity_id: &str, snapshot_id: &str) -> Result<Appended> {
        let handle = self
            .existing(entity_id)
            .ok_or_else(|| StoryXError::SnapshotNotFound {
                entity_id: entity_id.to_string(),
                snapshot_id: snapshot_id.to_string(),
            })?;
        let mut log = lock(&handle);
        if log.retired {
            return Err(StoryXError::SnapshotNotFound {
                entity_id: entity_id.to_string(),
                snapshot_id: snapshot_id.to_string(),
            });
        }
        let (position, keyframe) = plan_checkpoint(entity_id, &log.entries, snapshot_id)?;
        let keyframe = Arc::new(keyframe);
        write(&self.by_id).insert(keyframe.id.clone(), keyframe.clone());
        log.entries.insert(position, keyframe.clone());

        tracing::debug!(
            entity_id = entity_id,
            after = snapshot_id,
            position,
            "inserted checkpoint keyframe"
        );

        Ok(Appended {
            snapshot: keyframe,
            position,
            duplicate: false,
        })
    }

    /// The entity's log in ascending order. The returned vector is a copy;
    /// later appends do not affect it.
    pub fn list_by_entity(&self, entity_id: &str) -> Vec<Arc<StateSnapshot>> {
        self.existing(entity_id)
            .map(|h| lock(&h).entries.clone())
            .unwrap_or_default()
    }

    pub fn get(&self, snapshot_id: &str) -> Option<Arc<StateSnapshot>> {
        read(&self.by_id).get(snapshot_id).cloned()
    }

    /// Materialize the entity's state at `snapshot_id`.
    ///
    /// # Errors
    ///
    /// `SnapshotNotFound` if the id is not in the entity's log.
    pub fn materialize(&self, entity_id: &str, snapshot_id: &str) -> Result<EntityState> {
        let entries = self.list_by_entity(entity_id);
        let index = position_of(&entries, snapshot_id).ok_or_else(|| {
            StoryXError::SnapshotNotFound {
                entity_id: entity_id.to_string(),
                snapshot_id: snapshot_id.to_string(),
            }
        })?;
        materialize_at(entity_id, &entries, index)
    }

    /// Entity ids with at least one snapshot, sorted
    pub fn entity_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = read(&self.entities)
            .iter()
            .filter(|(_, h)| !lock(h).entries.is_empty())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Remove the entity's whole log. Returns the number of snapshots removed.
    pub fn delete_entity(&self, entity_id: &str) -> usize {
        let Some(handle) = write(&self.entities).remove(entity_id) else {
            return 0;
        };
        let mut log = lock(&handle);
        log.retired = true;
        let removed = std::mem::take(&mut log.entries);
        let mut by_id = write(&self.by_id);
        for snapshot in &removed {
            by_id.remove(&snapshot.id);
        }
        removed.len()
    }

    /// Remove every entity's log. Returns the number of snapshots removed.
    pub fn clear(&self) -> usize {
        let ids: Vec<String> = read(&self.entities).keys().cloned().collect();
        ids.iter().map(|id| self.delete_entity(id)).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::model::FieldChange;
    use crate::model::{EntityType, SnapshotPayload};
    use chrono::{Duration, TimeZone};
    use serde_json::json;

    fn t(secs: i64) -> chrono::DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn keyframe(at: i64, value: serde_json::Value) -> StateSnapshot {
        StateSnapshot::keyframe(
            "e1",
            EntityType::Character,
            ChangeType::Initial,
            EntityState::from_json(&value),
        )
        .at(t(at))
    }

    fn delta(at: i64, path: &str, old: Option<&str>, new: Option<&str>) -> StateSnapshot {
        StateSnapshot::delta(
            "e1",
            EntityType::Character,
            ChangeType::Update,
            vec![FieldChange::new(path, old.map(|v| json!(v)), new.map(|v| json!(v)))],
        )
        .at(t(at))
    }

    #[test]
    fn test_first_snapshot_must_be_keyframe() {
        let log = SnapshotLog::new();
        let err = log.append(delta(0, "name", None, Some("Alice")), false).unwrap_err();
        assert!(matches!(err, StoryXError::MissingBaseKeyframe { .. }));
        assert!(log.list_by_entity("e1").is_empty());
    }

    #[test]
    fn test_out_of_order_rejected_without_backfill() {
        let log = SnapshotLog::new();
        log.append(keyframe(10, json!({"name": "Alice"})), false).unwrap();
        let err = log
            .append(delta(5, "name", Some("Alice"), Some("Al")), false)
            .unwrap_err();
        assert!(matches!(err, StoryXError::OutOfOrder { .. }));
    }

    #[test]
    fn test_backfill_is_placed_by_timestamp() {
        let log = SnapshotLog::new();
        log.append(keyframe(0, json!({"name": "Alice"})), false).unwrap();
        let late = log.append(delta(20, "age", None, Some("30")), false).unwrap();
        let early = log
            .append(delta(10, "home", None, Some("Paris")), true)
            .unwrap();
        assert_eq!(early.position, 1);
        let ids: Vec<String> = log.list_by_entity("e1").iter().map(|s| s.id.clone()).collect();
        assert_eq!(ids[1], early.snapshot.id);
        assert_eq!(ids[2], late.snapshot.id);
    }

    #[test]
    fn test_backfill_before_base_requires_keyframe() {
        let log = SnapshotLog::new();
        log.append(keyframe(10, json!({"name": "Alice"})), false).unwrap();
        let err = log
            .append(delta(0, "name", None, Some("Al")), true)
            .unwrap_err();
        assert!(matches!(err, StoryXError::MissingBaseKeyframe { .. }));
    }

    #[test]
    fn test_equal_timestamps_keep_insertion_order() {
        let log = SnapshotLog::new();
        let a = log.append(keyframe(0, json!({"name": "Alice"})), false).unwrap();
        let b = log.append(delta(0, "age", None, Some("30")), false).unwrap();
        assert_eq!((a.position, b.position), (0, 1));
    }

    #[test]
    fn test_duplicate_id_is_idempotent() {
        let log = SnapshotLog::new();
        let k = keyframe(0, json!({"name": "Alice"}));
        log.append(k.clone(), false).unwrap();
        let again = log.append(k, false).unwrap();
        assert!(again.duplicate);
        assert_eq!(log.list_by_entity("e1").len(), 1);
    }

    #[test]
    fn test_duplicate_id_with_other_content_conflicts() {
        let log = SnapshotLog::new();
        let k = keyframe(0, json!({"name": "Alice"}));
        log.append(k.clone(), false).unwrap();
        let mut changed = k;
        changed.change_summary = Some("edited".into());
        assert!(matches!(
            log.append(changed, false),
            Err(StoryXError::SnapshotIdConflict { .. })
        ));
    }

    #[test]
    fn test_checkpoint_goes_after_timestamp_run() {
        let log = SnapshotLog::new();
        let k = log.append(keyframe(0, json!({"name": "Alice"})), false).unwrap();
        let d1 = log.append(delta(5, "name", Some("Alice"), Some("Al")), false).unwrap();
        log.append(delta(5, "age", None, Some("30")), false).unwrap();
        log.append(delta(9, "home", None, Some("Paris")), false).unwrap();

        let cp = log.checkpoint_after("e1", &d1.snapshot.id).unwrap();
        assert_eq!(cp.position, 3);
        assert!(cp.snapshot.is_keyframe());
        assert_eq!(cp.snapshot.created_at, t(5));

        let entries = log.list_by_entity("e1");
        let at_cp = materialize_at("e1", &entries, 3).unwrap();
        assert_eq!(at_cp.to_json(), json!({"name": "Al", "age": "30"}));
        let tail = log.materialize("e1", &entries[4].id).unwrap();
        assert_eq!(tail.to_json(), json!({"name": "Al", "age": "30", "home": "Paris"}));
        assert!(log.materialize("e1", &k.snapshot.id).is_ok());
    }

    #[test]
    fn test_checkpoint_unknown_snapshot() {
        let log = SnapshotLog::new();
        log.append(keyframe(0, json!({"name": "Alice"})), false).unwrap();
        assert!(matches!(
            log.checkpoint_after("e1", "missing"),
            Err(StoryXError::SnapshotNotFound { .. })
        ));
    }

    #[test]
    fn test_list_is_a_stable_copy() {
        let log = SnapshotLog::new();
        log.append(keyframe(0, json!({"name": "Alice"})), false).unwrap();
        let before = log.list_by_entity("e1");
        log.append(delta(1, "age", None, Some("30")), false).unwrap();
        assert_eq!(before.len(), 1);
        assert_eq!(log.list_by_entity("e1").len(), 2);
    }

    #[test]
    fn test_delete_entity_removes_ids() {
        let log = SnapshotLog::new();
        let k = log.append(keyframe(0, json!({"name": "Alice"})), false).unwrap();
        assert_eq!(log.delete_entity("e1"), 1);
        assert!(log.get(&k.snapshot.id).is_none());
        assert!(log.entity_ids().is_empty());
        // The entity can start over
        log.append(keyframe(0, json!({"name": "Bob"})), false).unwrap();
        assert_eq!(log.list_by_entity("e1").len(), 1);
    }

    #[test]
    fn test_record_follows_policy() {
        let log = SnapshotLog::new();
        let policy = CompactionPolicy {
            keyframe_interval: 3,
            keyframe_on_major_change: false,
        };
        let mut kinds = Vec::new();
        for i in 0..7 {
            let update = StateUpdate::new(
                "e1",
                EntityType::Character,
                ChangeType::Update,
                EntityState::from_json(&json!({"name": "Alice", "chapter": i})),
            );
            let appended = log.record(update, &policy).unwrap().unwrap();
            kinds.push(appended.snapshot.is_keyframe());
        }
        assert_eq!(kinds, vec![true, false, false, true, false, false, true]);
    }

    #[test]
    fn test_record_skips_unchanged_state() {
        let log = SnapshotLog::new();
        let policy = CompactionPolicy::default();
        let state = EntityState::from_json(&json!({"name": "Alice"}));
        let update = StateUpdate::new("e1", EntityType::Character, ChangeType::Initial, state);
        assert!(log.record(update.clone(), &policy).unwrap().is_some());
        assert!(log.record(update, &policy).unwrap().is_none());
    }

    #[test]
    fn test_record_of_deserialized_update_with_nulls() {
        let log = SnapshotLog::new();
        let policy = CompactionPolicy::default();
        let base = StateUpdate::new(
            "e1",
            EntityType::Character,
            ChangeType::Initial,
            EntityState::from_json(&json!({"name": "Alice"})),
        );
        log.record(base, &policy).unwrap();

        let same: StateUpdate = serde_json::from_value(json!({
            "entityId": "e1",
            "entityType": "CHARACTER",
            "changeType": "UPDATE",
            "state": {"name": "Alice", "alias": null}
        }))
        .unwrap();
        assert!(log.record(same, &policy).unwrap().is_none());

        let nested: StateUpdate = serde_json::from_value(json!({
            "entityId": "e1",
            "entityType": "CHARACTER",
            "changeType": "UPDATE",
            "state": {"name": null, "traits": {"temper": "calm"}}
        }))
        .unwrap();
        let appended = log.record(nested, &policy).unwrap().unwrap();
        let SnapshotPayload::Delta(changes) = &appended.snapshot.payload else {
            panic!("expected a delta");
        };
        let paths: Vec<&String> = changes.keys().collect();
        assert_eq!(paths, vec!["name", "traits.temper"]);
        assert_eq!(
            log.materialize("e1", &appended.snapshot.id).unwrap(),
            EntityState::from_json(&json!({"traits": {"temper": "calm"}}))
        );
    }

    #[test]
    fn test_record_after_future_tail_does_not_go_backwards() {
        let log = SnapshotLog::new();
        let future = Utc::now() + Duration::hours(1);
        log.append(
            StateSnapshot::keyframe(
                "e1",
                EntityType::Character,
                ChangeType::Initial,
                EntityState::from_json(&json!({"name": "Alice"})),
            )
            .at(future),
            false,
        )
        .unwrap();
        let update = StateUpdate::new(
            "e1",
            EntityType::Character,
            ChangeType::Update,
            EntityState::from_json(&json!({"name": "Alicia"})),
        );
        let appended = log
            .record(update, &CompactionPolicy::default())
            .unwrap()
            .unwrap();
        assert!(appended.snapshot.created_at >= future);
    }

    #[test]
    fn test_major_change_policy() {
        let log: Vec<StateSnapshot> = vec![keyframe(0, json!({"name": "Alice"}))];
        let off = CompactionPolicy::default();
        let on = CompactionPolicy {
            keyframe_on_major_change: true,
            ..CompactionPolicy::default()
        };
        assert!(!off.wants_keyframe(&log, ChangeType::MajorChange));
        assert!(on.wants_keyframe(&log, ChangeType::MajorChange));
        assert!(!on.wants_keyframe(&log, ChangeType::Update));
    }
}
