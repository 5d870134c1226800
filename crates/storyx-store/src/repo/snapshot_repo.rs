//! Snapshot log persistence
//!
//! Rows of `state_snapshots` form one append-only sequence per
//! `(project_id, entity_id)`, ordered by `(created_at, seq)`. A backfill or a
//! checkpoint row gets the highest `seq`, so it lands after every row sharing
//! its timestamp, which is the position the core placement rules compute.
//!
//! Appends read the entity's log, place the snapshot with the core rules and
//! insert it, all inside one IMMEDIATE transaction.

#![allow(clippy::result_large_err)]

use crate::db::begin_immediate;
use crate::errors::{corrupt_row, from_rusqlite, serialization_error, Result};
use crate::repo::codec::{parse_time, sql_time};
use rusqlite::{Connection, OptionalExtension};
use std::sync::Arc;
use storyx_core::errors::{ExError, ExErrorKind, StoryXError};
use storyx_core::model::{EntityState, EntityType, SnapshotPayload, StateSnapshot};
use storyx_core::rules::validation::validate_snapshot;
use storyx_core::snapshot::log::{
    check_resubmission, placement, plan_checkpoint, Appended, CompactionPolicy,
};
use storyx_core::snapshot::producer::{produce_snapshot, StateUpdate};
use storyx_core::snapshot::reconstruct::{materialize_at, position_of};
use storyx_core::store::compare_in_log;
use storyx_core::ChangeSet;

const TABLE: &str = "state_snapshots";

const COLUMNS: &str = "id, project_id, entity_id, entity_type, created_at, change_type, \
                       payload, change_summary, ai_confidence, chapter_order, source_text";

/// A raw row from the `state_snapshots` table
#[derive(Debug, Clone)]
pub struct SnapshotRow {
    pub id: String,
    pub project_id: String,
    pub entity_id: String,
    pub entity_type: String,
    pub created_at: String,
    pub change_type: String,
    /// JSON of the [`SnapshotPayload`]
    pub payload: String,
    pub change_summary: Option<String>,
    pub ai_confidence: Option<f64>,
    pub chapter_order: Option<i64>,
    pub source_text: Option<String>,
}

impl SnapshotRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            project_id: row.get(1)?,
            entity_id: row.get(2)?,
            entity_type: row.get(3)?,
            created_at: row.get(4)?,
            change_type: row.get(5)?,
            payload: row.get(6)?,
            change_summary: row.get(7)?,
            ai_confidence: row.get(8)?,
            chapter_order: row.get(9)?,
            source_text: row.get(10)?,
        })
    }

    /// Decode into the domain snapshot
    pub fn into_snapshot(self) -> Result<StateSnapshot> {
        let created_at =
            parse_time(&self.created_at).map_err(|e| corrupt_row(TABLE, &self.id, e))?;
        let change_type = self
            .change_type
            .parse()
            .map_err(|e: String| corrupt_row(TABLE, &self.id, e))?;
        let payload: SnapshotPayload =
            serde_json::from_str(&self.payload).map_err(|e| corrupt_row(TABLE, &self.id, e))?;

        Ok(StateSnapshot {
            id: self.id,
            entity_id: self.entity_id,
            entity_type: EntityType::from(self.entity_type),
            created_at,
            change_type,
            payload,
            change_summary: self.change_summary,
            ai_confidence: self.ai_confidence,
            chapter_order: self.chapter_order,
            source_text: self.source_text,
        })
    }
}

/// SQLite repository for the snapshot log
pub struct SnapshotRepo;

impl SnapshotRepo {
    /// Append a snapshot produced elsewhere.
    ///
    /// Re-submitting a stored id with identical content is accepted and
    /// reported as a duplicate.
    ///
    /// # Errors
    ///
    /// `ERR_OUT_OF_ORDER`, `ERR_MISSING_KEYFRAME`, `ERR_ID_CONFLICT`,
    /// `ERR_INVALID_INPUT`, or `ERR_PERSISTENCE` on SQLite failure.
    pub fn append(
        conn: &mut Connection,
        project_id: &str,
        snapshot: StateSnapshot,
        backfill: bool,
    ) -> Result<Appended> {
        validate_snapshot(&snapshot)?;
        let tx = begin_immediate(conn)?;

        if let Some(row) = fetch_row(&tx, &snapshot.id)? {
            let stored_project = row.project_id.clone();
            let stored = row.into_snapshot()?;
            if stored_project != project_id {
                return Err(StoryXError::SnapshotIdConflict {
                    snapshot_id: snapshot.id,
                }
                .into());
            }
            check_resubmission(&stored, &snapshot)?;
            let log = load_log(&tx, project_id, &stored.entity_id)?;
            let position = position_of(&log, &stored.id).unwrap_or(log.len());
            return Ok(Appended {
                snapshot: Arc::new(stored),
                position,
                duplicate: true,
            });
        }

        let log = load_log(&tx, project_id, &snapshot.entity_id)?;
        let position = placement(&log, &snapshot, backfill)?;
        insert_row(&tx, project_id, &snapshot)?;
        tx.commit().map_err(from_rusqlite)?;

        tracing::debug!(
            project_id,
            entity_id = %snapshot.entity_id,
            snapshot_id = %snapshot.id,
            position,
            backfill,
            "persisted snapshot"
        );

        Ok(Appended {
            snapshot: Arc::new(snapshot),
            position,
            duplicate: false,
        })
    }

    /// Diff a new full state against the stored tail and append a delta or
    /// a keyframe per `policy`. `None` when the state is unchanged.
    ///
    /// # Errors
    ///
    /// Same as [`Self::append`].
    pub fn record(
        conn: &mut Connection,
        project_id: &str,
        update: StateUpdate,
        policy: &CompactionPolicy,
    ) -> Result<Option<Appended>> {
        let tx = begin_immediate(conn)?;
        let log = load_log(&tx, project_id, &update.entity_id)?;

        let Some(snapshot) = produce_snapshot(&log, update, policy, chrono::Utc::now())? else {
            return Ok(None);
        };
        validate_snapshot(&snapshot)?;
        let position = placement(&log, &snapshot, false)?;
        insert_row(&tx, project_id, &snapshot)?;
        tx.commit().map_err(from_rusqlite)?;

        tracing::debug!(
            project_id,
            entity_id = %snapshot.entity_id,
            snapshot_id = %snapshot.id,
            keyframe = snapshot.is_keyframe(),
            "recorded state"
        );

        Ok(Some(Appended {
            snapshot: Arc::new(snapshot),
            position,
            duplicate: false,
        }))
    }

    /// Insert an additive keyframe after `snapshot_id` and any rows sharing
    /// its timestamp.
    ///
    /// # Errors
    ///
    /// `ERR_NOT_FOUND` if the id is not in the entity's log.
    pub fn checkpoint_after(
        conn: &mut Connection,
        project_id: &str,
        entity_id: &str,
        snapshot_id: &str,
    ) -> Result<Appended> {
        let tx = begin_immediate(conn)?;
        let log = load_log(&tx, project_id, entity_id)?;
        let (position, keyframe) = plan_checkpoint(entity_id, &log, snapshot_id)?;
        insert_row(&tx, project_id, &keyframe)?;
        tx.commit().map_err(from_rusqlite)?;

        tracing::debug!(
            project_id,
            entity_id,
            after = snapshot_id,
            position,
            "persisted checkpoint keyframe"
        );

        Ok(Appended {
            snapshot: Arc::new(keyframe),
            position,
            duplicate: false,
        })
    }

    /// The entity's log in ascending order
    pub fn list_by_entity(
        conn: &Connection,
        project_id: &str,
        entity_id: &str,
    ) -> Result<Vec<StateSnapshot>> {
        load_log(conn, project_id, entity_id)
    }

    /// # Errors
    ///
    /// `ERR_NOT_FOUND` if no snapshot of the project has this id.
    pub fn get(conn: &Connection, project_id: &str, snapshot_id: &str) -> Result<StateSnapshot> {
        fetch_row(conn, snapshot_id)?
            .filter(|row| row.project_id == project_id)
            .ok_or_else(|| {
                ExError::new(ExErrorKind::NotFound)
                    .with_op("get_snapshot")
                    .with_snapshot_id(snapshot_id)
                    .with_message("Snapshot not found")
            })?
            .into_snapshot()
    }

    /// Materialize the entity's state at `snapshot_id`.
    ///
    /// # Errors
    ///
    /// `ERR_NOT_FOUND` if the id is not in the entity's log.
    pub fn materialize(
        conn: &Connection,
        project_id: &str,
        entity_id: &str,
        snapshot_id: &str,
    ) -> Result<EntityState> {
        let log = load_log(conn, project_id, entity_id)?;
        let index =
            position_of(&log, snapshot_id).ok_or_else(|| StoryXError::SnapshotNotFound {
                entity_id: entity_id.to_string(),
                snapshot_id: snapshot_id.to_string(),
            })?;
        Ok(materialize_at(entity_id, &log, index)?)
    }

    /// Field-level comparison of two snapshots of one entity.
    ///
    /// # Errors
    ///
    /// `ERR_NOT_FOUND` for an unknown id, `ERR_INVALID_INPUT` if the
    /// snapshots belong to different entities.
    pub fn compare(
        conn: &Connection,
        project_id: &str,
        from_id: &str,
        to_id: &str,
    ) -> Result<ChangeSet> {
        let from = Self::get(conn, project_id, from_id)?;
        let to = Self::get(conn, project_id, to_id)?;
        if from.entity_id != to.entity_id {
            return Err(StoryXError::EntityMismatch {
                from_id: from_id.to_string(),
                to_id: to_id.to_string(),
            }
            .into());
        }
        let log = load_log(conn, project_id, &from.entity_id)?;
        Ok(compare_in_log(&from.entity_id, &log, from_id, to_id)?)
    }

    /// Entity ids with at least one snapshot, sorted
    pub fn entity_ids(conn: &Connection, project_id: &str) -> Result<Vec<String>> {
        let mut stmt = conn
            .prepare(
                "SELECT DISTINCT entity_id FROM state_snapshots
                 WHERE project_id = ?1 ORDER BY entity_id",
            )
            .map_err(from_rusqlite)?;
        let ids = stmt
            .query_map([project_id], |row| row.get(0))
            .map_err(from_rusqlite)?
            .collect::<std::result::Result<Vec<String>, _>>()
            .map_err(from_rusqlite)?;
        Ok(ids)
    }

    /// Remove the entity's log. Returns the number of rows removed.
    pub fn delete_entity(conn: &Connection, project_id: &str, entity_id: &str) -> Result<usize> {
        conn.execute(
            "DELETE FROM state_snapshots WHERE project_id = ?1 AND entity_id = ?2",
            [project_id, entity_id],
        )
        .map_err(from_rusqlite)
    }

    /// Remove every log of the project. Returns the number of rows removed.
    pub fn delete_project(conn: &Connection, project_id: &str) -> Result<usize> {
        conn.execute(
            "DELETE FROM state_snapshots WHERE project_id = ?1",
            [project_id],
        )
        .map_err(from_rusqlite)
    }
}

fn fetch_row(conn: &Connection, snapshot_id: &str) -> Result<Option<SnapshotRow>> {
    conn.query_row(
        &format!("SELECT {} FROM state_snapshots WHERE id = ?1", COLUMNS),
        [snapshot_id],
        SnapshotRow::from_row,
    )
    .optional()
    .map_err(from_rusqlite)
}

fn load_log(conn: &Connection, project_id: &str, entity_id: &str) -> Result<Vec<StateSnapshot>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {} FROM state_snapshots
             WHERE project_id = ?1 AND entity_id = ?2
             ORDER BY created_at, seq",
            COLUMNS
        ))
        .map_err(from_rusqlite)?;
    let rows = stmt
        .query_map([project_id, entity_id], SnapshotRow::from_row)
        .map_err(from_rusqlite)?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(from_rusqlite)?;
    rows.into_iter().map(SnapshotRow::into_snapshot).collect()
}

fn insert_row(conn: &Connection, project_id: &str, snapshot: &StateSnapshot) -> Result<()> {
    let payload = serde_json::to_string(&snapshot.payload)
        .map_err(|e| serialization_error("insert_snapshot", e))?;
    conn.execute(
        "INSERT INTO state_snapshots (
            id, project_id, entity_id, entity_type, created_at, change_type,
            is_keyframe, payload, change_summary, ai_confidence, chapter_order, source_text
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        rusqlite::params![
            snapshot.id,
            project_id,
            snapshot.entity_id,
            snapshot.entity_type.as_str(),
            sql_time(&snapshot.created_at),
            snapshot.change_type.as_str(),
            snapshot.is_keyframe(),
            payload,
            snapshot.change_summary,
            snapshot.ai_confidence,
            snapshot.chapter_order,
            snapshot.source_text,
        ],
    )
    .map_err(from_rusqlite)?;
    Ok(())
}
