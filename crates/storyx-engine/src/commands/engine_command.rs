//! Engine-level write commands.

#![allow(clippy::result_large_err)]

use crate::commands::boundary;
use rusqlite::Connection;
use serde::Serialize;
use std::sync::Arc;
use storyx_core::model::{ConsistencyWarning, RawFinding, StateSnapshot};
use storyx_core::snapshot::log::Appended;
use storyx_core::{CompactionPolicy, StateUpdate};
use storyx_core_types::correlation::RequestContext;
use storyx_store::db::begin_immediate;
use storyx_store::errors::from_rusqlite;
use storyx_store::{Result, SnapshotRepo, WarningRepo};

/// Commands that write to the database.
#[derive(Debug, Clone)]
pub enum EngineCommand {
    /// Append a snapshot produced elsewhere.
    AppendSnapshot {
        snapshot: StateSnapshot,
        /// Allow a timestamp earlier than the log tail
        backfill: bool,
    },
    /// Diff a full state against the tail and append a delta or keyframe.
    RecordState { update: StateUpdate },
    /// Insert an additive keyframe after a snapshot.
    CheckpointAfter {
        entity_id: String,
        snapshot_id: String,
    },
    /// Persist a fully formed warning.
    InsertWarning { warning: ConsistencyWarning },
    /// Classify and persist a detector finding.
    IngestFinding { finding: RawFinding },
    ResolveWarning {
        warning_id: String,
        note: Option<String>,
    },
    DismissWarning { warning_id: String },
    /// Remove an entity's snapshot log and its warnings.
    DeleteEntity { entity_id: String },
    /// Remove everything the project owns.
    DeleteProject,
}

/// A snapshot as stored, with its position in the entity's log
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotWrite {
    pub snapshot: StateSnapshot,
    pub position: usize,
    /// The id was already stored with identical content
    pub duplicate: bool,
}

impl From<Appended> for SnapshotWrite {
    fn from(appended: Appended) -> Self {
        Self {
            snapshot: Arc::try_unwrap(appended.snapshot).unwrap_or_else(|arc| (*arc).clone()),
            position: appended.position,
            duplicate: appended.duplicate,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeletionCounts {
    pub snapshots: usize,
    pub warnings: usize,
}

/// Result of applying an engine command.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum EngineCommandResult {
    SnapshotWritten(SnapshotWrite),
    /// The recorded state equals the current one; nothing was written
    StateUnchanged,
    Warning(ConsistencyWarning),
    Deleted(DeletionCounts),
}

/// Apply `cmd` to `project_id` with a fresh request context.
///
/// # Errors
///
/// See [`apply_engine_command_with_context`].
pub fn apply_engine_command(
    cmd: EngineCommand,
    project_id: &str,
    conn: &mut Connection,
    policy: &CompactionPolicy,
) -> Result<EngineCommandResult> {
    let ctx = RequestContext::new().for_project(project_id);
    apply_engine_command_with_context(cmd, conn, policy, &ctx)
}

/// Apply `cmd` to the project named by `ctx`.
///
/// # Errors
///
/// - `ERR_INVALID_INPUT`: the context has no project, or the snapshot is malformed
/// - `ERR_OUT_OF_ORDER` / `ERR_MISSING_KEYFRAME` / `ERR_ID_CONFLICT`: append rejected
/// - `ERR_NOT_FOUND`: unknown snapshot or warning id
/// - `ERR_ALREADY_TERMINAL`: the warning already left PENDING
/// - `ERR_ALREADY_EXISTS`: warning id taken
/// - `ERR_PERSISTENCE`: SQLite failure
pub fn apply_engine_command_with_context(
    cmd: EngineCommand,
    conn: &mut Connection,
    policy: &CompactionPolicy,
    ctx: &RequestContext,
) -> Result<EngineCommandResult> {
    match cmd {
        EngineCommand::AppendSnapshot { snapshot, backfill } => {
            boundary("append_snapshot", ctx, |project| {
                let appended = SnapshotRepo::append(conn, project, snapshot, backfill)?;
                Ok(EngineCommandResult::SnapshotWritten(appended.into()))
            })
        }

        EngineCommand::RecordState { update } => boundary("record_state", ctx, |project| {
            Ok(match SnapshotRepo::record(conn, project, update, policy)? {
                Some(appended) => EngineCommandResult::SnapshotWritten(appended.into()),
                None => EngineCommandResult::StateUnchanged,
            })
        }),

        EngineCommand::CheckpointAfter {
            entity_id,
            snapshot_id,
        } => boundary("checkpoint_after", ctx, |project| {
            let appended = SnapshotRepo::checkpoint_after(conn, project, &entity_id, &snapshot_id)?;
            Ok(EngineCommandResult::SnapshotWritten(appended.into()))
        }),

        EngineCommand::InsertWarning { warning } => boundary("insert_warning", ctx, |project| {
            let warning = ConsistencyWarning {
                project_id: project.to_string(),
                ..warning
            };
            Ok(EngineCommandResult::Warning(WarningRepo::insert(conn, warning)?))
        }),

        EngineCommand::IngestFinding { finding } => boundary("ingest_finding", ctx, |project| {
            Ok(EngineCommandResult::Warning(WarningRepo::ingest(
                conn, project, finding,
            )?))
        }),

        EngineCommand::ResolveWarning { warning_id, note } => {
            boundary("resolve_warning", ctx, |project| {
                let resolved = WarningRepo::resolve(conn, project, &warning_id, note.as_deref())?;
                Ok(EngineCommandResult::Warning(resolved))
            })
        }

        EngineCommand::DismissWarning { warning_id } => {
            boundary("dismiss_warning", ctx, |project| {
                let dismissed = WarningRepo::dismiss(conn, project, &warning_id)?;
                Ok(EngineCommandResult::Warning(dismissed))
            })
        }

        EngineCommand::DeleteEntity { entity_id } => boundary("delete_entity", ctx, |project| {
            let tx = begin_immediate(conn)?;
            let counts = DeletionCounts {
                snapshots: SnapshotRepo::delete_entity(&tx, project, &entity_id)?,
                warnings: WarningRepo::delete_entity(&tx, project, &entity_id)?,
            };
            tx.commit().map_err(from_rusqlite)?;
            Ok(EngineCommandResult::Deleted(counts))
        }),

        EngineCommand::DeleteProject => boundary("delete_project", ctx, |project| {
            let tx = begin_immediate(conn)?;
            let counts = DeletionCounts {
                snapshots: SnapshotRepo::delete_project(&tx, project)?,
                warnings: WarningRepo::delete_project(&tx, project)?,
            };
            tx.commit().map_err(from_rusqlite)?;
            Ok(EngineCommandResult::Deleted(counts))
        }),
    }
}
