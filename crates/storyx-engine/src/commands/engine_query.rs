//! Engine-level read-only query surface.
//!
//! `apply_engine_query` is the single entry point for all read-only queries.
//! Unlike `apply_engine_command`, it accepts a shared (non-mutable)
//! connection and never writes to the DB.

#![allow(clippy::result_large_err)]

use crate::commands::boundary;
use rusqlite::Connection;
use serde::Serialize;
use storyx_core::diff::render_human_summary;
use storyx_core::model::{ConsistencyWarning, EntityState, StateSnapshot};
use storyx_core::warnings::{WarningCounts, WarningFilter, WarningGroup};
use storyx_core::ChangeSet;
use storyx_core_types::correlation::RequestContext;
use storyx_store::{Result, SnapshotRepo, WarningRepo};

/// Read-only queries supported by the engine.
#[derive(Debug, Clone)]
pub enum EngineQuery {
    // ── Snapshots ─────────────────────────────────────────────────────────────
    /// An entity's log in ascending order.
    GetSnapshots { entity_id: String },
    GetSnapshot { snapshot_id: String },
    /// Full state at a snapshot.
    Materialize {
        entity_id: String,
        snapshot_id: String,
    },
    /// Field-level comparison of two snapshots of one entity.
    Compare { from_id: String, to_id: String },
    /// Entities with at least one snapshot.
    ListEntities,

    // ── Warnings ──────────────────────────────────────────────────────────────
    /// PENDING warnings per severity.
    WarningCounts,
    GetWarning { warning_id: String },
    /// `None` lists PENDING warnings of every severity.
    ListWarnings { filter: Option<WarningFilter> },
    /// Like `ListWarnings`, split into severity sections.
    GroupedWarnings { filter: Option<WarningFilter> },
}

/// The structured + rendered result of a `Compare` query.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonResult {
    /// Machine-readable change set
    pub change_set: ChangeSet,
    /// Human-readable Markdown summary
    pub human_summary: String,
}

/// All possible results from `apply_engine_query`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum EngineQueryResult {
    Snapshots(Vec<StateSnapshot>),
    Snapshot(StateSnapshot),
    State(EntityState),
    Comparison(Box<ComparisonResult>),
    Entities(Vec<String>),
    WarningCounts(WarningCounts),
    Warning(ConsistencyWarning),
    Warnings(Vec<ConsistencyWarning>),
    WarningGroups(Vec<WarningGroup>),
}

/// Apply `query` to `project_id` with a fresh request context.
///
/// # Errors
///
/// See [`apply_engine_query_with_context`].
pub fn apply_engine_query(
    query: EngineQuery,
    project_id: &str,
    conn: &Connection,
) -> Result<EngineQueryResult> {
    let ctx = RequestContext::new().for_project(project_id);
    apply_engine_query_with_context(query, conn, &ctx)
}

/// Apply `query` to the project named by `ctx`.
///
/// # Errors
///
/// - `ERR_INVALID_INPUT`: the context has no project, or `Compare` spans two entities
/// - `ERR_NOT_FOUND`: unknown snapshot or warning id
/// - `ERR_PERSISTENCE`: SQLite failure
pub fn apply_engine_query_with_context(
    query: EngineQuery,
    conn: &Connection,
    ctx: &RequestContext,
) -> Result<EngineQueryResult> {
    match query {
        // ── Snapshots ─────────────────────────────────────────────────────────
        EngineQuery::GetSnapshots { entity_id } => boundary("get_snapshots", ctx, |project| {
            let log = SnapshotRepo::list_by_entity(conn, project, &entity_id)?;
            Ok(EngineQueryResult::Snapshots(log))
        }),

        EngineQuery::GetSnapshot { snapshot_id } => boundary("get_snapshot", ctx, |project| {
            Ok(EngineQueryResult::Snapshot(SnapshotRepo::get(
                conn,
                project,
                &snapshot_id,
            )?))
        }),

        EngineQuery::Materialize {
            entity_id,
            snapshot_id,
        } => boundary("materialize", ctx, |project| {
            let state = SnapshotRepo::materialize(conn, project, &entity_id, &snapshot_id)?;
            Ok(EngineQueryResult::State(state))
        }),

        EngineQuery::Compare { from_id, to_id } => boundary("compare", ctx, |project| {
            let change_set = SnapshotRepo::compare(conn, project, &from_id, &to_id)?;
            let human_summary = render_human_summary(&change_set);
            Ok(EngineQueryResult::Comparison(Box::new(ComparisonResult {
                change_set,
                human_summary,
            })))
        }),

        EngineQuery::ListEntities => boundary("list_entities", ctx, |project| {
            Ok(EngineQueryResult::Entities(SnapshotRepo::entity_ids(
                conn, project,
            )?))
        }),

        // ── Warnings ──────────────────────────────────────────────────────────
        EngineQuery::WarningCounts => boundary("warning_counts", ctx, |project| {
            Ok(EngineQueryResult::WarningCounts(WarningRepo::counts(
                conn, project,
            )?))
        }),

        EngineQuery::GetWarning { warning_id } => boundary("get_warning", ctx, |project| {
            Ok(EngineQueryResult::Warning(WarningRepo::get(
                conn,
                project,
                &warning_id,
            )?))
        }),

        EngineQuery::ListWarnings { filter } => boundary("list_warnings", ctx, |project| {
            let filter = filter.unwrap_or_default();
            Ok(EngineQueryResult::Warnings(WarningRepo::list(
                conn, project, &filter,
            )?))
        }),

        EngineQuery::GroupedWarnings { filter } => {
            boundary("grouped_warnings", ctx, |project| {
                let filter = filter.unwrap_or_default();
                Ok(EngineQueryResult::WarningGroups(WarningRepo::grouped(
                    conn, project, &filter,
                )?))
            })
        }
    }
}
