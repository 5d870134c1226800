//! Snapshot log commands
//!
//! Usage: storyx snapshot <record|append|list|show|materialize|compare|checkpoint|entities>

use super::{print_json, read_json, CliResult, Session};
use clap::{Args, Subcommand};
use std::path::PathBuf;
use storyx_engine::{EngineCommand, EngineQuery, EngineQueryResult};

#[derive(Debug, Args)]
pub struct SnapshotArgs {
    #[command(subcommand)]
    pub command: SnapshotCommand,
}

#[derive(Debug, Subcommand)]
pub enum SnapshotCommand {
    /// Record an entity's new complete state (JSON `StateUpdate`)
    Record(InputArgs),
    /// Append a prebuilt snapshot (JSON `StateSnapshot`)
    Append(AppendArgs),
    /// Print an entity's snapshot log
    List { entity_id: String },
    /// Print one snapshot
    Show { snapshot_id: String },
    /// Print an entity's full state at a snapshot
    Materialize {
        entity_id: String,
        snapshot_id: String,
    },
    /// Compare two snapshots of the same entity
    Compare(CompareArgs),
    /// Insert a keyframe right after a snapshot
    Checkpoint {
        entity_id: String,
        snapshot_id: String,
    },
    /// List entities that have snapshots
    Entities,
}

#[derive(Debug, Args)]
pub struct InputArgs {
    /// JSON input file (default: stdin)
    pub input: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct AppendArgs {
    /// JSON input file (default: stdin)
    pub input: Option<PathBuf>,

    /// Accept a timestamp earlier than the log tail
    #[arg(long)]
    pub backfill: bool,
}

#[derive(Debug, Args)]
pub struct CompareArgs {
    pub from_id: String,
    pub to_id: String,

    /// Print only the Markdown summary
    #[arg(long)]
    pub summary: bool,
}

pub fn execute(args: SnapshotArgs, session: &mut Session) -> CliResult {
    match args.command {
        SnapshotCommand::Record(input) => {
            let update = read_json(input.input.as_deref())?;
            print_json(&session.command(EngineCommand::RecordState { update })?)
        }
        SnapshotCommand::Append(append) => {
            let snapshot = read_json(append.input.as_deref())?;
            print_json(&session.command(EngineCommand::AppendSnapshot {
                snapshot,
                backfill: append.backfill,
            })?)
        }
        SnapshotCommand::List { entity_id } => {
            print_json(&session.query(EngineQuery::GetSnapshots { entity_id })?)
        }
        SnapshotCommand::Show { snapshot_id } => {
            print_json(&session.query(EngineQuery::GetSnapshot { snapshot_id })?)
        }
        SnapshotCommand::Materialize {
            entity_id,
            snapshot_id,
        } => print_json(&session.query(EngineQuery::Materialize {
            entity_id,
            snapshot_id,
        })?),
        SnapshotCommand::Compare(compare) => execute_compare(compare, session),
        SnapshotCommand::Checkpoint {
            entity_id,
            snapshot_id,
        } => print_json(&session.command(EngineCommand::CheckpointAfter {
            entity_id,
            snapshot_id,
        })?),
        SnapshotCommand::Entities => print_json(&session.query(EngineQuery::ListEntities)?),
    }
}

fn execute_compare(args: CompareArgs, session: &Session) -> CliResult {
    let result = session.query(EngineQuery::Compare {
        from_id: args.from_id,
        to_id: args.to_id,
    })?;
    match result {
        EngineQueryResult::Comparison(comparison) if args.summary => {
            print!("{}", comparison.human_summary);
            Ok(())
        }
        other => print_json(&other),
    }
}
