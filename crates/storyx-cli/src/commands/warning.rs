//! Consistency warning commands
//!
//! Usage: storyx warning <ingest|insert|counts|list|show|resolve|dismiss>

use super::{print_json, read_json, CliResult, Session};
use clap::{Args, Subcommand};
use std::path::PathBuf;
use storyx_core::model::{Severity, WarningStatus};
use storyx_core::WarningFilter;
use storyx_engine::{EngineCommand, EngineQuery};

#[derive(Debug, Args)]
pub struct WarningArgs {
    #[command(subcommand)]
    pub command: WarningCommand,
}

#[derive(Debug, Subcommand)]
pub enum WarningCommand {
    /// Classify and store a detector finding (JSON `RawFinding`)
    Ingest {
        /// JSON input file (default: stdin)
        input: Option<PathBuf>,
    },
    /// Store a fully formed warning (JSON `ConsistencyWarning`)
    Insert {
        /// JSON input file (default: stdin)
        input: Option<PathBuf>,
    },
    /// Count PENDING warnings per severity
    Counts,
    /// List warnings, most severe first
    List(ListArgs),
    Show { warning_id: String },
    /// Mark a PENDING warning resolved
    Resolve {
        warning_id: String,
        #[arg(long)]
        note: Option<String>,
    },
    /// Mark a PENDING warning dismissed
    Dismiss { warning_id: String },
}

#[derive(Debug, Args)]
pub struct ListArgs {
    /// ERROR, WARNING or INFO
    #[arg(long)]
    pub severity: Option<Severity>,

    #[arg(long)]
    pub entity: Option<String>,

    /// PENDING, RESOLVED or DISMISSED (default: PENDING)
    #[arg(long, conflicts_with = "all")]
    pub status: Option<WarningStatus>,

    /// Include every status
    #[arg(long)]
    pub all: bool,

    /// Split the listing into severity sections
    #[arg(long)]
    pub grouped: bool,
}

impl ListArgs {
    fn filter(&self) -> WarningFilter {
        let mut filter = if self.all {
            WarningFilter::all()
        } else {
            WarningFilter::pending().with_status(self.status.or(Some(WarningStatus::Pending)))
        };
        if let Some(severity) = self.severity {
            filter = filter.with_severity(severity);
        }
        if let Some(entity) = &self.entity {
            filter = filter.for_entity(entity.clone());
        }
        filter
    }
}

pub fn execute(args: WarningArgs, session: &mut Session) -> CliResult {
    match args.command {
        WarningCommand::Ingest { input } => {
            let finding = read_json(input.as_deref())?;
            print_json(&session.command(EngineCommand::IngestFinding { finding })?)
        }
        WarningCommand::Insert { input } => {
            let warning = read_json(input.as_deref())?;
            print_json(&session.command(EngineCommand::InsertWarning { warning })?)
        }
        WarningCommand::Counts => print_json(&session.query(EngineQuery::WarningCounts)?),
        WarningCommand::List(list) => {
            let filter = Some(list.filter());
            let query = if list.grouped {
                EngineQuery::GroupedWarnings { filter }
            } else {
                EngineQuery::ListWarnings { filter }
            };
            print_json(&session.query(query)?)
        }
        WarningCommand::Show { warning_id } => {
            print_json(&session.query(EngineQuery::GetWarning { warning_id })?)
        }
        WarningCommand::Resolve { warning_id, note } => {
            print_json(&session.command(EngineCommand::ResolveWarning { warning_id, note })?)
        }
        WarningCommand::Dismiss { warning_id } => {
            print_json(&session.command(EngineCommand::DismissWarning { warning_id })?)
        }
    }
}
