//! Deletion commands

use super::{print_json, CliResult, Session};
use clap::{Args, Subcommand};
use storyx_engine::EngineCommand;

#[derive(Debug, Args)]
pub struct DeleteArgs {
    #[command(subcommand)]
    pub command: DeleteCommand,
}

#[derive(Debug, Subcommand)]
pub enum DeleteCommand {
    /// Delete an entity's snapshots and warnings
    Entity { entity_id: String },
    /// Delete every snapshot and warning of the project
    Project,
}

pub fn execute(args: DeleteArgs, session: &mut Session) -> CliResult {
    let cmd = match args.command {
        DeleteCommand::Entity { entity_id } => EngineCommand::DeleteEntity { entity_id },
        DeleteCommand::Project => EngineCommand::DeleteProject,
    };
    print_json(&session.command(cmd)?)
}
