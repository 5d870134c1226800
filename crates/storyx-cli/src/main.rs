//! StoryX CLI
//!
//! Command-line interface for StoryX. Command results go to stdout as JSON,
//! logs go to stderr.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use storyx_core::logging_facility;
use storyx_engine::EngineConfig;

mod commands;

#[derive(Debug, Parser)]
#[command(name = "storyx")]
#[command(about = "StoryX - Entity evolution and consistency tracking", long_about = None)]
struct Cli {
    /// Database file (overrides `storage.db_path` from the config)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Project every command is scoped to
    #[arg(long, global = true, default_value = "default")]
    project: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Snapshot log operations
    Snapshot(commands::snapshot::SnapshotArgs),
    /// Consistency warning operations
    Warning(commands::warning::WarningArgs),
    /// Remove an entity's or a project's data
    Delete(commands::delete::DeleteArgs),
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = EngineConfig::load(cli.config.as_deref())?;
    logging_facility::init(config.logging.profile);

    let db_path = cli.db.unwrap_or_else(|| config.storage.db_path.clone());
    let mut session = commands::Session::open(&db_path, cli.project, config.compaction)?;

    match cli.command {
        Commands::Snapshot(args) => commands::snapshot::execute(args, &mut session),
        Commands::Warning(args) => commands::warning::execute(args, &mut session),
        Commands::Delete(args) => commands::delete::execute(args, &mut session),
    }
}
