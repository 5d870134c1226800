//! StoryX Engine - Orchestration layer
//!
//! Provides the command and query surface over a SQLite connection,
//! coordinating core algorithms with the persistence layer, plus the TOML
//! configuration that tunes them.

pub mod commands;
pub mod config;

pub use commands::engine_command::{
    apply_engine_command, apply_engine_command_with_context, DeletionCounts, EngineCommand,
    EngineCommandResult, SnapshotWrite,
};
pub use commands::engine_query::{
    apply_engine_query, apply_engine_query_with_context, ComparisonResult, EngineQuery,
    EngineQueryResult,
};
pub use config::EngineConfig;
