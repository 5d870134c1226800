//! StoryX Store - SQLite persistence for snapshot logs and warnings
//!
//! Provides:
//! - Connection management with WAL and busy-timeout settings
//! - Checksummed embedded migrations tracked in `schema_version`
//! - A snapshot-log repository that places rows with the core ordering rules
//! - A warning repository with guarded PENDING transitions
//! - Entity and project cascade deletes

pub mod db;
pub mod errors;
pub mod migrations;
pub mod repo;

// Re-export key types
pub use errors::Result;
pub use repo::{SnapshotRepo, WarningRepo};
