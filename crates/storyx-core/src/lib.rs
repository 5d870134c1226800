//! StoryX Core - Canonical in-memory kernel
//!
//! This crate provides the storage-agnostic core of StoryX, including:
//! - Snapshot and warning models with open tagged entity/warning types
//! - Classification rules for field changes and detector severities
//! - The append-only snapshot log with keyframe compaction
//! - Reconstruction by replay and the structural diff engine
//! - The comparison selector state machine
//! - The consistency warning queue and its resolve/dismiss lifecycle
//! - A per-project [`Store`] with subscription notifications

pub mod diff;
pub mod errors;
pub mod logging_facility;
pub mod model;
pub mod rules;
pub mod selector;
pub mod snapshot;
pub mod store;
pub mod warnings;

// Re-export commonly used types
pub use diff::{ChangeSet, FieldChange, FieldChanges};
pub use errors::{ExError, ExErrorKind, Result, StoryXError};
pub use model::{
    ChangeType, ConsistencyWarning, EntityState, EntityType, RawFinding, Severity,
    SnapshotPayload, StateSnapshot, WarningStatus, WarningType,
};
pub use selector::{ComparisonRequest, ComparisonSelector, Selection};
pub use snapshot::{CompactionPolicy, SnapshotLog, StateUpdate};
pub use store::{Store, StoreEvent};
pub use warnings::{WarningCounts, WarningFilter, WarningQueue};
