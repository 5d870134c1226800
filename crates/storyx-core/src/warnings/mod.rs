//! Consistency warning lifecycle.

pub mod queue;

pub use queue::{group_by_severity, WarningCounts, WarningFilter, WarningGroup, WarningQueue};
