//! Classification rules.
//!
//! Field deltas are classified as added/removed/modified from which sides are
//! present. Raw detector findings are classified as ERROR/WARNING/INFO from
//! the detector's severity label, falling back to the warning type.

use crate::model::{Severity, WarningType};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How a single field changed between two states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Removed,
    Modified,
}

impl ChangeKind {
    /// `None` when neither side is present
    pub fn classify(old: Option<&Value>, new: Option<&Value>) -> Option<Self> {
        match (old, new) {
            (None, Some(_)) => Some(ChangeKind::Added),
            (Some(_), None) => Some(ChangeKind::Removed),
            (Some(_), Some(_)) => Some(ChangeKind::Modified),
            (None, None) => None,
        }
    }

    /// Classification of the same change read in the opposite direction
    pub fn reversed(self) -> Self {
        match self {
            ChangeKind::Added => ChangeKind::Removed,
            ChangeKind::Removed => ChangeKind::Added,
            ChangeKind::Modified => ChangeKind::Modified,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Added => "added",
            ChangeKind::Removed => "removed",
            ChangeKind::Modified => "modified",
        }
    }
}

/// Severity a warning type carries when the detector gives no usable label
pub fn default_severity(warning_type: &WarningType) -> Severity {
    match warning_type {
        WarningType::NameConflict | WarningType::TimelineConflict => Severity::Error,
        WarningType::RelationshipInconsistency
        | WarningType::PlotHole
        | WarningType::CharacterInconsistency => Severity::Warning,
        WarningType::MissingField | WarningType::Other(_) => Severity::Info,
    }
}

/// Map a detector's raw severity label onto the three-level scale.
///
/// Labels are matched case-insensitively after trimming.
pub fn classify_severity(raw: Option<&str>, warning_type: &WarningType) -> Severity {
    let label = raw.map(|r| r.trim().to_ascii_lowercase());
    match label.as_deref() {
        Some("error" | "critical" | "high") => Severity::Error,
        Some("warning" | "warn" | "medium") => Severity::Warning,
        Some("info" | "low" | "hint") => Severity::Info,
        _ => default_severity(warning_type),
    }
}
