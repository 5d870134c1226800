//! Consistency warning domain model
//!
//! Warnings are produced by an external detector in PENDING state and moved
//! to RESOLVED or DISMISSED by the writer. Both target states are terminal.

use crate::errors::{Result, StoryXError};
use crate::model::{EntityType, WarningType};
use crate::rules::classification::classify_severity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Resolution note recorded when the caller gives none
pub const DEFAULT_RESOLUTION_NOTE: &str = "手动解决";

/// Display priority of a warning. Ordering: `Error > Warning > Info`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl Severity {
    /// Fixed group order for listings
    pub const DISPLAY_ORDER: [Severity; 3] = [Severity::Error, Severity::Warning, Severity::Info];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Error => "ERROR",
            Severity::Warning => "WARNING",
            Severity::Info => "INFO",
        }
    }

    /// Position in [`Self::DISPLAY_ORDER`]
    pub fn display_rank(&self) -> usize {
        match self {
            Severity::Error => 0,
            Severity::Warning => 1,
            Severity::Info => 2,
        }
    }

    /// Groups are expanded by default only for errors
    pub fn expanded_by_default(&self) -> bool {
        matches!(self, Severity::Error)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ERROR" => Ok(Severity::Error),
            "WARNING" => Ok(Severity::Warning),
            "INFO" => Ok(Severity::Info),
            other => Err(format!("unknown severity: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WarningStatus {
    Pending,
    Resolved,
    Dismissed,
}

impl WarningStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WarningStatus::Pending => "PENDING",
            WarningStatus::Resolved => "RESOLVED",
            WarningStatus::Dismissed => "DISMISSED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, WarningStatus::Pending)
    }
}

impl fmt::Display for WarningStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for WarningStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(WarningStatus::Pending),
            "RESOLVED" => Ok(WarningStatus::Resolved),
            "DISMISSED" => Ok(WarningStatus::Dismissed),
            other => Err(format!("unknown warning status: {}", other)),
        }
    }
}

/// A finding as emitted by a detector, before severity classification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawFinding {
    /// Detector-assigned id; one is generated when absent
    #[serde(default)]
    pub id: Option<String>,
    pub entity_id: String,
    pub entity_type: EntityType,
    pub entity_name: String,
    pub warning_type: WarningType,
    /// Detector's own severity label, e.g. "high" or "WARNING"
    #[serde(default)]
    pub severity: Option<String>,
    pub description: String,
    #[serde(default)]
    pub suggestion: Option<String>,
    #[serde(default)]
    pub expected_value: Option<String>,
    #[serde(default)]
    pub actual_value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsistencyWarning {
    pub id: String,
    pub project_id: String,
    pub entity_id: String,
    pub entity_type: EntityType,
    pub entity_name: String,
    pub warning_type: WarningType,
    pub severity: Severity,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_value: Option<String>,
    pub status: WarningStatus,
    /// Only set on RESOLVED
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
}

impl ConsistencyWarning {
    /// Turn a detector finding into a PENDING warning
    pub fn from_finding(project_id: impl Into<String>, finding: RawFinding) -> Self {
        let severity = classify_severity(finding.severity.as_deref(), &finding.warning_type);
        Self {
            id: finding
                .id
                .unwrap_or_else(|| uuid::Uuid::now_v7().to_string()),
            project_id: project_id.into(),
            entity_id: finding.entity_id,
            entity_type: finding.entity_type,
            entity_name: finding.entity_name,
            warning_type: finding.warning_type,
            severity,
            description: finding.description,
            suggestion: finding.suggestion,
            expected_value: finding.expected_value,
            actual_value: finding.actual_value,
            status: WarningStatus::Pending,
            resolution: None,
            created_at: Utc::now(),
            resolved_at: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == WarningStatus::Pending
    }

    fn ensure_pending(&self) -> Result<()> {
        if self.status.is_terminal() {
            return Err(StoryXError::AlreadyTerminal {
                warning_id: self.id.clone(),
                status: self.status.to_string(),
            });
        }
        Ok(())
    }

    /// PENDING → RESOLVED, recording `note` or the default note
    ///
    /// # Errors
    ///
    /// `AlreadyTerminal` if the warning already left PENDING.
    pub fn resolve(&mut self, note: Option<&str>) -> Result<()> {
        self.ensure_pending()?;
        let note = note
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(DEFAULT_RESOLUTION_NOTE);
        self.status = WarningStatus::Resolved;
        self.resolution = Some(note.to_string());
        self.resolved_at = Some(Utc::now());
        Ok(())
    }

    /// PENDING → DISMISSED
    ///
    /// # Errors
    ///
    /// `AlreadyTerminal` if the warning already left PENDING.
    pub fn dismiss(&mut self) -> Result<()> {
        self.ensure_pending()?;
        self.status = WarningStatus::Dismissed;
        self.resolved_at = Some(Utc::now());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finding(severity: Option<&str>) -> RawFinding {
        RawFinding {
            id: Some("w1".into()),
            entity_id: "char-1".into(),
            entity_type: EntityType::Character,
            entity_name: "Alice".into(),
            warning_type: WarningType::NameConflict,
            severity: severity.map(String::from),
            description: "Alice is called Alicia in chapter 4".into(),
            suggestion: None,
            expected_value: Some("Alice".into()),
            actual_value: Some("Alicia".into()),
        }
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Error > Severity::Warning);
        assert!(Severity::Warning > Severity::Info);
        assert_eq!(
            Severity::DISPLAY_ORDER,
            [Severity::Error, Severity::Warning, Severity::Info]
        );
    }

    #[test]
    fn test_from_finding_is_pending_and_classified() {
        let w = ConsistencyWarning::from_finding("p1", finding(Some("low")));
        assert_eq!(w.status, WarningStatus::Pending);
        assert_eq!(w.severity, Severity::Info);
        assert_eq!(w.id, "w1");
    }

    #[test]
    fn test_resolve_uses_default_note() {
        let mut w = ConsistencyWarning::from_finding("p1", finding(None));
        w.resolve(None).unwrap();
        assert_eq!(w.status, WarningStatus::Resolved);
        assert_eq!(w.resolution.as_deref(), Some(DEFAULT_RESOLUTION_NOTE));
        assert!(w.resolved_at.is_some());
    }

    #[test]
    fn test_dismiss_leaves_no_resolution() {
        let mut w = ConsistencyWarning::from_finding("p1", finding(None));
        w.dismiss().unwrap();
        assert_eq!(w.status, WarningStatus::Dismissed);
        assert!(w.resolution.is_none());
    }

    #[test]
    fn test_terminal_states_reject_transitions() {
        let mut w = ConsistencyWarning::from_finding("p1", finding(None));
        w.dismiss().unwrap();
        assert!(matches!(
            w.resolve(Some("late")),
            Err(StoryXError::AlreadyTerminal { .. })
        ));
        assert!(matches!(w.dismiss(), Err(StoryXError::AlreadyTerminal { .. })));
    }

    #[test]
    fn test_status_serializes_uppercase() {
        assert_eq!(
            serde_json::to_string(&WarningStatus::Dismissed).unwrap(),
            "\"DISMISSED\""
        );
        assert_eq!(serde_json::to_string(&Severity::Error).unwrap(), "\"ERROR\"");
    }
}
