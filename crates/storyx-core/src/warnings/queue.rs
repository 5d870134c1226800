//! Consistency detector queue
//!
//! Owns the lifecycle of a project's warnings. Detectors insert PENDING
//! warnings; users resolve or dismiss them. Transitions take the queue's write
//! lock, so two concurrent transitions on one warning are ordered: the first
//! wins and the second sees a terminal status.

use crate::errors::{Result, StoryXError};
use crate::model::{ConsistencyWarning, RawFinding, Severity, WarningStatus};
use crate::rules::validation::validate_new_warning;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// PENDING warnings per severity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarningCounts {
    pub error: usize,
    pub warning: usize,
    pub info: usize,
    pub total: usize,
}

impl WarningCounts {
    pub fn add(&mut self, severity: Severity) {
        self.add_many(severity, 1);
    }

    pub fn add_many(&mut self, severity: Severity, n: usize) {
        match severity {
            Severity::Error => self.error += n,
            Severity::Warning => self.warning += n,
            Severity::Info => self.info += n,
        }
        self.total += n;
    }

    pub fn get(&self, severity: Severity) -> usize {
        match severity {
            Severity::Error => self.error,
            Severity::Warning => self.warning,
            Severity::Info => self.info,
        }
    }
}

/// Listing filter. The default shows PENDING warnings of every severity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WarningFilter {
    pub severity: Option<Severity>,
    pub entity_id: Option<String>,
    /// `None` matches every status
    pub status: Option<WarningStatus>,
}

impl Default for WarningFilter {
    fn default() -> Self {
        Self {
            severity: None,
            entity_id: None,
            status: Some(WarningStatus::Pending),
        }
    }
}

impl WarningFilter {
    pub fn pending() -> Self {
        Self::default()
    }

    /// Every status, every severity
    pub fn all() -> Self {
        Self {
            status: None,
            ..Self::default()
        }
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }

    pub fn for_entity(mut self, entity_id: impl Into<String>) -> Self {
        self.entity_id = Some(entity_id.into());
        self
    }

    pub fn with_status(mut self, status: Option<WarningStatus>) -> Self {
        self.status = status;
        self
    }

    pub fn matches(&self, warning: &ConsistencyWarning) -> bool {
        self.severity.map_or(true, |s| s == warning.severity)
            && self
                .entity_id
                .as_deref()
                .map_or(true, |e| e == warning.entity_id)
            && self.status.map_or(true, |s| s == warning.status)
    }
}

/// One severity section of a grouped listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarningGroup {
    pub severity: Severity,
    /// Whether the section starts expanded
    pub expanded: bool,
    pub warnings: Vec<ConsistencyWarning>,
}

/// Split an ordered listing into non-empty severity sections in display
/// order, keeping the listing order inside each section
pub fn group_by_severity(listed: Vec<ConsistencyWarning>) -> Vec<WarningGroup> {
    Severity::DISPLAY_ORDER
        .iter()
        .filter_map(|severity| {
            let warnings: Vec<ConsistencyWarning> = listed
                .iter()
                .filter(|w| w.severity == *severity)
                .cloned()
                .collect();
            (!warnings.is_empty()).then(|| WarningGroup {
                severity: *severity,
                expanded: severity.expanded_by_default(),
                warnings,
            })
        })
        .collect()
}

#[derive(Debug, Default)]
struct QueueInner {
    warnings: HashMap<String, (u64, ConsistencyWarning)>,
    next_seq: u64,
}

#[derive(Debug, Default)]
pub struct WarningQueue {
    inner: RwLock<QueueInner>,
}

impl WarningQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, QueueInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, QueueInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert a detector-produced warning.
    ///
    /// # Errors
    ///
    /// - `InvalidWarning` unless the warning is PENDING with no resolution
    /// - `WarningAlreadyExists` if the id is taken
    pub fn insert(&self, warning: ConsistencyWarning) -> Result<ConsistencyWarning> {
        validate_new_warning(&warning)?;
        let mut inner = self.write();
        if inner.warnings.contains_key(&warning.id) {
            return Err(StoryXError::WarningAlreadyExists {
                warning_id: warning.id,
            });
        }
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner
            .warnings
            .insert(warning.id.clone(), (seq, warning.clone()));
        Ok(warning)
    }

    /// Classify a raw finding and insert it as a PENDING warning.
    ///
    /// # Errors
    ///
    /// `WarningAlreadyExists` if the finding carries a taken id.
    pub fn ingest(&self, project_id: &str, finding: RawFinding) -> Result<ConsistencyWarning> {
        self.insert(ConsistencyWarning::from_finding(project_id, finding))
    }

    /// # Errors
    ///
    /// `WarningNotFound` if the id is unknown.
    pub fn get(&self, warning_id: &str) -> Result<ConsistencyWarning> {
        self.read()
            .warnings
            .get(warning_id)
            .map(|(_, w)| w.clone())
            .ok_or_else(|| StoryXError::WarningNotFound {
                warning_id: warning_id.to_string(),
            })
    }

    /// Counts over PENDING warnings only
    pub fn counts(&self) -> WarningCounts {
        let mut counts = WarningCounts::default();
        for (_, w) in self.read().warnings.values() {
            if w.is_pending() {
                counts.add(w.severity);
            }
        }
        counts
    }

    /// Matching warnings ordered ERROR, WARNING, INFO, then by creation
    pub fn list(&self, filter: &WarningFilter) -> Vec<ConsistencyWarning> {
        let inner = self.read();
        let mut matched: Vec<&(u64, ConsistencyWarning)> = inner
            .warnings
            .values()
            .filter(|(_, w)| filter.matches(w))
            .collect();
        matched.sort_by(|(seq_a, a), (seq_b, b)| {
            b.severity
                .cmp(&a.severity)
                .then(a.created_at.cmp(&b.created_at))
                .then(seq_a.cmp(seq_b))
        });
        matched.into_iter().map(|(_, w)| w.clone()).collect()
    }

    /// Matching warnings split into non-empty severity sections in display
    /// order
    pub fn grouped(&self, filter: &WarningFilter) -> Vec<WarningGroup> {
        group_by_severity(self.list(filter))
    }

    fn transition(
        &self,
        warning_id: &str,
        apply: impl FnOnce(&mut ConsistencyWarning) -> Result<()>,
    ) -> Result<ConsistencyWarning> {
        let mut inner = self.write();
        let (_, warning) =
            inner
                .warnings
                .get_mut(warning_id)
                .ok_or_else(|| StoryXError::WarningNotFound {
                    warning_id: warning_id.to_string(),
                })?;
        apply(warning)?;
        Ok(warning.clone())
    }

    /// PENDING → RESOLVED with `note`, or the default note when absent.
    ///
    /// # Errors
    ///
    /// `WarningNotFound` for an unknown id, `AlreadyTerminal` if the warning
    /// already left PENDING.
    pub fn resolve(&self, warning_id: &str, note: Option<&str>) -> Result<ConsistencyWarning> {
        self.transition(warning_id, |w| w.resolve(note))
    }

    /// PENDING → DISMISSED.
    ///
    /// # Errors
    ///
    /// `WarningNotFound` for an unknown id, `AlreadyTerminal` if the warning
    /// already left PENDING.
    pub fn dismiss(&self, warning_id: &str) -> Result<ConsistencyWarning> {
        self.transition(warning_id, |w| w.dismiss())
    }

    /// Remove every warning about `entity_id`. Returns how many were removed.
    pub fn delete_entity(&self, entity_id: &str) -> usize {
        let mut inner = self.write();
        let before = inner.warnings.len();
        inner.warnings.retain(|_, (_, w)| w.entity_id != entity_id);
        before - inner.warnings.len()
    }

    /// Remove every warning. Returns how many were removed.
    pub fn clear(&self) -> usize {
        let mut inner = self.write();
        let removed = inner.warnings.len();
        inner.warnings.clear();
        removed
    }

    pub fn len(&self) -> usize {
        self.read().warnings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
