//! Project store
//!
//! One [`Store`] per project per process. It owns the snapshot log, the
//! warning queue and the compaction policy, exposes the query surface, and
//! notifies subscribers after every successful write.
//!
//! ## Logging Ownership
//!
//! The store owns lifecycle logging for its operations:
//! - `log_op_start!` at entry
//! - `log_op_end!` on success
//! - `log_op_error!` on failure
//!
//! The log, queue and replay code below it use only `tracing::debug!()`.

use crate::diff::engine::diff_states;
use crate::diff::model::ChangeSet;
use crate::errors::{ExError, StoryXError};
use crate::model::{ConsistencyWarning, EntityState, RawFinding, Severity, StateSnapshot};
use crate::snapshot::log::{Appended, CompactionPolicy, SnapshotLog};
use crate::snapshot::producer::StateUpdate;
use crate::snapshot::reconstruct::{annotate, chain_between, materialize_at, position_of};
use crate::warnings::queue::{WarningCounts, WarningFilter, WarningGroup, WarningQueue};
use crate::{log_op_end, log_op_error, log_op_start};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

/// Result type of the store's public surface
pub type StoreResult<T> = std::result::Result<T, ExError>;

/// Change notification delivered to subscribers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StoreEvent {
    SnapshotAppended {
        entity_id: String,
        snapshot_id: String,
        keyframe: bool,
    },
    CheckpointInserted {
        entity_id: String,
        snapshot_id: String,
    },
    WarningAdded {
        warning_id: String,
        severity: Severity,
    },
    WarningResolved {
        warning_id: String,
    },
    WarningDismissed {
        warning_id: String,
    },
    EntityDeleted {
        entity_id: String,
        snapshots: usize,
        warnings: usize,
    },
    ProjectDeleted {
        project_id: String,
    },
}

#[derive(Debug)]
pub struct Store {
    project_id: String,
    policy: CompactionPolicy,
    log: SnapshotLog,
    warnings: WarningQueue,
    subscribers: Mutex<Vec<Sender<StoreEvent>>>,
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

impl Store {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self::with_policy(project_id, CompactionPolicy::default())
    }

    pub fn with_policy(project_id: impl Into<String>, policy: CompactionPolicy) -> Self {
        Self {
            project_id: project_id.into(),
            policy,
            log: SnapshotLog::new(),
            warnings: WarningQueue::new(),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn policy(&self) -> &CompactionPolicy {
        &self.policy
    }

    /// Receive every event published after this call. Dropping the receiver
    /// unsubscribes.
    pub fn subscribe(&self) -> Receiver<StoreEvent> {
        let (tx, rx) = channel();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    fn publish(&self, event: StoreEvent) {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Run `f` between boundary log events, mapping its error to `ExError`
    fn run<T>(
        &self,
        op: &'static str,
        f: impl FnOnce() -> Result<T, StoryXError>,
    ) -> StoreResult<T> {
        log_op_start!(op, project_id = %self.project_id);
        let start = Instant::now();
        match f() {
            Ok(value) => {
                log_op_end!(op, duration_ms = elapsed_ms(start));
                Ok(value)
            }
            Err(e) => {
                log_op_error!(op, e.clone(), duration_ms = elapsed_ms(start));
                Err(ExError::from(e).with_op(op))
            }
        }
    }

    // ===== Snapshots =====

    /// Append a snapshot produced elsewhere.
    ///
    /// # Errors
    ///
    /// `ERR_OUT_OF_ORDER`, `ERR_MISSING_KEYFRAME`, `ERR_ID_CONFLICT` or
    /// `ERR_INVALID_INPUT`; see [`SnapshotLog::append`].
    pub fn append_snapshot(&self, snapshot: StateSnapshot, backfill: bool) -> StoreResult<Appended> {
        let appended = self.run("append_snapshot", || self.log.append(snapshot, backfill))?;
        if !appended.duplicate {
            self.publish(StoreEvent::SnapshotAppended {
                entity_id: appended.snapshot.entity_id.clone(),
                snapshot_id: appended.snapshot.id.clone(),
                keyframe: appended.snapshot.is_keyframe(),
            });
        }
        Ok(appended)
    }

    /// Record a new complete state; see [`SnapshotLog::record`].
    ///
    /// # Errors
    ///
    /// `ERR_INVALID_INPUT` for an out-of-range confidence.
    pub fn record_state(&self, update: StateUpdate) -> StoreResult<Option<Appended>> {
        let recorded = self.run("record_state", || self.log.record(update, &self.policy))?;
        if let Some(appended) = &recorded {
            self.publish(StoreEvent::SnapshotAppended {
                entity_id: appended.snapshot.entity_id.clone(),
                snapshot_id: appended.snapshot.id.clone(),
                keyframe: appended.snapshot.is_keyframe(),
            });
        }
        Ok(recorded)
    }

    /// # Errors
    ///
    /// `ERR_NOT_FOUND` if the snapshot is not in the entity's log.
    pub fn checkpoint_after(&self, entity_id: &str, snapshot_id: &str) -> StoreResult<Appended> {
        let appended = self.run("checkpoint_after", || {
            self.log.checkpoint_after(entity_id, snapshot_id)
        })?;
        self.publish(StoreEvent::CheckpointInserted {
            entity_id: entity_id.to_string(),
            snapshot_id: appended.snapshot.id.clone(),
        });
        Ok(appended)
    }

    /// The entity's snapshots in ascending log order
    pub fn get_snapshots(&self, entity_id: &str) -> Vec<Arc<StateSnapshot>> {
        self.log.list_by_entity(entity_id)
    }

    /// # Errors
    ///
    /// `ERR_NOT_FOUND` for an unknown id.
    pub fn get_snapshot(&self, snapshot_id: &str) -> StoreResult<Arc<StateSnapshot>> {
        self.log.get(snapshot_id).ok_or_else(|| {
            ExError::from(StoryXError::SnapshotNotFound {
                entity_id: String::new(),
                snapshot_id: snapshot_id.to_string(),
            })
            .with_op("get_snapshot")
        })
    }

    /// # Errors
    ///
    /// `ERR_NOT_FOUND` if the snapshot is not in the entity's log.
    pub fn materialize(&self, entity_id: &str, snapshot_id: &str) -> StoreResult<EntityState> {
        self.run("materialize", || self.log.materialize(entity_id, snapshot_id))
    }

    /// Diff the materialized states of two snapshots of one entity, with
    /// the recorded reasons and quotes attached.
    ///
    /// Both sides are replayed from one copy of the entity's log.
    ///
    /// # Errors
    ///
    /// `ERR_NOT_FOUND` for an unknown id, `ERR_INVALID_INPUT` if the
    /// snapshots belong to different entities.
    pub fn compare(&self, from_id: &str, to_id: &str) -> StoreResult<ChangeSet> {
        self.run("compare", || {
            let from = self.log.get(from_id).ok_or_else(|| StoryXError::SnapshotNotFound {
                entity_id: String::new(),
                snapshot_id: from_id.to_string(),
            })?;
            let to = self.log.get(to_id).ok_or_else(|| StoryXError::SnapshotNotFound {
                entity_id: from.entity_id.clone(),
                snapshot_id: to_id.to_string(),
            })?;
            if from.entity_id != to.entity_id {
                return Err(StoryXError::EntityMismatch {
                    from_id: from_id.to_string(),
                    to_id: to_id.to_string(),
                });
            }
            compare_in_log(&from.entity_id, &self.log.list_by_entity(&from.entity_id), from_id, to_id)
        })
    }

    // ===== Warnings =====

    /// # Errors
    ///
    /// - `ERR_INVALID_INPUT` unless the warning is PENDING with no resolution
    /// - `ERR_ALREADY_EXISTS` if the id is taken
    pub fn insert_warning(&self, warning: ConsistencyWarning) -> StoreResult<ConsistencyWarning> {
        let warning = ConsistencyWarning {
            project_id: self.project_id.clone(),
            ..warning
        };
        let inserted = self.run("insert_warning", || self.warnings.insert(warning))?;
        self.publish(StoreEvent::WarningAdded {
            warning_id: inserted.id.clone(),
            severity: inserted.severity,
        });
        Ok(inserted)
    }

    /// # Errors
    ///
    /// `ERR_ALREADY_EXISTS` if the finding carries a taken id.
    pub fn ingest_finding(&self, finding: RawFinding) -> StoreResult<ConsistencyWarning> {
        let inserted = self.run("ingest_finding", || {
            self.warnings.ingest(&self.project_id, finding)
        })?;
        self.publish(StoreEvent::WarningAdded {
            warning_id: inserted.id.clone(),
            severity: inserted.severity,
        });
        Ok(inserted)
    }

    /// # Errors
    ///
    /// `ERR_NOT_FOUND` for an unknown id.
    pub fn get_warning(&self, warning_id: &str) -> StoreResult<ConsistencyWarning> {
        self.warnings
            .get(warning_id)
            .map_err(|e| ExError::from(e).with_op("get_warning"))
    }

    pub fn warning_counts(&self) -> WarningCounts {
        self.warnings.counts()
    }

    /// PENDING warnings of every severity when `filter` is `None`
    pub fn list_warnings(&self, filter: Option<&WarningFilter>) -> Vec<ConsistencyWarning> {
        match filter {
            Some(f) => self.warnings.list(f),
            None => self.warnings.list(&WarningFilter::default()),
        }
    }

    pub fn grouped_warnings(&self, filter: Option<&WarningFilter>) -> Vec<WarningGroup> {
        match filter {
            Some(f) => self.warnings.grouped(f),
            None => self.warnings.grouped(&WarningFilter::default()),
        }
    }

    /// # Errors
    ///
    /// `ERR_NOT_FOUND` for an unknown id, `ERR_ALREADY_TERMINAL` if the
    /// warning already left PENDING.
    pub fn resolve_warning(
        &self,
        warning_id: &str,
        note: Option<&str>,
    ) -> StoreResult<ConsistencyWarning> {
        let resolved = self.run("resolve_warning", || self.warnings.resolve(warning_id, note))?;
        self.publish(StoreEvent::WarningResolved {
            warning_id: resolved.id.clone(),
        });
        Ok(resolved)
    }

    /// # Errors
    ///
    /// `ERR_NOT_FOUND` for an unknown id, `ERR_ALREADY_TERMINAL` if the
    /// warning already left PENDING.
    pub fn dismiss_warning(&self, warning_id: &str) -> StoreResult<ConsistencyWarning> {
        let dismissed = self.run("dismiss_warning", || self.warnings.dismiss(warning_id))?;
        self.publish(StoreEvent::WarningDismissed {
            warning_id: dismissed.id.clone(),
        });
        Ok(dismissed)
    }

    // ===== Cascade =====

    /// Remove an entity's snapshot log and its warnings
    pub fn delete_entity(&self, entity_id: &str) -> (usize, usize) {
        log_op_start!("delete_entity", entity_id = entity_id);
        let start = Instant::now();
        let snapshots = self.log.delete_entity(entity_id);
        let warnings = self.warnings.delete_entity(entity_id);
        log_op_end!(
            "delete_entity",
            duration_ms = elapsed_ms(start),
            snapshots = snapshots,
            warnings = warnings
        );
        self.publish(StoreEvent::EntityDeleted {
            entity_id: entity_id.to_string(),
            snapshots,
            warnings,
        });
        (snapshots, warnings)
    }

    /// Remove everything the project owns
    pub fn delete_project(&self) -> (usize, usize) {
        log_op_start!("delete_project", project_id = %self.project_id);
        let start = Instant::now();
        let snapshots = self.log.clear();
        let warnings = self.warnings.clear();
        log_op_end!("delete_project", duration_ms = elapsed_ms(start));
        self.publish(StoreEvent::ProjectDeleted {
            project_id: self.project_id.clone(),
        });
        (snapshots, warnings)
    }
}

/// Compare two snapshots of one entity within a single copy of its log.
///
/// # Errors
///
/// `SnapshotNotFound` if either id is not in `log`.
pub fn compare_in_log<S: Borrow<StateSnapshot>>(
    entity_id: &str,
    log: &[S],
    from_id: &str,
    to_id: &str,
) -> Result<ChangeSet, StoryXError> {
    let not_found = |id: &str| StoryXError::SnapshotNotFound {
        entity_id: entity_id.to_string(),
        snapshot_id: id.to_string(),
    };
    let from_idx = position_of(log, from_id).ok_or_else(|| not_found(from_id))?;
    let to_idx = position_of(log, to_id).ok_or_else(|| not_found(to_id))?;

    let from_state = materialize_at(entity_id, log, from_idx)?;
    let to_state = materialize_at(entity_id, log, to_idx)?;
    let mut set = diff_states(entity_id, from_id, &from_state, to_id, &to_state);
    annotate(&mut set.changes, chain_between(log, from_idx, to_idx));
    Ok(set)
}
