//! Consistency warning persistence
//!
//! Transitions load the warning, apply the core lifecycle rule, then write it
//! back with `UPDATE ... WHERE status = 'PENDING'`. A zero-row update means a
//! concurrent writer already moved the warning out of PENDING.

#![allow(clippy::result_large_err)]

use crate::db::begin_immediate;
use crate::errors::{corrupt_row, from_rusqlite, is_constraint_violation, Result};
use crate::repo::codec::{parse_time, sql_time};
use rusqlite::{Connection, OptionalExtension};
use storyx_core::errors::StoryXError;
use storyx_core::rules::validation::validate_new_warning;
use storyx_core::model::{
    ConsistencyWarning, EntityType, RawFinding, Severity, WarningStatus, WarningType,
};
use storyx_core::warnings::{group_by_severity, WarningCounts, WarningFilter, WarningGroup};

const TABLE: &str = "consistency_warnings";

const COLUMNS: &str = "id, project_id, entity_id, entity_type, entity_name, warning_type, \
                       severity, description, suggestion, expected_value, actual_value, \
                       status, resolution, created_at, resolved_at";

/// A raw row from the `consistency_warnings` table
#[derive(Debug, Clone)]
pub struct WarningRow {
    pub id: String,
    pub project_id: String,
    pub entity_id: String,
    pub entity_type: String,
    pub entity_name: String,
    pub warning_type: String,
    pub severity: String,
    pub description: String,
    pub suggestion: Option<String>,
    pub expected_value: Option<String>,
    pub actual_value: Option<String>,
    pub status: String,
    pub resolution: Option<String>,
    pub created_at: String,
    pub resolved_at: Option<String>,
}

impl WarningRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            project_id: row.get(1)?,
            entity_id: row.get(2)?,
            entity_type: row.get(3)?,
            entity_name: row.get(4)?,
            warning_type: row.get(5)?,
            severity: row.get(6)?,
            description: row.get(7)?,
            suggestion: row.get(8)?,
            expected_value: row.get(9)?,
            actual_value: row.get(10)?,
            status: row.get(11)?,
            resolution: row.get(12)?,
            created_at: row.get(13)?,
            resolved_at: row.get(14)?,
        })
    }

    /// Decode into the domain warning
    pub fn into_warning(self) -> Result<ConsistencyWarning> {
        let severity: Severity = self
            .severity
            .parse()
            .map_err(|e: String| corrupt_row(TABLE, &self.id, e))?;
        let status: WarningStatus = self
            .status
            .parse()
            .map_err(|e: String| corrupt_row(TABLE, &self.id, e))?;
        let created_at =
            parse_time(&self.created_at).map_err(|e| corrupt_row(TABLE, &self.id, e))?;
        let resolved_at = self
            .resolved_at
            .as_deref()
            .map(parse_time)
            .transpose()
            .map_err(|e| corrupt_row(TABLE, &self.id, e))?;

        Ok(ConsistencyWarning {
            id: self.id,
            project_id: self.project_id,
            entity_id: self.entity_id,
            entity_type: EntityType::from(self.entity_type),
            entity_name: self.entity_name,
            warning_type: WarningType::from(self.warning_type),
            severity,
            description: self.description,
            suggestion: self.suggestion,
            expected_value: self.expected_value,
            actual_value: self.actual_value,
            status,
            resolution: self.resolution,
            created_at,
            resolved_at,
        })
    }
}

/// SQLite repository for consistency warnings
pub struct WarningRepo;

impl WarningRepo {
    /// Persist a new warning.
    ///
    /// # Errors
    ///
    /// - `ERR_INVALID_INPUT` unless the warning is PENDING with no resolution
    /// - `ERR_ALREADY_EXISTS` if the id is taken
    pub fn insert(conn: &Connection, warning: ConsistencyWarning) -> Result<ConsistencyWarning> {
        validate_new_warning(&warning)?;
        conn.execute(
            "INSERT INTO consistency_warnings (
                id, project_id, entity_id, entity_type, entity_name, warning_type,
                severity, description, suggestion, expected_value, actual_value,
                status, resolution, created_at, resolved_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            rusqlite::params![
                warning.id,
                warning.project_id,
                warning.entity_id,
                warning.entity_type.as_str(),
                warning.entity_name,
                warning.warning_type.as_str(),
                warning.severity.as_str(),
                warning.description,
                warning.suggestion,
                warning.expected_value,
                warning.actual_value,
                warning.status.as_str(),
                warning.resolution,
                sql_time(&warning.created_at),
                warning.resolved_at.as_ref().map(sql_time),
            ],
        )
        .map_err(|e| {
            if is_constraint_violation(&e) {
                StoryXError::WarningAlreadyExists {
                    warning_id: warning.id.clone(),
                }
                .into()
            } else {
                from_rusqlite(e)
            }
        })?;

        tracing::debug!(
            warning_id = %warning.id,
            severity = %warning.severity,
            "persisted warning"
        );
        Ok(warning)
    }

    /// Classify a detector finding and persist it as PENDING.
    ///
    /// # Errors
    ///
    /// Same as [`Self::insert`].
    pub fn ingest(
        conn: &Connection,
        project_id: &str,
        finding: RawFinding,
    ) -> Result<ConsistencyWarning> {
        Self::insert(conn, ConsistencyWarning::from_finding(project_id, finding))
    }

    /// # Errors
    ///
    /// `ERR_NOT_FOUND` if the project has no warning with this id.
    pub fn get(conn: &Connection, project_id: &str, warning_id: &str) -> Result<ConsistencyWarning> {
        fetch(conn, project_id, warning_id)?.ok_or_else(|| {
            StoryXError::WarningNotFound {
                warning_id: warning_id.to_string(),
            }
            .into()
        })
    }

    /// PENDING warnings per severity
    pub fn counts(conn: &Connection, project_id: &str) -> Result<WarningCounts> {
        let mut stmt = conn
            .prepare(
                "SELECT severity, COUNT(*) FROM consistency_warnings
                 WHERE project_id = ?1 AND status = 'PENDING'
                 GROUP BY severity",
            )
            .map_err(from_rusqlite)?;
        let rows = stmt
            .query_map([project_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })
            .map_err(from_rusqlite)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(from_rusqlite)?;

        let mut counts = WarningCounts::default();
        for (severity, n) in rows {
            let severity: Severity = severity
                .parse()
                .map_err(|e: String| corrupt_row(TABLE, "<count>", e))?;
            let n = usize::try_from(n).map_err(|e| corrupt_row(TABLE, "<count>", e))?;
            counts.add_many(severity, n);
        }
        Ok(counts)
    }

    /// Matching warnings ordered ERROR, WARNING, INFO, then by creation
    pub fn list(
        conn: &Connection,
        project_id: &str,
        filter: &WarningFilter,
    ) -> Result<Vec<ConsistencyWarning>> {
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM consistency_warnings
                 WHERE project_id = ?1
                   AND (?2 IS NULL OR severity = ?2)
                   AND (?3 IS NULL OR entity_id = ?3)
                   AND (?4 IS NULL OR status = ?4)
                 ORDER BY CASE severity WHEN 'ERROR' THEN 0 WHEN 'WARNING' THEN 1 ELSE 2 END,
                          created_at, seq",
                COLUMNS
            ))
            .map_err(from_rusqlite)?;
        let rows = stmt
            .query_map(
                rusqlite::params![
                    project_id,
                    filter.severity.map(|s| s.as_str()),
                    filter.entity_id.as_deref(),
                    filter.status.map(|s| s.as_str()),
                ],
                WarningRow::from_row,
            )
            .map_err(from_rusqlite)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(from_rusqlite)?;
        rows.into_iter().map(WarningRow::into_warning).collect()
    }

    /// Matching warnings split into non-empty severity sections
    pub fn grouped(
        conn: &Connection,
        project_id: &str,
        filter: &WarningFilter,
    ) -> Result<Vec<WarningGroup>> {
        Ok(group_by_severity(Self::list(conn, project_id, filter)?))
    }

    /// PENDING → RESOLVED with `note`, or the default note when absent.
    ///
    /// # Errors
    ///
    /// `ERR_NOT_FOUND` for an unknown id, `ERR_ALREADY_TERMINAL` if the
    /// warning already left PENDING.
    pub fn resolve(
        conn: &mut Connection,
        project_id: &str,
        warning_id: &str,
        note: Option<&str>,
    ) -> Result<ConsistencyWarning> {
        Self::transition(conn, project_id, warning_id, |w| w.resolve(note))
    }

    /// PENDING → DISMISSED.
    ///
    /// # Errors
    ///
    /// `ERR_NOT_FOUND` for an unknown id, `ERR_ALREADY_TERMINAL` if the
    /// warning already left PENDING.
    pub fn dismiss(
        conn: &mut Connection,
        project_id: &str,
        warning_id: &str,
    ) -> Result<ConsistencyWarning> {
        Self::transition(conn, project_id, warning_id, |w| w.dismiss())
    }

    fn transition(
        conn: &mut Connection,
        project_id: &str,
        warning_id: &str,
        apply: impl FnOnce(&mut ConsistencyWarning) -> storyx_core::Result<()>,
    ) -> Result<ConsistencyWarning> {
        let tx = begin_immediate(conn)?;
        let mut warning = Self::get(&tx, project_id, warning_id)?;
        apply(&mut warning)?;

        let updated = tx
            .execute(
                "UPDATE consistency_warnings
                 SET status = ?1, resolution = ?2, resolved_at = ?3
                 WHERE project_id = ?4 AND id = ?5 AND status = 'PENDING'",
                rusqlite::params![
                    warning.status.as_str(),
                    warning.resolution,
                    warning.resolved_at.as_ref().map(sql_time),
                    project_id,
                    warning_id,
                ],
            )
            .map_err(from_rusqlite)?;
        if updated == 0 {
            let current = Self::get(&tx, project_id, warning_id)?;
            return Err(StoryXError::AlreadyTerminal {
                warning_id: warning_id.to_string(),
                status: current.status.to_string(),
            }
            .into());
        }
        tx.commit().map_err(from_rusqlite)?;

        tracing::debug!(warning_id, status = %warning.status, "warning transitioned");
        Ok(warning)
    }

    /// Remove every warning about `entity_id`. Returns how many were removed.
    pub fn delete_entity(conn: &Connection, project_id: &str, entity_id: &str) -> Result<usize> {
        conn.execute(
            "DELETE FROM consistency_warnings WHERE project_id = ?1 AND entity_id = ?2",
            [project_id, entity_id],
        )
        .map_err(from_rusqlite)
    }

    /// Remove every warning of the project. Returns how many were removed.
    pub fn delete_project(conn: &Connection, project_id: &str) -> Result<usize> {
        conn.execute(
            "DELETE FROM consistency_warnings WHERE project_id = ?1",
            [project_id],
        )
        .map_err(from_rusqlite)
    }
}

fn fetch(conn: &Connection, project_id: &str, warning_id: &str) -> Result<Option<ConsistencyWarning>> {
    conn.query_row(
        &format!(
            "SELECT {} FROM consistency_warnings WHERE project_id = ?1 AND id = ?2",
            COLUMNS
        ),
        [project_id, warning_id],
        WarningRow::from_row,
    )
    .optional()
    .map_err(from_rusqlite)?
    .map(WarningRow::into_warning)
    .transpose()
}
