//! Error handling for storyx-store
//!
//! Wraps storyx-core ExError with store-specific helpers

use storyx_core::errors::{ExError, ExErrorKind};

/// Result type alias using ExError
pub type Result<T> = std::result::Result<T, ExError>;

/// Create a migration error
pub fn migration_error(migration_id: &str, reason: &str) -> ExError {
    ExError::new(ExErrorKind::Persistence)
        .with_op("migration")
        .with_message(format!("Migration {} failed: {}", migration_id, reason))
}

/// Create a checksum mismatch error for an already applied migration
pub fn checksum_mismatch(migration_id: &str, expected: &str, actual: &str) -> ExError {
    ExError::new(ExErrorKind::Internal)
        .with_op("migration_checksum")
        .with_message(format!(
            "Checksum mismatch for migration {}: expected {}, got {}",
            migration_id, expected, actual
        ))
}

/// The database records a migration this build does not ship
pub fn unknown_migration(migration_id: &str) -> ExError {
    ExError::new(ExErrorKind::Internal)
        .with_op("migration")
        .with_message(format!(
            "Database has migration {} which this build does not know; refusing to run against a newer schema",
            migration_id
        ))
}

/// Create a database error from rusqlite::Error.
///
/// A lock still held by another connection once the busy timeout runs out
/// maps to `Concurrency`; everything else is `Persistence`.
pub fn from_rusqlite(err: rusqlite::Error) -> ExError {
    let kind = match &err {
        rusqlite::Error::SqliteFailure(e, _)
            if matches!(
                e.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ) =>
        {
            ExErrorKind::Concurrency
        }
        _ => ExErrorKind::Persistence,
    };
    ExError::new(kind)
        .with_op("sqlite")
        .with_message(err.to_string())
}

/// Create a serialization error for a JSON column
pub fn serialization_error(op: &str, err: serde_json::Error) -> ExError {
    ExError::new(ExErrorKind::Serialization)
        .with_op(op.to_string())
        .with_message(err.to_string())
}

/// A stored row that no longer decodes into a domain value
pub fn corrupt_row(table: &str, id: &str, reason: impl std::fmt::Display) -> ExError {
    ExError::new(ExErrorKind::Serialization)
        .with_op("decode_row")
        .with_message(format!("Row {} in {} is malformed: {}", id, table, reason))
}

/// Whether `err` is a UNIQUE/CHECK constraint failure
pub fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::ffi;

    #[test]
    fn test_busy_and_locked_map_to_concurrency() {
        for code in [ffi::SQLITE_BUSY, ffi::SQLITE_LOCKED] {
            let err = from_rusqlite(rusqlite::Error::SqliteFailure(ffi::Error::new(code), None));
            assert_eq!(err.kind(), ExErrorKind::Concurrency);
            assert!(err.is_retryable());
        }
    }

    #[test]
    fn test_other_failures_map_to_persistence() {
        let err = from_rusqlite(rusqlite::Error::SqliteFailure(
            ffi::Error::new(ffi::SQLITE_CONSTRAINT),
            Some("UNIQUE constraint failed".into()),
        ));
        assert_eq!(err.kind(), ExErrorKind::Persistence);
        assert_eq!(from_rusqlite(rusqlite::Error::QueryReturnedNoRows).kind(), ExErrorKind::Persistence);
    }
}
