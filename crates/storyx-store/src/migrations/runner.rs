//! Migration runner
//!
//! Applies migrations in order inside one transaction each. Already applied
//! migrations are skipped after their recorded checksum is compared with the
//! embedded SQL.

#![allow(clippy::result_large_err)]

use crate::errors::{checksum_mismatch, from_rusqlite, migration_error, unknown_migration, Result};
use crate::migrations::checksums::compute_checksum;
use crate::migrations::embedded::{get_migrations, Migration};
use rusqlite::Connection;

/// Apply all pending migrations to the database
pub fn apply_migrations(conn: &mut Connection) -> Result<()> {
    create_schema_version_table(conn)?;

    let migrations = get_migrations();
    let applied = applied_migrations(conn)?;

    for (migration_id, _) in &applied {
        if !migrations.iter().any(|m| m.id == migration_id) {
            return Err(unknown_migration(migration_id));
        }
    }

    for migration in migrations {
        match applied.iter().find(|(id, _)| id == migration.id) {
            Some((_, Some(recorded))) => {
                let actual = compute_checksum(migration.sql);
                if *recorded != actual {
                    return Err(checksum_mismatch(migration.id, recorded, &actual));
                }
            }
            Some((_, None)) => {}
            None => apply_migration(conn, migration)?,
        }
    }

    Ok(())
}

/// `(migration_id, checksum)` for every applied migration, in apply order
pub fn applied_migrations(conn: &Connection) -> Result<Vec<(String, Option<String>)>> {
    let mut stmt = conn
        .prepare("SELECT migration_id, checksum FROM schema_version ORDER BY id")
        .map_err(from_rusqlite)?;
    let rows = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
        .map_err(from_rusqlite)?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(from_rusqlite)?;
    Ok(rows)
}

/// Create the schema_version table if it doesn't exist
fn create_schema_version_table(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            id INTEGER PRIMARY KEY,
            migration_id TEXT NOT NULL UNIQUE,
            applied_at INTEGER NOT NULL,
            checksum TEXT
        )",
        [],
    )
    .map_err(from_rusqlite)?;

    Ok(())
}

fn apply_migration(conn: &mut Connection, migration: Migration) -> Result<()> {
    let checksum = compute_checksum(migration.sql);

    let tx = conn.transaction().map_err(from_rusqlite)?;

    tx.execute_batch(migration.sql)
        .map_err(|e| migration_error(migration.id, &e.to_string()))?;

    let now = chrono::Utc::now().timestamp();
    tx.execute(
        "INSERT INTO schema_version (migration_id, applied_at, checksum) VALUES (?, ?, ?)",
        rusqlite::params![migration.id, now, checksum],
    )
    .map_err(from_rusqlite)?;

    tx.commit().map_err(from_rusqlite)?;

    tracing::debug!(migration_id = migration.id, "applied migration");
    Ok(())
}
