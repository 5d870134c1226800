//! Database connection management
//!
//! Provides utilities for opening and managing SQLite connections

#![allow(clippy::result_large_err)]

use crate::errors::{from_rusqlite, Result};
use crate::migrations::apply_migrations;
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::path::Path;
use std::time::Duration;

/// How long a writer waits for another connection's write lock
pub const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Open a SQLite database at the given path
pub fn open<P: AsRef<Path>>(path: P) -> Result<Connection> {
    Connection::open(path).map_err(from_rusqlite)
}

/// Open an in-memory SQLite database (for testing)
pub fn open_in_memory() -> Result<Connection> {
    Connection::open_in_memory().map_err(from_rusqlite)
}

/// Configure a connection with WAL journaling and a busy timeout
pub fn configure(conn: &Connection) -> Result<()> {
    conn.busy_timeout(BUSY_TIMEOUT).map_err(from_rusqlite)?;
    conn.pragma_update(None, "foreign_keys", "ON")
        .map_err(from_rusqlite)?;
    // journal_mode answers with the resulting mode; in-memory databases stay "memory"
    let mode: String = conn
        .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))
        .map_err(from_rusqlite)?;
    tracing::debug!(journal_mode = %mode, "configured connection");
    Ok(())
}

/// Open, configure and migrate the database at `path`
pub fn open_and_migrate<P: AsRef<Path>>(path: P) -> Result<Connection> {
    let mut conn = open(path)?;
    configure(&conn)?;
    apply_migrations(&mut conn)?;
    Ok(conn)
}

/// Migrated in-memory database
pub fn open_in_memory_migrated() -> Result<Connection> {
    let mut conn = open_in_memory()?;
    apply_migrations(&mut conn)?;
    Ok(conn)
}

/// Begin a transaction that takes the write lock up front, so reads made
/// inside it cannot go stale before its writes
pub fn begin_immediate(conn: &mut Connection) -> Result<Transaction<'_>> {
    conn.transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(from_rusqlite)
}
