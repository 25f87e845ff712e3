//! SQL schema and migration setup for the SQLite backends.
//!
//! Each logical domain lives in its own database file with its own migration
//! list. `rusqlite_migration` tracks applied migrations via SQLite's
//! `user_version` pragma; migration SQL is embedded at compile time via
//! `include_str!`.

use std::path::Path;
use std::time::Duration;

use rusqlite::Connection;
use rusqlite_migration::{Migrations, M};

use crate::error::StorageError;

/// How long a connection waits on another connection's write lock.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Which schema a database file carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaKind {
    /// Named JSON blobs (preferences, LLM registry, workspace associations).
    Blobs,
    /// The normalized conversation aggregate.
    Conversations,
    /// Usage event log and aggregates.
    Usage,
}

/// Schema migrations for `kind`, applied in order via `user_version` tracking.
fn migrations(kind: SchemaKind) -> Migrations<'static> {
    match kind {
        SchemaKind::Blobs => Migrations::new(vec![M::up(include_str!(
            "migrations/blobs/001_initial_schema.sql"
        ))]),
        SchemaKind::Conversations => Migrations::new(vec![
            M::up(include_str!("migrations/chats/001_initial_schema.sql")),
            M::up(include_str!("migrations/chats/002_store_meta.sql")),
        ]),
        SchemaKind::Usage => Migrations::new(vec![M::up(include_str!(
            "migrations/usage/001_initial_schema.sql"
        ))]),
    }
}

/// Opens (or creates) a SQLite database at `path` with WAL mode, foreign keys,
/// and all pending migrations for `kind` applied. Missing parent directories
/// are created.
pub fn open_database(path: impl AsRef<Path>, kind: SchemaKind) -> Result<Connection, StorageError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let mut conn = Connection::open(path)?;
    configure_and_migrate(&mut conn, kind)?;
    Ok(conn)
}

/// Opens an in-memory SQLite database with the schema for `kind`.
pub fn open_in_memory(kind: SchemaKind) -> Result<Connection, StorageError> {
    let mut conn = Connection::open_in_memory()?;
    configure_and_migrate(&mut conn, kind)?;
    Ok(conn)
}

/// Configures pragmas and applies pending migrations.
fn configure_and_migrate(conn: &mut Connection, kind: SchemaKind) -> Result<(), StorageError> {
    // Set first: switching to WAL takes a lock other connections may hold.
    conn.busy_timeout(BUSY_TIMEOUT)?;
    // WAL: concurrent readers with a single writer.
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    // Cascading deletes depend on this; SQLite ships with it off.
    conn.pragma_update(None, "foreign_keys", "ON")?;

    migrations(kind)
        .to_latest(conn)
        .map_err(|e| StorageError::Migration(e.to_string()))?;

    Ok(())
}
