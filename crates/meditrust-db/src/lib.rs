//! # meditrust-db
//!
//! Database access layer for the MediTrust node.
//! Manages the single SQLite database at `$MEDITRUST_DATA_DIR/meditrust.db`.
//!
//! ## Schema
//!
//! - WAL mode mandatory
//! - Foreign keys enforced
//! - All timestamps are Unix epoch seconds (u64)
//! - Schema version stored in `PRAGMA user_version`
//!
//! Private keys are never written here. The tables hold identities, the
//! role-change audit trail, ledger blocks, access requests and their
//! signatures.

pub mod migrations;
pub mod queries;
pub mod schema;

use rusqlite::{Connection, Transaction};
use std::path::Path;

/// Current schema version.
pub const SCHEMA_VERSION: u32 = 2;

/// File name of the database inside the data directory.
pub const DB_FILE_NAME: &str = "meditrust.db";

/// Database error types.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("migration failed: {0}")]
    Migration(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("constraint violation: {0}")]
    Constraint(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, DbError>;

/// Open or create the MediTrust database at the given path.
///
/// Configures WAL mode, foreign keys, and runs any pending migrations.
pub fn open(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)?;
    configure(&conn)?;
    migrations::run(&conn)?;
    Ok(conn)
}

/// Open an in-memory database (for testing).
pub fn open_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    configure(&conn)?;
    migrations::run(&conn)?;
    Ok(conn)
}

/// Run `f` inside one transaction. Commits on `Ok`, rolls back on `Err`.
pub fn with_transaction<T, F>(conn: &mut Connection, f: F) -> Result<T>
where
    F: FnOnce(&Transaction<'_>) -> Result<T>,
{
    let tx = conn.transaction()?;
    let value = f(&tx)?;
    tx.commit()?;
    Ok(value)
}

/// Configure SQLite pragmas.
fn configure(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;
         PRAGMA synchronous = FULL;",
    )?;
    Ok(())
}

/// Map a unique-constraint failure to [`DbError::Constraint`].
pub(crate) fn constraint(what: &str) -> impl FnOnce(rusqlite::Error) -> DbError + '_ {
    move |e| match e {
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            DbError::Constraint(what.to_string())
        }
        other => DbError::Sqlite(other),
    }
}
