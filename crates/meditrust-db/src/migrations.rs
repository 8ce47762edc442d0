//! Forward-only schema migrations.
//!
//! The schema version lives in `PRAGMA user_version`. Each step runs in its
//! own transaction together with the version bump, so a crash mid-upgrade
//! leaves the database at the last completed version.

use rusqlite::Connection;

use crate::{schema, DbError, Result, SCHEMA_VERSION};

/// Ordered upgrade steps. Entry `n` takes the database to version `n + 1`.
const STEPS: [&str; SCHEMA_VERSION as usize] = [schema::SCHEMA_V1, schema::SCHEMA_V2];

fn user_version(conn: &Connection) -> Result<u32> {
    Ok(conn.pragma_query_value(None, "user_version", |row| row.get(0))?)
}

/// Bring the database up to [`SCHEMA_VERSION`].
pub fn run(conn: &Connection) -> Result<()> {
    let current = user_version(conn)?;
    if current > SCHEMA_VERSION {
        return Err(DbError::Migration(format!(
            "database version {current} is newer than supported {SCHEMA_VERSION}"
        )));
    }

    for (step, sql) in STEPS.iter().enumerate().skip(current as usize) {
        let version = step as u32 + 1;
        tracing::info!(version, "applying schema migration");
        let tx = conn.unchecked_transaction()?;
        tx.execute_batch(sql)
            .map_err(|e| DbError::Migration(format!("v{version}: {e}")))?;
        tx.pragma_update(None, "user_version", version)?;
        tx.commit()?;
    }

    Ok(())
}
