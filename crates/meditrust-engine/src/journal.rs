//! Durable record of every engine mutation.

use std::sync::{Arc, Mutex, PoisonError};

use rusqlite::Connection;

use meditrust_db::queries::{blocks, identities, requests};
use meditrust_db::{with_transaction, DbError};
use meditrust_types::{AccessRequest, Block, Identity, RoleChange};

/// Persistence hook invoked before each in-memory commit.
///
/// Implementations must be all-or-nothing per call: an `Err` means nothing
/// was written.
pub trait Journal: Send + Sync {
    fn record_identity(&self, identity: &Identity) -> Result<(), DbError>;

    fn record_conversion(&self, changed: &[Identity], changes: &[RoleChange])
        -> Result<(), DbError>;

    fn record_block(&self, block: &Block) -> Result<(), DbError>;

    /// Insert a request or store its new status, signatures and consumption.
    fn record_request(&self, request: &AccessRequest) -> Result<(), DbError>;
}

/// Keeps nothing. For ephemeral engines and tests.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullJournal;

impl Journal for NullJournal {
    fn record_identity(&self, _identity: &Identity) -> Result<(), DbError> {
        Ok(())
    }

    fn record_conversion(
        &self,
        _changed: &[Identity],
        _changes: &[RoleChange],
    ) -> Result<(), DbError> {
        Ok(())
    }

    fn record_block(&self, _block: &Block) -> Result<(), DbError> {
        Ok(())
    }

    fn record_request(&self, _request: &AccessRequest) -> Result<(), DbError> {
        Ok(())
    }
}

/// Writes each mutation in its own SQLite transaction.
#[derive(Clone, Debug)]
pub struct SqliteJournal {
    db: Arc<Mutex<Connection>>,
}

impl SqliteJournal {
    pub fn new(db: Arc<Mutex<Connection>>) -> Self {
        Self { db }
    }

    /// The shared connection.
    pub fn db(&self) -> &Arc<Mutex<Connection>> {
        &self.db
    }

    fn write<F>(&self, f: F) -> Result<(), DbError>
    where
        F: FnOnce(&rusqlite::Transaction<'_>) -> Result<(), DbError>,
    {
        let mut conn = self.db.lock().unwrap_or_else(PoisonError::into_inner);
        with_transaction(&mut conn, f)
    }
}

impl Journal for SqliteJournal {
    fn record_identity(&self, identity: &Identity) -> Result<(), DbError> {
        self.write(|tx| identities::insert(tx, identity))
    }

    fn record_conversion(
        &self,
        changed: &[Identity],
        changes: &[RoleChange],
    ) -> Result<(), DbError> {
        self.write(|tx| {
            for identity in changed {
                identities::update_role(tx, &identity.address, identity.role)?;
            }
            for change in changes {
                identities::insert_role_change(tx, change)?;
            }
            Ok(())
        })
    }

    fn record_block(&self, block: &Block) -> Result<(), DbError> {
        self.write(|tx| blocks::insert(tx, block))
    }

    fn record_request(&self, request: &AccessRequest) -> Result<(), DbError> {
        self.write(|tx| requests::upsert(tx, request))
    }
}
