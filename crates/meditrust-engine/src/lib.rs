//! # meditrust-engine
//!
//! One instance of each ledger component behind a single facade.
//!
//! The [`Engine`] owns the [`Registry`](meditrust_registry::Registry), the
//! [`Ledger`](meditrust_ledger::Ledger) and the
//! [`Workflow`](meditrust_multisig::Workflow), a [`Clock`] and a [`Journal`].
//! Every mutating operation hands the journal its change inside the
//! component's critical section, before memory is touched, so a failed write
//! leaves the engine exactly as it was.

pub mod clock;
pub mod config;
pub mod engine;
pub mod journal;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::EngineConfig;
pub use engine::{Engine, ExpiryScan, HealthRecord, NodeStatus, SignCredential};
pub use journal::{Journal, NullJournal, SqliteJournal};

use meditrust_access::AccessError;
use meditrust_db::DbError;
use meditrust_ledger::LedgerError;
use meditrust_multisig::MultisigError;
use meditrust_registry::RegistryError;

/// Engine error types.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Multisig(#[from] MultisigError),

    #[error(transparent)]
    Access(#[from] AccessError),

    #[error("storage error: {0}")]
    Storage(#[from] DbError),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// Coarse error classes exposed to clients.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    Unauthorized,
    NotFound,
    Duplicate,
    Expired,
    InvalidSignature,
    Integrity,
    Storage,
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Registry(e) => match e {
                RegistryError::InvalidRole(_)
                | RegistryError::MissingPatientId(_)
                | RegistryError::InvalidInput(_)
                | RegistryError::InvalidKey(_) => ErrorKind::InvalidInput,
                RegistryError::DuplicateAddress(_) => ErrorKind::Duplicate,
                RegistryError::UnknownAddress(_) | RegistryError::UnknownPatient(_) => {
                    ErrorKind::NotFound
                }
                RegistryError::Persistence(_) => ErrorKind::Storage,
            },
            EngineError::Ledger(e) => match e {
                LedgerError::Unauthorized { .. } => ErrorKind::Unauthorized,
                LedgerError::InvalidExpiry(_)
                | LedgerError::InvalidPatientId(_)
                | LedgerError::InvalidPayload(_) => ErrorKind::InvalidInput,
                LedgerError::IntegrityViolation { .. } | LedgerError::EmptyChain => {
                    ErrorKind::Integrity
                }
                LedgerError::Persistence(_) => ErrorKind::Storage,
            },
            EngineError::Multisig(e) => match e {
                MultisigError::NotFound(_) => ErrorKind::NotFound,
                MultisigError::Expired(_) => ErrorKind::Expired,
                MultisigError::Unauthorized(_) => ErrorKind::Unauthorized,
                MultisigError::DuplicateSignature(_) => ErrorKind::Duplicate,
                MultisigError::InvalidSignature => ErrorKind::InvalidSignature,
                MultisigError::InvalidPatientId(_) | MultisigError::InvalidKey(_) => {
                    ErrorKind::InvalidInput
                }
                MultisigError::Persistence(_) => ErrorKind::Storage,
            },
            EngineError::Access(AccessError::InvalidPatientId(_)) => ErrorKind::InvalidInput,
            EngineError::Storage(_) => ErrorKind::Storage,
            EngineError::InvalidInput(_) => ErrorKind::InvalidInput,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meditrust_types::Role;

    #[test]
    fn test_error_kinds() {
        let err = EngineError::from(RegistryError::UnknownAddress("mt00".into()));
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = EngineError::from(MultisigError::DuplicateSignature(Role::Doctor));
        assert_eq!(err.kind(), ErrorKind::Duplicate);

        let err = EngineError::from(LedgerError::IntegrityViolation { index: 3 });
        assert_eq!(err.kind(), ErrorKind::Integrity);

        let err = EngineError::from(DbError::NotFound("block 9".into()));
        assert_eq!(err.kind(), ErrorKind::Storage);
    }

    #[test]
    fn test_errors_display_inner_message() {
        let err = EngineError::from(MultisigError::InvalidSignature);
        assert_eq!(err.to_string(), MultisigError::InvalidSignature.to_string());
    }
}
