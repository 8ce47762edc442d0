//! # meditrust-ledger
//!
//! Append-only, hash-linked record chain.
//!
//! Every block commits to its predecessor's hash, so editing any stored field
//! of any block breaks that block's hash and every link after it. Integrity is
//! only ever established by recomputation; no validity flag is cached.
//!
//! ## Modules
//!
//! - [`block`]: Canonical block encoding, hashing and genesis
//! - [`chain`]: The serialized chain, appends and audits

pub mod block;
pub mod chain;

pub use chain::{Ledger, NewRecord};

/// Error types for ledger operations.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// The creator's role may not write at the requested tier.
    #[error("{role} may not write {level} records for patient {patient_id}")]
    Unauthorized {
        role: meditrust_types::Role,
        level: meditrust_types::AccessLevel,
        patient_id: String,
    },

    /// Requested lifetime outside the accepted range.
    #[error("expiry of {0} years is outside {min}..={max}", min = meditrust_types::MIN_EXPIRY_YEARS, max = meditrust_types::MAX_EXPIRY_YEARS)]
    InvalidExpiry(u32),

    /// The record subject is malformed.
    #[error(transparent)]
    InvalidPatientId(#[from] meditrust_types::TypesError),

    /// The payload could not be encoded.
    #[error("invalid record payload: {0}")]
    InvalidPayload(String),

    /// An audit found a broken hash or link.
    #[error("chain integrity violation at block {index}")]
    IntegrityViolation { index: u64 },

    /// A restored chain has no genesis block.
    #[error("chain is empty")]
    EmptyChain,

    /// The persistence hook refused the append.
    #[error("persistence failed: {0}")]
    Persistence(String),
}

pub type Result<T> = std::result::Result<T, LedgerError>;
