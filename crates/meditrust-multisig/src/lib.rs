//! # meditrust-multisig
//!
//! Two-party approval of access requests.
//!
//! A patient-bound identity asks for a patient's private records; the request
//! unlocks them only once both a doctor and a medical-committee member have
//! signed its canonical payload. The threshold is fixed at 2-of-2.
//!
//! ```text
//!            both roles signed
//! Pending ─────────────────────▶ Approved
//!    │
//!    │ ttl elapsed
//!    ▼
//! Expired
//! ```
//!
//! ## Modules
//!
//! - [`payload`]: Request ids and the signed payload encoding
//! - [`workflow`]: The request store and its state machine

pub mod payload;
pub mod workflow;

pub use workflow::{SignOutcome, Workflow};

/// Error types for the approval workflow.
#[derive(Debug, thiserror::Error)]
pub enum MultisigError {
    #[error("access request not found: {0}")]
    NotFound(String),

    #[error("access request expired: {0}")]
    Expired(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("{0} has already signed this request")]
    DuplicateSignature(meditrust_types::Role),

    #[error("signature does not verify against the signer's key")]
    InvalidSignature,

    #[error(transparent)]
    InvalidPatientId(#[from] meditrust_types::TypesError),

    #[error(transparent)]
    InvalidKey(#[from] meditrust_crypto::CryptoError),

    #[error("persistence failed: {0}")]
    Persistence(String),
}

pub type Result<T> = std::result::Result<T, MultisigError>;
