//! # meditrust-registry
//!
//! Registered identities, their roles and their patient linkage.
//!
//! Authentication is possession of a private key: [`Registry::login`] derives
//! the address from caller-held key material and looks it up. No secret is
//! ever stored here.
//!
//! ## Modules
//!
//! - [`registry`]: Registration, lookup, login and role conversion

pub mod registry;

pub use registry::{Registered, Registration, Registry, Session};

/// Error types for registry operations.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("invalid role: {0}")]
    InvalidRole(String),

    #[error("role {0} requires a patient id")]
    MissingPatientId(meditrust_types::Role),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    InvalidKey(#[from] meditrust_crypto::CryptoError),

    #[error("address already registered: {0}")]
    DuplicateAddress(String),

    #[error("unknown address: {0}")]
    UnknownAddress(String),

    #[error("no identity bound to patient {0}")]
    UnknownPatient(String),

    #[error("persistence failed: {0}")]
    Persistence(String),
}

pub type Result<T> = std::result::Result<T, RegistryError>;
