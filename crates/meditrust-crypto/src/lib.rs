//! # meditrust-crypto
//!
//! Cryptographic primitives for the MediTrust ledger.
//!
//! The suite is fixed: Ed25519 for identities and approvals, BLAKE3 for block
//! hashes and address derivation. No algorithm negotiation is permitted.
//!
//! ## Modules
//!
//! - [`blake3`]: Domain-separated BLAKE3 hashing
//! - [`ed25519`]: Ed25519 signing and verification (RFC 8032), addresses
//! - [`keys`]: Hex-level key management operations

pub mod blake3;
pub mod ed25519;
pub mod keys;

/// Error types for cryptographic operations.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// Ed25519 signature verification failed.
    #[error("signature verification failed")]
    SignatureVerification,

    /// Key material is not a valid key encoding.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// Invalid key length.
    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    /// Invalid input data.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

pub type Result<T> = std::result::Result<T, CryptoError>;
