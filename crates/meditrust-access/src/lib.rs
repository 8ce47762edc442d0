//! # meditrust-access
//!
//! Tiered access control over ledger blocks.
//!
//! The same table governs both sides: who may write a tier and who may read
//! it. Private-tier reads by patient-bound identities are gated on an approved
//! multi-signature request, looked up through an [`classify::ApprovalOracle`]
//! only when it matters.
//!
//! ## Modules
//!
//! - [`policy`]: Per-tier read and write decisions
//! - [`classify`]: Partitioning a patient's blocks into visibility buckets

pub mod classify;
pub mod policy;

pub use classify::{classify, ApprovalOracle, Classification};
pub use policy::{can_write, read_grant, ReadGrant};

/// Error types for access control.
#[derive(Debug, thiserror::Error)]
pub enum AccessError {
    /// The patient identifier is structurally invalid.
    #[error(transparent)]
    InvalidPatientId(#[from] meditrust_types::TypesError),
}

pub type Result<T> = std::result::Result<T, AccessError>;
