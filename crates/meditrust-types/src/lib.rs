//! # meditrust-types
//!
//! Shared domain types used across the MediTrust workspace: identities and
//! roles, ledger blocks and the views handed to readers, access requests, and
//! node events.

pub mod access;
pub mod events;
pub mod identity;
pub mod record;

pub use access::{AccessRequest, ApprovalPolicy, DataType, RequestStatus, SignatureEntry};
pub use events::{Event, EventType};
pub use identity::{
    Capabilities, Identity, Profile, Role, RoleChange, RoleGroup, UserListing, UserSummary,
};
pub use record::{AccessLevel, Block, ChainReport, ExpiredNotice, PatientData, RecordView};

/// Common type aliases.
pub type Address = String;
pub type BlockHash = [u8; 32];
pub type RequestId = String;
pub type PatientId = String;

/// Seconds in a day.
pub const SECONDS_PER_DAY: u64 = 86_400;

/// Seconds in one expiry year (365 days, no leap adjustment).
pub const SECONDS_PER_YEAR: u64 = 365 * SECONDS_PER_DAY;

/// Record lifetime when the writer does not specify one.
pub const DEFAULT_EXPIRY_YEARS: u32 = 5;

/// Shortest record lifetime a writer may request.
pub const MIN_EXPIRY_YEARS: u32 = 1;

/// Longest record lifetime a writer may request.
pub const MAX_EXPIRY_YEARS: u32 = 30;

/// Lifetime of the genesis block.
pub const GENESIS_EXPIRY_YEARS: u32 = 100;

/// `prev_hash` of the genesis block.
pub const GENESIS_PREV_HASH: BlockHash = [0u8; 32];

/// Address recorded as the creator of the genesis block.
pub const SYSTEM_ADDRESS: &str = "SYSTEM";

/// Maximum length of a patient identifier.
pub const MAX_PATIENT_ID_LEN: usize = 64;

/// Errors raised while parsing or validating domain values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TypesError {
    #[error("invalid role: {0}")]
    InvalidRole(String),

    #[error("invalid access level: {0}")]
    InvalidAccessLevel(String),

    #[error("invalid data type: {0}")]
    InvalidDataType(String),

    #[error("invalid patient id: {0:?}")]
    InvalidPatientId(String),

    #[error("invalid request status: {0}")]
    InvalidStatus(String),

    #[error("invalid approval policy: {0}")]
    InvalidPolicy(String),
}

/// Check that a patient identifier is structurally valid.
///
/// 1 to 64 characters from `[A-Za-z0-9_-]`.
pub fn validate_patient_id(patient_id: &str) -> Result<(), TypesError> {
    let ok = !patient_id.is_empty()
        && patient_id.len() <= MAX_PATIENT_ID_LEN
        && patient_id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-');
    if ok {
        Ok(())
    } else {
        Err(TypesError::InvalidPatientId(patient_id.to_string()))
    }
}

/// Current unix time in seconds.
pub fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
