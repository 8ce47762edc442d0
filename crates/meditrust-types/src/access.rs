//! Access requests for private-tier data and the approval policy.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_with::serde_as;

use crate::{Address, PatientId, RequestId, Role, TypesError};

/// Tier an access request asks to unlock.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Private,
    Patient,
}

impl DataType {
    pub const fn as_str(self) -> &'static str {
        match self {
            DataType::Private => "private",
            DataType::Patient => "patient",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataType {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "private" => Ok(DataType::Private),
            "patient" => Ok(DataType::Patient),
            _ => Err(TypesError::InvalidDataType(s.to_string())),
        }
    }
}

/// Lifecycle of an access request.
///
/// `Pending` moves to `Approved` once both signer roles have signed, or to
/// `Expired` when its time-to-live passes first. Both are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Approved,
    Expired,
}

impl RequestStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Approved => "approved",
            RequestStatus::Expired => "expired",
        }
    }

    pub const fn is_terminal(self) -> bool {
        !matches!(self, RequestStatus::Pending)
    }
}

impl FromStr for RequestStatus {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RequestStatus::Pending),
            "approved" => Ok(RequestStatus::Approved),
            "expired" => Ok(RequestStatus::Expired),
            _ => Err(TypesError::InvalidStatus(s.to_string())),
        }
    }
}

/// A verified signature occupying one role slot.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureEntry {
    pub signer_address: Address,
    #[serde_as(as = "serde_with::hex::Hex")]
    pub signature: [u8; 64],
    pub signed_at: u64,
}

/// A request to release a patient's data, gated by a 2-of-2 signature.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessRequest {
    pub request_id: RequestId,
    pub patient_id: PatientId,
    pub requester_address: Address,
    pub data_type: DataType,
    pub signatures: BTreeMap<Role, SignatureEntry>,
    pub status: RequestStatus,
    pub created_at: u64,
    pub expires_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consumed_at: Option<u64>,
}

impl AccessRequest {
    /// Roles that must sign. Fixed for every request.
    pub const fn required_roles(&self) -> &'static [Role] {
        &Role::SIGNERS
    }

    pub fn is_approved(&self) -> bool {
        self.status == RequestStatus::Approved
    }

    pub fn has_all_signatures(&self) -> bool {
        self.required_roles()
            .iter()
            .all(|role| self.signatures.contains_key(role))
    }

    /// Required roles that have not signed yet.
    pub fn missing_roles(&self) -> Vec<Role> {
        self.required_roles()
            .iter()
            .copied()
            .filter(|role| !self.signatures.contains_key(role))
            .collect()
    }

    /// Whether the time-to-live has run out. Only meaningful while pending.
    pub fn ttl_elapsed(&self, now: u64) -> bool {
        now > self.expires_at
    }
}

/// How long an approved request keeps unlocking private data.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalPolicy {
    /// Reusable for as long as the approval stands.
    #[default]
    Standing,
    /// Spent by the first read that releases private data.
    SingleUse,
}

impl FromStr for ApprovalPolicy {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "standing" => Ok(ApprovalPolicy::Standing),
            "single_use" | "single-use" => Ok(ApprovalPolicy::SingleUse),
            _ => Err(TypesError::InvalidPolicy(s.to_string())),
        }
    }
}
