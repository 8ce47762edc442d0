//! Ledger blocks and the read-side views built from them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_with::serde_as;

use crate::{Address, BlockHash, PatientId, TypesError, SECONDS_PER_YEAR};

/// Classification tier of a block.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessLevel {
    Public,
    Private,
    Patient,
}

impl AccessLevel {
    pub const ALL: [AccessLevel; 3] = [AccessLevel::Public, AccessLevel::Private, AccessLevel::Patient];

    /// Wire name, also the string fed into the block hash.
    pub const fn as_str(self) -> &'static str {
        match self {
            AccessLevel::Public => "public",
            AccessLevel::Private => "private",
            AccessLevel::Patient => "patient",
        }
    }
}

impl fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccessLevel {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "public" => Ok(AccessLevel::Public),
            "private" => Ok(AccessLevel::Private),
            "patient" => Ok(AccessLevel::Patient),
            _ => Err(TypesError::InvalidAccessLevel(s.to_string())),
        }
    }
}

/// One immutable, hash-linked unit of ledger data.
///
/// Every field except `hash` is covered by `hash`. Expiry is never stored as
/// state; see [`Block::is_expired`].
#[serde_as]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub index: u64,
    pub timestamp: u64,
    /// Subject of the record. Empty for genesis.
    pub patient_id: PatientId,
    pub data: serde_json::Value,
    pub access_level: AccessLevel,
    pub created_by: Address,
    pub created_by_name: String,
    pub expiry_date: u64,
    #[serde_as(as = "serde_with::hex::Hex")]
    pub prev_hash: BlockHash,
    #[serde_as(as = "serde_with::hex::Hex")]
    pub hash: BlockHash,
}

impl Block {
    pub fn is_genesis(&self) -> bool {
        self.index == 0
    }

    /// A block is expired strictly after its expiry date.
    pub fn is_expired(&self, now: u64) -> bool {
        now > self.expiry_date
    }

    /// Lifetime the writer asked for, in whole years.
    pub fn lifetime_years(&self) -> u64 {
        self.expiry_date.saturating_sub(self.timestamp) / SECONDS_PER_YEAR
    }

    pub fn hash_hex(&self) -> String {
        hex::encode(self.hash)
    }
}

/// A block as handed to a reader entitled to its payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecordView {
    pub index: u64,
    pub timestamp: u64,
    pub access_level: AccessLevel,
    pub data: serde_json::Value,
    pub created_by: Address,
    pub created_by_name: String,
    pub expiry_date: u64,
    pub hash: String,
}

impl From<&Block> for RecordView {
    fn from(block: &Block) -> Self {
        Self {
            index: block.index,
            timestamp: block.timestamp,
            access_level: block.access_level,
            data: block.data.clone(),
            created_by: block.created_by.clone(),
            created_by_name: block.created_by_name.clone(),
            expiry_date: block.expiry_date,
            hash: block.hash_hex(),
        }
    }
}

/// Read-only stand-in for an expired block. Carries no payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpiredNotice {
    pub index: u64,
    pub access_level: AccessLevel,
    pub notice: String,
    pub expired_on: u64,
    pub hash: String,
}

impl From<&Block> for ExpiredNotice {
    fn from(block: &Block) -> Self {
        Self {
            index: block.index,
            access_level: block.access_level,
            notice: format!(
                "[EXPIRED - Data removed after {} years]",
                block.lifetime_years()
            ),
            expired_on: block.expiry_date,
            hash: block.hash_hex(),
        }
    }
}

/// A patient's records partitioned by what the reader may see.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PatientData {
    pub public: Vec<RecordView>,
    pub private: Vec<RecordView>,
    pub patient: Vec<RecordView>,
    pub expired: Vec<ExpiredNotice>,
}

impl PatientData {
    pub fn is_empty(&self) -> bool {
        self.public.is_empty()
            && self.private.is_empty()
            && self.patient.is_empty()
            && self.expired.is_empty()
    }

    /// Mutable bucket for a tier.
    pub fn bucket_mut(&mut self, level: AccessLevel) -> &mut Vec<RecordView> {
        match level {
            AccessLevel::Public => &mut self.public,
            AccessLevel::Private => &mut self.private,
            AccessLevel::Patient => &mut self.patient,
        }
    }
}

/// Result of a full chain audit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainReport {
    pub valid: bool,
    pub total_blocks: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_invalid_index: Option<u64>,
}
