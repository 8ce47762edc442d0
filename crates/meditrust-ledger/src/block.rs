//! Canonical block encoding, hashing and genesis.
//!
//! ## Block hash
//!
//! ```text
//! hash = BLAKE3 over length-prefixed fields:
//!     "MediTrust v1 block"
//!     LE64(index) || LE64(timestamp) || patient_id
//!     canonical_json(data)
//!     access_level || created_by || created_by_name
//!     LE64(expiry_date) || prev_hash
//! ```
//!
//! `canonical_json` sorts object keys at every depth and emits no whitespace,
//! so the hash does not depend on how the payload map was built.

use serde_json::Value;

use meditrust_crypto::blake3::{contexts, hash_fields};
use meditrust_types::{
    AccessLevel, Address, Block, BlockHash, GENESIS_EXPIRY_YEARS, GENESIS_PREV_HASH,
    SECONDS_PER_YEAR, SYSTEM_ADDRESS,
};

/// Fields of a block before it is sealed with its hash.
#[derive(Clone, Debug)]
pub struct UnsealedBlock {
    pub index: u64,
    pub timestamp: u64,
    pub patient_id: String,
    pub data: Value,
    pub access_level: AccessLevel,
    pub created_by: Address,
    pub created_by_name: String,
    pub expiry_date: u64,
    pub prev_hash: BlockHash,
}

impl UnsealedBlock {
    /// Compute the hash and produce the final block.
    pub fn seal(self) -> Block {
        let hash = hash_parts(
            self.index,
            self.timestamp,
            &self.patient_id,
            &self.data,
            self.access_level,
            &self.created_by,
            &self.created_by_name,
            self.expiry_date,
            &self.prev_hash,
        );
        Block {
            index: self.index,
            timestamp: self.timestamp,
            patient_id: self.patient_id,
            data: self.data,
            access_level: self.access_level,
            created_by: self.created_by,
            created_by_name: self.created_by_name,
            expiry_date: self.expiry_date,
            prev_hash: self.prev_hash,
            hash,
        }
    }
}

/// Recompute a block's hash from its stored fields, ignoring `block.hash`.
pub fn compute_hash(block: &Block) -> BlockHash {
    hash_parts(
        block.index,
        block.timestamp,
        &block.patient_id,
        &block.data,
        block.access_level,
        &block.created_by,
        &block.created_by_name,
        block.expiry_date,
        &block.prev_hash,
    )
}

#[allow(clippy::too_many_arguments)]
fn hash_parts(
    index: u64,
    timestamp: u64,
    patient_id: &str,
    data: &Value,
    access_level: AccessLevel,
    created_by: &str,
    created_by_name: &str,
    expiry_date: u64,
    prev_hash: &BlockHash,
) -> BlockHash {
    let data = canonical_json(data);
    hash_fields(
        contexts::BLOCK_HASH,
        &[
            index.to_le_bytes().as_slice(),
            timestamp.to_le_bytes().as_slice(),
            patient_id.as_bytes(),
            data.as_slice(),
            access_level.as_str().as_bytes(),
            created_by.as_bytes(),
            created_by_name.as_bytes(),
            expiry_date.to_le_bytes().as_slice(),
            prev_hash.as_slice(),
        ],
    )
}

/// Whether the stored hash matches the recomputed one.
pub fn hash_matches(block: &Block) -> bool {
    compute_hash(block) == block.hash
}

/// Deterministic JSON encoding: sorted keys, no insignificant whitespace.
pub fn canonical_json(value: &Value) -> Vec<u8> {
    let mut out = Vec::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_canonical(item, out);
            }
            out.push(b']');
        }
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push(b'{');
            for (i, (key, item)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                out.extend_from_slice(Value::String(key.clone()).to_string().as_bytes());
                out.push(b':');
                write_canonical(item, out);
            }
            out.push(b'}');
        }
        scalar => out.extend_from_slice(scalar.to_string().as_bytes()),
    }
}

/// The first block of every chain.
pub fn genesis(timestamp: u64) -> Block {
    UnsealedBlock {
        index: 0,
        timestamp,
        patient_id: String::new(),
        data: serde_json::json!({ "message": "Genesis Block - Medical Records System" }),
        access_level: AccessLevel::Public,
        created_by: SYSTEM_ADDRESS.to_string(),
        created_by_name: SYSTEM_ADDRESS.to_string(),
        expiry_date: timestamp + u64::from(GENESIS_EXPIRY_YEARS) * SECONDS_PER_YEAR,
        prev_hash: GENESIS_PREV_HASH,
    }
    .seal()
}
