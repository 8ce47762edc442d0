//! Domain-separated BLAKE3 hashing for MediTrust.
//!
//! Every digest the ledger relies on is computed over a length-prefixed field
//! list whose first field is a registered domain tag. Two different structures
//! can therefore never collide even when their raw field bytes line up.
//!
//! ## Modes
//!
//! - [`hash`]: Plain hashing
//! - [`hash_fields`]: Tagged, length-prefixed hashing: block hashes
//! - [`derive_key`]: Keyed derivation with a registered context string (addresses)

/// Registered domain tags. Using an unregistered tag is a programming error.
pub mod contexts {
    pub const BLOCK_HASH: &str = "MediTrust v1 block";
    pub const ACCESS_REQUEST: &str = "MediTrust v1 access-request";
    pub const ADDRESS: &str = "MediTrust v1 address";

    /// All registered tags. Used for validation.
    pub const ALL_CONTEXTS: &[&str] = &[BLOCK_HASH, ACCESS_REQUEST, ADDRESS];
}

/// Compute the BLAKE3 hash of the input data.
pub fn hash(data: &[u8]) -> [u8; 32] {
    *::blake3::hash(data).as_bytes()
}

/// Derive a key using BLAKE3's key derivation mode.
///
/// # Arguments
///
/// * `context` - A registered context string (see [`contexts`])
/// * `key_material` - The input key material
pub fn derive_key(context: &str, key_material: &[u8]) -> [u8; 32] {
    debug_assert!(is_registered_context(context), "unregistered context {context:?}");
    let mut hasher = ::blake3::Hasher::new_derive_key(context);
    hasher.update(key_material);
    *hasher.finalize().as_bytes()
}

/// Verify that a domain tag is registered.
pub fn is_registered_context(context: &str) -> bool {
    contexts::ALL_CONTEXTS.contains(&context)
}

/// Encode multiple dynamic fields using length-prefixed encoding.
///
/// `LE32(len(field1)) || field1 || LE32(len(field2)) || field2 || ...`
pub fn encode_multi_field(fields: &[&[u8]]) -> Vec<u8> {
    let total_len: usize = fields.iter().map(|f| 4 + f.len()).sum();
    let mut output = Vec::with_capacity(total_len);
    for field in fields {
        output.extend_from_slice(&(field.len() as u32).to_le_bytes());
        output.extend_from_slice(field);
    }
    output
}

/// Hash a tagged field list.
///
/// `BLAKE3::hash(encode_multi_field([tag, field1, field2, ...]))`
pub fn hash_fields(tag: &str, fields: &[&[u8]]) -> [u8; 32] {
    debug_assert!(is_registered_context(tag), "unregistered tag {tag:?}");
    let mut all: Vec<&[u8]> = Vec::with_capacity(fields.len() + 1);
    all.push(tag.as_bytes());
    all.extend_from_slice(fields);
    hash(&encode_multi_field(&all))
}
