//! Request ids and the signed payload encoding.
//!
//! Signers sign the 32-byte digest
//!
//! ```text
//! BLAKE3 over length-prefixed fields:
//!     "MediTrust v1 access-request" || request_id || patient_id || data_type
//! ```

use rand::rngs::OsRng;
use rand::RngCore;

use meditrust_crypto::blake3::{contexts, hash_fields};
use meditrust_types::{AccessRequest, DataType, RequestId};

/// Entropy in a request id. The id doubles as a bearer capability.
pub const REQUEST_ID_BYTES: usize = 16;

/// Fresh unguessable request id, hex encoded.
pub fn new_request_id() -> RequestId {
    let mut bytes = [0u8; REQUEST_ID_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Digest a signer signs to approve a request.
pub fn canonical_payload(request_id: &str, patient_id: &str, data_type: DataType) -> [u8; 32] {
    hash_fields(
        contexts::ACCESS_REQUEST,
        &[
            request_id.as_bytes(),
            patient_id.as_bytes(),
            data_type.as_str().as_bytes(),
        ],
    )
}

/// [`canonical_payload`] of an existing request.
pub fn request_payload(request: &AccessRequest) -> [u8; 32] {
    canonical_payload(&request.request_id, &request.patient_id, request.data_type)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_ids_are_unique_hex() {
        let a = new_request_id();
        let b = new_request_id();
        assert_eq!(a.len(), REQUEST_ID_BYTES * 2);
        assert!(a.bytes().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn test_payload_binds_every_field() {
        let base = canonical_payload("r1", "P001", DataType::Private);
        assert_eq!(base, canonical_payload("r1", "P001", DataType::Private));
        assert_ne!(base, canonical_payload("r2", "P001", DataType::Private));
        assert_ne!(base, canonical_payload("r1", "P002", DataType::Private));
        assert_ne!(base, canonical_payload("r1", "P001", DataType::Patient));
        // Field boundaries are unambiguous.
        assert_ne!(
            canonical_payload("r1P", "001", DataType::Private),
            canonical_payload("r1", "P001", DataType::Private)
        );
    }
}
