//! Key management operations.
//!
//! Thin, hex-in/hex-out functions used by the registry and the signing
//! workflow. Private keys only ever arrive from the caller and are never
//! stored; the generated secret is handed back once, wrapped so that it is
//! wiped when the caller drops it.

use zeroize::Zeroizing;

use crate::ed25519::{derive_address, KeyPair, Signature, SigningKey, VerifyingKey};
use crate::Result;

/// A freshly generated key pair in its wire encodings.
pub struct GeneratedKeys {
    /// 64-character hex seed. Shown to the user exactly once.
    pub private_key_hex: Zeroizing<String>,
    pub public_key: VerifyingKey,
    pub address: String,
}

/// Public half of a key pair derived from caller-held key material.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DerivedKeys {
    pub public_key: VerifyingKey,
    pub address: String,
}

/// Generate a new key pair from the OS CSPRNG.
pub fn generate_keypair() -> GeneratedKeys {
    let kp = KeyPair::generate();
    GeneratedKeys {
        private_key_hex: kp.signing_key.to_hex(),
        address: kp.address(),
        public_key: kp.verifying_key,
    }
}

/// Derive the public key and address for a hex-encoded private key.
///
/// # Errors
///
/// [`crate::CryptoError::InvalidKey`] if the input is not a 32-byte hex seed.
pub fn derive_from_private(private_key_hex: &str) -> Result<DerivedKeys> {
    let signing_key = SigningKey::from_hex(private_key_hex)?;
    let public_key = signing_key.verifying_key();
    Ok(DerivedKeys {
        address: derive_address(&public_key),
        public_key,
    })
}

/// Sign a message with a hex-encoded private key.
pub fn sign(private_key_hex: &str, message: &[u8]) -> Result<Signature> {
    let signing_key = SigningKey::from_hex(private_key_hex)?;
    Ok(signing_key.sign(message))
}

/// Verify a signature. Any failure, including a malformed key, is `false`.
pub fn verify(public_key: &VerifyingKey, message: &[u8], signature: &Signature) -> bool {
    public_key.verify(message, signature).is_ok()
}
