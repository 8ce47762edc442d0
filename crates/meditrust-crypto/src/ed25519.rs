//! Ed25519 signing and verification (RFC 8032).
//!
//! Ed25519 is the only asymmetric algorithm in MediTrust. It is used for:
//! - Identity key pairs (an address is derived from the public key)
//! - Access-request approvals by clinical signers
//!
//! This module wraps `ed25519-dalek` with MediTrust-specific types and the hex
//! encodings used on the wire.

use ed25519_dalek::Signer;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::{CryptoError, Result};

/// Length of a hex-encoded secret seed.
pub const SECRET_HEX_LEN: usize = 64;

/// Number of hash bytes kept in an address.
pub const ADDRESS_BYTES: usize = 20;

/// Prefix of every address string.
pub const ADDRESS_PREFIX: &str = "mt";

/// An Ed25519 signing key (private key).
///
/// The wrapped dalek key zeroizes its secret on drop.
pub struct SigningKey {
    inner: ed25519_dalek::SigningKey,
}

impl Clone for SigningKey {
    fn clone(&self) -> Self {
        Self {
            inner: ed25519_dalek::SigningKey::from_bytes(&self.inner.to_bytes()),
        }
    }
}

/// An Ed25519 verification key (public key).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyingKey {
    inner: ed25519_dalek::VerifyingKey,
}

/// An Ed25519 signature.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    inner: ed25519_dalek::Signature,
}

/// An Ed25519 keypair.
pub struct KeyPair {
    pub signing_key: SigningKey,
    pub verifying_key: VerifyingKey,
}

impl SigningKey {
    /// Generate a new random signing key from the OS CSPRNG.
    pub fn generate() -> Self {
        let mut csprng = rand::rngs::OsRng;
        Self {
            inner: ed25519_dalek::SigningKey::generate(&mut csprng),
        }
    }

    /// Create a signing key from raw seed bytes.
    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        Self {
            inner: ed25519_dalek::SigningKey::from_bytes(bytes),
        }
    }

    /// Parse a signing key from its 64-character hex seed.
    pub fn from_hex(secret_hex: &str) -> Result<Self> {
        let secret_hex = secret_hex.trim();
        if secret_hex.len() != SECRET_HEX_LEN {
            return Err(CryptoError::InvalidKey(format!(
                "private key must be {SECRET_HEX_LEN} hex characters, got {}",
                secret_hex.len()
            )));
        }
        let decoded = Zeroizing::new(
            hex::decode(secret_hex).map_err(|e| CryptoError::InvalidKey(e.to_string()))?,
        );
        let mut seed = Zeroizing::new([0u8; 32]);
        seed.copy_from_slice(&decoded);
        Ok(Self::from_bytes(&seed))
    }

    /// Get the raw bytes of this signing key.
    pub fn to_bytes(&self) -> [u8; 32] {
        self.inner.to_bytes()
    }

    /// Hex encoding of the seed. The returned string is wiped on drop.
    pub fn to_hex(&self) -> Zeroizing<String> {
        let bytes = Zeroizing::new(self.inner.to_bytes());
        Zeroizing::new(hex::encode(bytes.as_slice()))
    }

    /// Get the corresponding verifying key.
    pub fn verifying_key(&self) -> VerifyingKey {
        VerifyingKey {
            inner: self.inner.verifying_key(),
        }
    }

    /// Sign a message.
    pub fn sign(&self, message: &[u8]) -> Signature {
        Signature {
            inner: self.inner.sign(message),
        }
    }
}

impl VerifyingKey {
    /// Create a verifying key from raw bytes.
    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self> {
        let inner = ed25519_dalek::VerifyingKey::from_bytes(bytes)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        Ok(Self { inner })
    }

    /// Parse a verifying key from hex.
    pub fn from_hex(public_hex: &str) -> Result<Self> {
        let bytes: [u8; 32] = hex::decode(public_hex.trim())
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?
            .try_into()
            .map_err(|v: Vec<u8>| CryptoError::InvalidKeyLength {
                expected: 32,
                actual: v.len(),
            })?;
        Self::from_bytes(&bytes)
    }

    /// Get the raw bytes of this verifying key.
    pub fn to_bytes(&self) -> [u8; 32] {
        self.inner.to_bytes()
    }

    /// Get the raw bytes as a slice.
    pub fn as_bytes(&self) -> &[u8; 32] {
        self.inner.as_bytes()
    }

    /// Lowercase hex encoding.
    pub fn to_hex(&self) -> String {
        hex::encode(self.inner.as_bytes())
    }

    /// Verify a signature on a message.
    ///
    /// Uses strict verification, which rejects small-order keys and
    /// non-canonical signature encodings.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> Result<()> {
        self.inner
            .verify_strict(message, &signature.inner)
            .map_err(|_| CryptoError::SignatureVerification)
    }
}

impl Signature {
    /// Create a signature from raw bytes.
    pub fn from_bytes(bytes: &[u8; 64]) -> Self {
        Self {
            inner: ed25519_dalek::Signature::from_bytes(bytes),
        }
    }

    /// Parse a signature from hex.
    pub fn from_hex(signature_hex: &str) -> Result<Self> {
        let bytes: [u8; 64] = hex::decode(signature_hex.trim())
            .map_err(|e| CryptoError::InvalidInput(e.to_string()))?
            .try_into()
            .map_err(|v: Vec<u8>| CryptoError::InvalidKeyLength {
                expected: 64,
                actual: v.len(),
            })?;
        Ok(Self::from_bytes(&bytes))
    }

    /// Get the raw bytes of this signature.
    pub fn to_bytes(&self) -> [u8; 64] {
        self.inner.to_bytes()
    }

    /// Lowercase hex encoding.
    pub fn to_hex(&self) -> String {
        hex::encode(self.inner.to_bytes())
    }
}

impl KeyPair {
    /// Generate a new random Ed25519 keypair.
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate();
        let verifying_key = signing_key.verifying_key();
        Self {
            signing_key,
            verifying_key,
        }
    }

    /// Create a keypair from a signing key's raw bytes.
    pub fn from_bytes(secret: &[u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(secret);
        let verifying_key = signing_key.verifying_key();
        Self {
            signing_key,
            verifying_key,
        }
    }

    /// Create a keypair from a hex seed.
    pub fn from_hex(secret_hex: &str) -> Result<Self> {
        let signing_key = SigningKey::from_hex(secret_hex)?;
        let verifying_key = signing_key.verifying_key();
        Ok(Self {
            signing_key,
            verifying_key,
        })
    }

    /// The address of this keypair's public key.
    pub fn address(&self) -> String {
        derive_address(&self.verifying_key)
    }
}

/// Derive an address from a public key.
///
/// `address = "mt" || hex(BLAKE3::derive_key("MediTrust v1 address", public_key)[:20])`
pub fn derive_address(public_key: &VerifyingKey) -> String {
    let digest = crate::blake3::derive_key(crate::blake3::contexts::ADDRESS, public_key.as_bytes());
    format!("{ADDRESS_PREFIX}{}", hex::encode(&digest[..ADDRESS_BYTES]))
}

/// Check that a string has the shape of an address.
pub fn is_valid_address(address: &str) -> bool {
    address
        .strip_prefix(ADDRESS_PREFIX)
        .map(|rest| {
            rest.len() == ADDRESS_BYTES * 2 && rest.bytes().all(|b| b.is_ascii_hexdigit())
        })
        .unwrap_or(false)
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKey")
            .field("public", &self.verifying_key())
            .finish()
    }
}
