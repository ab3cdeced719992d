//! Signing interface.
//!
//! Provides a unified trait for signing transaction hashes and a local
//! secp256k1 implementation holding a single private key.

use k256::ecdsa::{SigningKey, VerifyingKey};
use payrail_core::types::Address;
use sha3::{Digest, Keccak256};
use thiserror::Error;

/// Errors from signer operations.
///
/// Messages never include key material.
#[derive(Debug, Error)]
pub enum SignerError {
    #[error("invalid private key: {0}")]
    InvalidKey(String),
    #[error("signing failed: {0}")]
    Signing(String),
}

/// Result alias for signer operations.
pub type Result<T> = std::result::Result<T, SignerError>;

/// A recoverable secp256k1 signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signature {
    pub r: [u8; 32],
    pub s: [u8; 32],
    /// Recovery id offset by 27 (27 or 28).
    pub v: u8,
}

/// A signer bound to exactly one account.
pub trait Signer: Send + Sync {
    /// Signs a 32-byte prehashed message.
    fn sign_hash(&self, hash: &[u8; 32]) -> Result<Signature>;

    /// Returns the signer's address.
    fn address(&self) -> Address;
}

/// A signer holding a secp256k1 private key in memory.
pub struct LocalSigner {
    key: SigningKey,
    address: Address,
}

impl std::fmt::Debug for LocalSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalSigner")
            .field("address", &self.address.to_string())
            .finish()
    }
}

impl LocalSigner {
    /// Creates a signer from a k256 signing key.
    pub fn new(key: SigningKey) -> Self {
        let address = public_key_to_address(&key);
        Self { key, address }
    }

    /// Creates a signer from raw 32-byte secret key material.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != 32 {
            return Err(SignerError::InvalidKey(format!(
                "expected 32 bytes, got {}",
                bytes.len()
            )));
        }
        let key = SigningKey::from_slice(bytes)
            .map_err(|_| SignerError::InvalidKey("not a valid secp256k1 scalar".into()))?;
        Ok(Self::new(key))
    }

    /// Creates a signer from a hex-encoded key, with or without `0x`.
    pub fn from_hex(key: &str) -> Result<Self> {
        let stripped = key.trim().strip_prefix("0x").unwrap_or(key.trim());
        let bytes =
            hex::decode(stripped).map_err(|_| SignerError::InvalidKey("not valid hex".into()))?;
        Self::from_bytes(&bytes)
    }
}

impl Signer for LocalSigner {
    fn sign_hash(&self, hash: &[u8; 32]) -> Result<Signature> {
        let (sig, recid) = self
            .key
            .sign_prehash_recoverable(hash)
            .map_err(|e| SignerError::Signing(e.to_string()))?;
        let bytes = sig.to_bytes();
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[..32]);
        s.copy_from_slice(&bytes[32..]);
        Ok(Signature {
            r,
            s,
            v: recid.to_byte() + 27,
        })
    }

    fn address(&self) -> Address {
        self.address
    }
}

/// Derives an Ethereum address from a signing key.
pub fn public_key_to_address(key: &SigningKey) -> Address {
    let verifying_key = VerifyingKey::from(key);
    let pubkey_bytes = verifying_key.to_encoded_point(false);
    // Skip the 0x04 prefix byte, hash the remaining 64 bytes
    let hash = Keccak256::digest(&pubkey_bytes.as_bytes()[1..]);
    let mut addr = [0u8; 20];
    addr.copy_from_slice(&hash[12..]);
    Address(addr)
}
