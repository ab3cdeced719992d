//! secp256r1 account signer imported from WIF.

use p256::ecdsa::signature::Signer as _;
use p256::ecdsa::{Signature, SigningKey};
use thiserror::Error;

use crate::script::verification_script;
use crate::tx::{Transaction, Witness};
use crate::types::ScriptHash;

const WIF_VERSION: u8 = 0x80;
const WIF_COMPRESSED: u8 = 0x01;

/// Errors from NEO signer operations.
///
/// Messages never include key material.
#[derive(Debug, Error)]
pub enum NeoSignerError {
    #[error("invalid private key: {0}")]
    InvalidKey(String),
}

/// Result alias for signer operations.
pub type Result<T> = std::result::Result<T, NeoSignerError>;

/// A single-signature N3 account.
pub struct NeoSigner {
    key: SigningKey,
    public_key: [u8; 33],
    script_hash: ScriptHash,
}

impl std::fmt::Debug for NeoSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NeoSigner")
            .field("address", &self.address())
            .finish()
    }
}

impl NeoSigner {
    /// Creates a signer from raw 32-byte secret key material.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != 32 {
            return Err(NeoSignerError::InvalidKey(format!(
                "expected 32 bytes, got {}",
                bytes.len()
            )));
        }
        let key = SigningKey::from_slice(bytes)
            .map_err(|_| NeoSignerError::InvalidKey("not a valid secp256r1 scalar".into()))?;

        let point = key.verifying_key().to_encoded_point(true);
        let public_key: [u8; 33] = point
            .as_bytes()
            .try_into()
            .map_err(|_| NeoSignerError::InvalidKey("unexpected public key length".into()))?;
        let script_hash = ScriptHash::from_script(&verification_script(&public_key));

        Ok(Self {
            key,
            public_key,
            script_hash,
        })
    }

    /// Imports a compressed-key WIF string.
    pub fn from_wif(wif: &str) -> Result<Self> {
        let payload = bs58::decode(wif.trim())
            .with_check(None)
            .into_vec()
            .map_err(|_| NeoSignerError::InvalidKey("not valid base58check".into()))?;
        if payload.len() != 34 || payload[0] != WIF_VERSION || payload[33] != WIF_COMPRESSED {
            return Err(NeoSignerError::InvalidKey("not a compressed-key WIF".into()));
        }
        Self::from_bytes(&payload[1..33])
    }

    /// Compressed public key.
    pub fn public_key(&self) -> &[u8; 33] {
        &self.public_key
    }

    /// Account script hash.
    pub fn script_hash(&self) -> ScriptHash {
        self.script_hash
    }

    pub fn address(&self) -> String {
        self.script_hash.to_address()
    }

    pub fn verification_script(&self) -> Vec<u8> {
        verification_script(&self.public_key)
    }

    /// ECDSA-SHA256 signature over `data`, as 64 bytes `r || s`.
    pub fn sign(&self, data: &[u8]) -> [u8; 64] {
        let sig: Signature = self.key.sign(data);
        let mut out = [0u8; 64];
        out.copy_from_slice(&sig.to_bytes());
        out
    }

    /// Witness for `tx` on the network identified by `network_magic`.
    pub fn witness(&self, tx: &Transaction, network_magic: u32) -> Witness {
        let signature = self.sign(&tx.sign_data(network_magic));
        let mut invocation = Vec::with_capacity(66);
        invocation.push(crate::script::opcode::PUSHDATA1);
        invocation.push(64);
        invocation.extend_from_slice(&signature);
        Witness {
            invocation,
            verification: self.verification_script(),
        }
    }
}
