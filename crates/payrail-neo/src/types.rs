//! NEO N3 identifiers: script hashes, addresses and transaction hashes.
//!
//! Hashes are held in serialization (little-endian) order and displayed
//! reversed with a `0x` prefix, the way nodes and explorers print them.

use std::fmt;
use std::str::FromStr;

use ripemd::Ripemd160;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Address version byte for N3.
pub const ADDRESS_VERSION: u8 = 0x35;

/// Errors from parsing identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("invalid base58check encoding: {0}")]
    Base58(String),
    #[error("expected {expected} payload bytes, got {actual}")]
    Length { expected: usize, actual: usize },
    #[error("unexpected address version 0x{0:02x}")]
    Version(u8),
    #[error("invalid hex: {0}")]
    Hex(String),
}

/// SHA-256 of `data`.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// RIPEMD-160 of SHA-256 of `data`.
pub fn hash160(data: &[u8]) -> [u8; 20] {
    Ripemd160::digest(Sha256::digest(data)).into()
}

/// A 20-byte account or contract identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ScriptHash(pub [u8; 20]);

impl ScriptHash {
    /// Hash of a verification or deployment script.
    pub fn from_script(script: &[u8]) -> Self {
        Self(hash160(script))
    }

    /// Decodes a base58check N3 address.
    pub fn from_address(address: &str) -> Result<Self, AddressError> {
        let payload = bs58::decode(address)
            .with_check(None)
            .into_vec()
            .map_err(|e| AddressError::Base58(e.to_string()))?;
        if payload.len() != 21 {
            return Err(AddressError::Length {
                expected: 21,
                actual: payload.len(),
            });
        }
        if payload[0] != ADDRESS_VERSION {
            return Err(AddressError::Version(payload[0]));
        }
        let mut hash = [0u8; 20];
        hash.copy_from_slice(&payload[1..]);
        Ok(Self(hash))
    }

    /// Encodes the hash as a base58check N3 address.
    pub fn to_address(&self) -> String {
        let mut payload = Vec::with_capacity(21);
        payload.push(ADDRESS_VERSION);
        payload.extend_from_slice(&self.0);
        bs58::encode(payload).with_check().into_string()
    }

    /// Raw bytes in serialization order.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Unprefixed hex in serialization order, the form neo-go tooling
    /// writes into configuration files.
    pub fn to_le_string(&self) -> String {
        hex::encode(self.0)
    }
}

impl FromStr for ScriptHash {
    type Err = AddressError;

    /// Parses `0x`-prefixed hex in display order, or unprefixed hex in
    /// serialization order.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.strip_prefix("0x") {
            Some(display) => {
                let mut hash: [u8; 20] = parse_hex(display)?;
                hash.reverse();
                Ok(Self(hash))
            }
            None => Ok(Self(parse_hex(s)?)),
        }
    }
}

impl fmt::Display for ScriptHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_reversed_hex(f, &self.0)
    }
}

impl fmt::Debug for ScriptHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ScriptHash({self})")
    }
}

/// A transaction hash: SHA-256 of the unsigned transaction.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TxHash(pub [u8; 32]);

impl FromStr for TxHash {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let mut hash: [u8; 32] = parse_hex(s.strip_prefix("0x").unwrap_or(s))?;
        hash.reverse();
        Ok(Self(hash))
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_reversed_hex(f, &self.0)
    }
}

impl fmt::Debug for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxHash({self})")
    }
}

fn parse_hex<const N: usize>(s: &str) -> Result<[u8; N], AddressError> {
    let bytes = hex::decode(s).map_err(|e| AddressError::Hex(e.to_string()))?;
    bytes.try_into().map_err(|b: Vec<u8>| AddressError::Length {
        expected: N,
        actual: b.len(),
    })
}

fn write_reversed_hex(f: &mut fmt::Formatter<'_>, bytes: &[u8]) -> fmt::Result {
    f.write_str("0x")?;
    for b in bytes.iter().rev() {
        write!(f, "{b:02x}")?;
    }
    Ok(())
}
