//! Transaction building and signing.
//!
//! Payout transactions are EIP-155 legacy transactions, RLP-encoded and
//! signed locally so the raw bytes submitted are exactly the bytes signed.

use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::sol_types::SolCall;
use sha3::{Digest, Keccak256};
use thiserror::Error;

use crate::abi::IPayout;
use payrail_signer::signer::Signer;

/// Errors from transaction operations.
#[derive(Debug, Error)]
pub enum TxError {
    #[error("signer error: {0}")]
    Signer(#[from] payrail_signer::SignerError),
}

/// Result alias for transaction operations.
pub type Result<T> = std::result::Result<T, TxError>;

/// An unsigned EIP-155 legacy transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyTx {
    pub nonce: u64,
    pub gas_price: u128,
    pub gas_limit: u64,
    /// Recipient; `None` creates a contract.
    pub to: Option<Address>,
    pub value: U256,
    pub input: Bytes,
    pub chain_id: u64,
}

/// A signed transaction ready for `eth_sendRawTransaction`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTx {
    /// RLP-encoded signed transaction.
    pub raw: Vec<u8>,
    /// keccak256 of `raw`, the transaction hash.
    pub hash: B256,
    pub nonce: u64,
}

impl LegacyTx {
    /// The EIP-155 signing hash: keccak256 of the RLP list with
    /// `chain_id, 0, 0` in the signature slots.
    pub fn signing_hash(&self) -> [u8; 32] {
        let unsigned = rlp_encode_unsigned_tx(
            self.nonce,
            self.gas_price,
            self.gas_limit,
            self.to.as_ref(),
            &self.value,
            &self.input,
            self.chain_id,
        );
        Keccak256::digest(&unsigned).into()
    }

    /// Signs the transaction with `signer`.
    pub fn sign(&self, signer: &impl Signer) -> Result<SignedTx> {
        let sig = signer.sign_hash(&self.signing_hash())?;

        // EIP-155: v = recovery_id + chain_id * 2 + 35
        let v = u64::from(sig.v - 27) + self.chain_id * 2 + 35;

        let raw = rlp_encode_signed_tx(
            self.nonce,
            self.gas_price,
            self.gas_limit,
            self.to.as_ref(),
            &self.value,
            &self.input,
            v,
            &sig.r,
            &sig.s,
        );
        let hash = B256::from(<[u8; 32]>::from(Keccak256::digest(&raw)));
        Ok(SignedTx {
            raw,
            hash,
            nonce: self.nonce,
        })
    }
}

/// Calldata for `fill(addresses, balances)`.
pub fn encode_fill(addresses: Vec<Address>, balances: Vec<U256>) -> Bytes {
    IPayout::fillCall {
        addresses,
        balances,
    }
    .abi_encode()
    .into()
}

/// Calldata for `release()`.
pub fn encode_release() -> Bytes {
    IPayout::releaseCall {}.abi_encode().into()
}

/// Calldata for `balanceOf(account)`.
pub fn encode_balance_of(account: Address) -> Bytes {
    IPayout::balanceOfCall { account }.abi_encode().into()
}

// ---- RLP encoding helpers for legacy transactions ----

fn rlp_encode_uint(value: u64) -> Vec<u8> {
    rlp_encode_be_bytes(&value.to_be_bytes())
}

fn rlp_encode_u128(value: u128) -> Vec<u8> {
    rlp_encode_be_bytes(&value.to_be_bytes())
}

fn rlp_encode_u256(value: &U256) -> Vec<u8> {
    rlp_encode_be_bytes(&value.to_be_bytes::<32>())
}

/// Encodes a big-endian unsigned integer with leading zeros stripped.
fn rlp_encode_be_bytes(bytes: &[u8]) -> Vec<u8> {
    match bytes.iter().position(|&b| b != 0) {
        Some(start) => rlp_encode_bytes(&bytes[start..]),
        None => vec![0x80],
    }
}

fn rlp_encode_bytes(data: &[u8]) -> Vec<u8> {
    if data.len() == 1 && data[0] < 0x80 {
        return data.to_vec();
    }
    let mut out = rlp_length_prefix(0x80, data.len());
    out.extend_from_slice(data);
    out
}

/// Short (< 56) or long length prefix; `offset` is 0x80 for strings and
/// 0xc0 for lists.
fn rlp_length_prefix(offset: u8, len: usize) -> Vec<u8> {
    if len < 56 {
        return vec![offset + len as u8];
    }
    let b = len.to_be_bytes();
    let start = b.iter().position(|&x| x != 0).unwrap_or(b.len() - 1);
    let len_bytes = &b[start..];
    let mut out = vec![offset + 55 + len_bytes.len() as u8];
    out.extend_from_slice(len_bytes);
    out
}

/// RLP-encode an optional address.
/// For contract creation, `to` is None and encodes as empty bytes (0x80).
fn rlp_encode_optional_address(addr: Option<&Address>) -> Vec<u8> {
    match addr {
        Some(a) => rlp_encode_bytes(a.as_slice()),
        None => vec![0x80],
    }
}

fn rlp_encode_list(items: &[Vec<u8>]) -> Vec<u8> {
    let payload: Vec<u8> = items.iter().flat_map(|i| i.iter().copied()).collect();
    let mut out = rlp_length_prefix(0xc0, payload.len());
    out.extend_from_slice(&payload);
    out
}

fn rlp_encode_unsigned_tx(
    nonce: u64,
    gas_price: u128,
    gas_limit: u64,
    to: Option<&Address>,
    value: &U256,
    data: &Bytes,
    chain_id: u64,
) -> Vec<u8> {
    let items = vec![
        rlp_encode_uint(nonce),
        rlp_encode_u128(gas_price),
        rlp_encode_uint(gas_limit),
        rlp_encode_optional_address(to),
        rlp_encode_u256(value),
        rlp_encode_bytes(data),
        rlp_encode_uint(chain_id),
        rlp_encode_uint(0),
        rlp_encode_uint(0),
    ];
    rlp_encode_list(&items)
}

#[allow(clippy::too_many_arguments)]
fn rlp_encode_signed_tx(
    nonce: u64,
    gas_price: u128,
    gas_limit: u64,
    to: Option<&Address>,
    value: &U256,
    data: &Bytes,
    v: u64,
    r: &[u8; 32],
    s: &[u8; 32],
) -> Vec<u8> {
    let items = vec![
        rlp_encode_uint(nonce),
        rlp_encode_u128(gas_price),
        rlp_encode_uint(gas_limit),
        rlp_encode_optional_address(to),
        rlp_encode_u256(value),
        rlp_encode_bytes(data),
        rlp_encode_uint(v),
        rlp_encode_be_bytes(r),
        rlp_encode_be_bytes(s),
    ];
    rlp_encode_list(&items)
}
