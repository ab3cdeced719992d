//! # payrail-signer
//!
//! secp256k1 transaction signing for the EVM payout adapter.

pub mod signer;

pub use signer::{public_key_to_address, LocalSigner, Signature, Signer, SignerError};
