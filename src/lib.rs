//! # payrail
//!
//! Batched payout orchestration over two chains: an EVM payout contract and a
//! NEO `batchPayout` contract, behind one [`PayoutAdapter`] contract.
//!
//! The member crates are re-exported here so callers can depend on a single
//! package.

pub use payrail_core as core;
pub use payrail_evm as evm;
pub use payrail_neo as neo;
pub use payrail_signer as signer;

pub use payrail_core::{ChainKind, PayoutAdapter, PayoutBatch, PayoutError, TxId};

/// Returns the library version string.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
