//! # payrail-evm
//!
//! EVM payout adapter: batches payouts into one `fill` call against the
//! payout splitter contract, signs it locally, and broadcasts it.
//!
//! ## Modules
//!
//! - [`abi`]: payout contract ABI using alloy's `sol!` macro, revert decoding
//! - [`rpc`]: JSON-RPC seam ([`EvmRpc`]) and its alloy-backed client
//! - [`tx`]: EIP-155 legacy transaction encoding and signing
//! - [`payout`]: the payout adapter
//! - [`events`]: `PaymentReleased` queries and cancellable subscriptions

pub mod abi;
pub mod events;
pub mod payout;
pub mod rpc;
pub mod tx;

// Re-export key types for convenience.
pub use abi::PayoutRevert;
pub use events::{EventCursor, PaymentReleasedEvent, PaymentReleasedSubscription};
pub use payout::{encode_fill, EvmPayoutAdapter, EvmPayoutError};
pub use rpc::{EvmClient, EvmRpc, LogStream, RpcError};
pub use tx::{LegacyTx, SignedTx, TxError};

// Re-export alloy primitives used in the public API.
pub use alloy::primitives::{Address, B256, U256};
