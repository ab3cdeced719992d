//! # payrail-neo
//!
//! NEO N3 payout adapter: builds a `batchPayout` invocation script, wraps it
//! in a locally signed N3 transaction, and broadcasts it. Also deploys the
//! payout contract from its NEF and manifest.
//!
//! ## Modules
//!
//! - [`types`]: script hashes, addresses, transaction hashes
//! - [`script`]: NeoVM script builder
//! - [`tx`]: N3 transaction layout and serialization
//! - [`signer`]: secp256r1 account signer
//! - [`nef`]: NEF and manifest loading, contract hash derivation
//! - [`rpc`]: JSON-RPC seam ([`NeoRpc`]) and its jsonrpsee-backed client
//! - [`adapter`]: the payout adapter

pub mod adapter;
pub mod nef;
pub mod rpc;
pub mod script;
pub mod signer;
pub mod tx;
pub mod types;

pub use adapter::{batch_payout_script, NeoPayoutAdapter, NeoPayoutError};
pub use nef::{contract_hash, ArtifactError, DeployArtifacts, Manifest, NefError, NefFile};
pub use rpc::{ContractState, InvokeResult, NeoClient, NeoRpc, NeoRpcError, VersionInfo};
pub use signer::{NeoSigner, NeoSignerError};
pub use tx::{Transaction, Witness, WitnessScope};
pub use types::{AddressError, ScriptHash, TxHash};
