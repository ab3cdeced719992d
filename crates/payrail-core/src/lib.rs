//! # payrail-core
//!
//! Chain-independent pieces shared by the payout adapters: the batch and
//! result types, the error taxonomy, the [`PayoutAdapter`] contract, and the
//! YAML configuration surface.

pub mod adapter;
pub mod config;
pub mod error;
pub mod types;

pub use adapter::PayoutAdapter;
pub use error::{ErrorKind, PayoutError, ValidationError};
pub use types::{Address, Amount, ChainKind, DeployOutcome, PayoutBatch, PayoutEntry, TxId};
