//! The chain-independent payout contract.

use async_trait::async_trait;

use crate::error::PayoutError;
use crate::types::{ChainKind, PayoutBatch, TxId};

/// Turns a batch into one signed, submitted chain transaction.
///
/// Implementations validate the whole batch before touching the network and
/// return as soon as the node acknowledges the submission; confirmation
/// tracking is left to the caller.
#[async_trait]
pub trait PayoutAdapter: Send + Sync {
    /// The chain family this adapter pays out on.
    fn chain(&self) -> ChainKind;

    /// The address of the paying account, in the chain's display format.
    fn payer(&self) -> String;

    /// Submits `batch` as a single batched transaction.
    async fn payout(&self, batch: &PayoutBatch) -> Result<TxId, PayoutError>;
}
