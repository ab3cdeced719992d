//! The EVM payout adapter.
//!
//! Turns a [`PayoutBatch`] into a single `fill(address[], uint256[])` call on
//! the payout splitter, with `value` equal to the batch total, signed by the
//! configured owner account.

use std::str::FromStr;
use std::time::{Duration, Instant};

use alloy::network::TransactionBuilder;
use alloy::primitives::{Address, Bytes, U256};
use alloy::rpc::types::TransactionRequest;
use alloy::sol_types::SolCall;
use async_trait::async_trait;
use num_bigint::BigUint;
use thiserror::Error;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info};

use payrail_core::config::EvmConfig;
use payrail_core::{
    Amount, ChainKind, DeployOutcome, PayoutAdapter, PayoutBatch, PayoutError, TxId,
    ValidationError,
};
use payrail_signer::{LocalSigner, Signer, SignerError};

use crate::abi::{self, IPayout, PayoutRevert};
use crate::rpc::{core_address_to_alloy, EvmClient, EvmRpc, RpcError};
use crate::tx::{self, LegacyTx, SignedTx, TxError};

/// Integer width of contract amounts.
const UINT_BITS: u32 = 256;

/// How long the node may lag behind our own nonce before we assume the
/// transaction was dropped and follow the node again.
pub const DEFAULT_NONCE_RESYNC: Duration = Duration::from_secs(120);

/// Errors from EVM payout operations.
#[derive(Debug, Error)]
pub enum EvmPayoutError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("RPC transport error: {0}")]
    Transport(String),
    #[error("node rejected transaction: {0}")]
    Rejected(String),
    #[error("payout contract reverted: {0}")]
    Reverted(PayoutRevert),
    #[error("signing error: {0}")]
    Signing(String),
    #[error("encoding error: {0}")]
    Encoding(String),
}

/// Result alias for EVM payout operations.
pub type Result<T> = std::result::Result<T, EvmPayoutError>;

impl From<RpcError> for EvmPayoutError {
    fn from(err: RpcError) -> Self {
        match err {
            RpcError::Transport(msg) => Self::Transport(msg),
            RpcError::Rejected(msg) => Self::Rejected(msg),
            RpcError::Reverted { message, data } => {
                let data: Option<&[u8]> = data.as_ref().map(|d| d.as_ref());
                Self::Reverted(PayoutRevert::decode(data, &message))
            }
            RpcError::UrlParse(reason) => Self::Validation(ValidationError::MalformedConfig {
                field: "evm.rpc_url",
                reason,
            }),
        }
    }
}

impl From<TxError> for EvmPayoutError {
    fn from(err: TxError) -> Self {
        Self::Signing(err.to_string())
    }
}

impl From<SignerError> for EvmPayoutError {
    fn from(err: SignerError) -> Self {
        Self::Signing(err.to_string())
    }
}

impl From<EvmPayoutError> for PayoutError {
    fn from(err: EvmPayoutError) -> Self {
        match err {
            EvmPayoutError::Validation(e) => PayoutError::Validation(e),
            EvmPayoutError::Transport(msg) => PayoutError::Transport(msg),
            EvmPayoutError::Rejected(msg) => PayoutError::Rejected(msg),
            EvmPayoutError::Reverted(revert) => PayoutError::Rejected(revert.to_string()),
            EvmPayoutError::Signing(msg) => PayoutError::Signing(msg),
            EvmPayoutError::Encoding(msg) => PayoutError::Encoding(msg),
        }
    }
}

/// Payout adapter bound to one owner account and one payout contract.
///
/// Submissions from the same adapter are serialized so that concurrent
/// payouts never reuse a nonce.
pub struct EvmPayoutAdapter<R = EvmClient, S = LocalSigner> {
    pub(crate) rpc: R,
    signer: S,
    pub(crate) contract: Address,
    chain_id: OnceCell<u64>,
    last_sent: Mutex<Option<LastSent>>,
    nonce_resync: Duration,
}

/// Last nonce this adapter submitted.
#[derive(Debug, Clone, Copy)]
struct LastSent {
    nonce: u64,
    at: Instant,
}

impl LastSent {
    /// Next nonce given the node's pending count.
    ///
    /// A pending count that has not moved past `nonce` within `resync` means
    /// the node lost the transaction, so its count wins again.
    fn next(&self, pending: u64, resync: Duration) -> u64 {
        if pending > self.nonce || self.at.elapsed() >= resync {
            pending
        } else {
            self.nonce + 1
        }
    }
}

impl<R, S: Signer> std::fmt::Debug for EvmPayoutAdapter<R, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvmPayoutAdapter")
            .field("sender", &self.signer.address().to_string())
            .field("contract", &self.contract)
            .finish()
    }
}

impl EvmPayoutAdapter<EvmClient, LocalSigner> {
    /// Builds an adapter from configuration.
    ///
    /// Fails without touching the network when the URL, key or contract
    /// address is missing or malformed.
    pub fn connect(config: &EvmConfig) -> Result<Self> {
        let signer = LocalSigner::from_hex(config.private_key.expose())?;
        let contract = config
            .contract
            .as_deref()
            .ok_or(ValidationError::MissingConfig("evm.contract"))?;
        let contract =
            Address::from_str(contract).map_err(|e| ValidationError::MalformedConfig {
                field: "evm.contract",
                reason: e.to_string(),
            })?;
        let rpc = EvmClient::new(&config.rpc_url)?;
        Ok(Self::new(rpc, signer, contract))
    }
}

impl<R: EvmRpc, S: Signer> EvmPayoutAdapter<R, S> {
    /// Creates an adapter over an existing client and signer.
    pub fn new(rpc: R, signer: S, contract: Address) -> Self {
        Self {
            rpc,
            signer,
            contract,
            chain_id: OnceCell::new(),
            last_sent: Mutex::new(None),
            nonce_resync: DEFAULT_NONCE_RESYNC,
        }
    }

    /// Overrides how long a locally tracked nonce may run ahead of the node.
    pub fn with_nonce_resync(mut self, after: Duration) -> Self {
        self.nonce_resync = after;
        self
    }

    /// Deploys a fresh payout contract owned by `signer` and returns an
    /// adapter bound to it.
    pub async fn deploy(rpc: R, signer: S) -> Result<(Self, DeployOutcome)> {
        let code = abi::creation_code().map_err(|e| EvmPayoutError::Encoding(e.to_string()))?;
        let mut adapter = Self::new(rpc, signer, Address::ZERO);
        let signed = adapter.submit(None, U256::ZERO, code.into()).await?;

        adapter.contract = adapter.sender().create(signed.nonce);
        let outcome = DeployOutcome {
            tx_id: tx_id(&signed),
            contract: format!("{:#x}", adapter.contract),
        };
        info!(
            contract = %outcome.contract,
            tx = %outcome.tx_id,
            "payout contract deployed"
        );
        Ok((adapter, outcome))
    }

    /// The payout contract this adapter calls.
    pub fn contract(&self) -> Address {
        self.contract
    }

    /// The owner account that signs payouts.
    pub fn sender(&self) -> Address {
        core_address_to_alloy(&self.signer.address())
    }

    /// Submits one `fill` transaction paying every recipient in `batch`.
    pub async fn payout(&self, batch: &PayoutBatch) -> Result<TxId> {
        let (input, value) = encode_fill(batch)?;
        let signed = self.submit(Some(self.contract), value, input).await?;
        let id = tx_id(&signed);
        info!(
            tx = %id,
            recipients = batch.len(),
            total = %value,
            nonce = signed.nonce,
            "payout submitted"
        );
        Ok(id)
    }

    /// Amount currently owed to `account` by the contract.
    pub async fn balance_of(&self, account: &str) -> Result<Amount> {
        let account =
            Address::from_str(account.trim()).map_err(|e| ValidationError::InvalidAccount {
                address: account.to_string(),
                reason: e.to_string(),
            })?;
        let req = TransactionRequest::default()
            .to(self.contract)
            .input(tx::encode_balance_of(account).into());
        let out = self.rpc.call(&req).await?;
        let balance = <IPayout::balanceOfCall as SolCall>::abi_decode_returns(&out)
            .map_err(|e| EvmPayoutError::Encoding(e.to_string()))?;
        Ok(BigUint::from_bytes_be(&balance.to_be_bytes::<32>()))
    }

    /// Withdraws the sender's own balance from the contract.
    pub async fn release(&self) -> Result<TxId> {
        let signed = self
            .submit(Some(self.contract), U256::ZERO, tx::encode_release())
            .await?;
        let id = tx_id(&signed);
        info!(tx = %id, "release submitted");
        Ok(id)
    }

    async fn chain_id(&self) -> Result<u64> {
        let id = self
            .chain_id
            .get_or_try_init(|| async { self.rpc.chain_id().await })
            .await?;
        Ok(*id)
    }

    /// Nonce, gas, estimate, sign and send under the per-account lock.
    ///
    /// A revert is caught by the estimate, so nothing is signed or sent for
    /// a call the contract would reject.
    async fn submit(&self, to: Option<Address>, value: U256, input: Bytes) -> Result<SignedTx> {
        let chain_id = self.chain_id().await?;
        let from = self.sender();

        let mut last_sent = self.last_sent.lock().await;
        let pending = self.rpc.transaction_count(from).await?;
        let nonce = match *last_sent {
            Some(last) => last.next(pending, self.nonce_resync),
            None => pending,
        };
        let gas_price = self.rpc.gas_price().await?;

        let mut req = TransactionRequest::default()
            .from(from)
            .value(value)
            .nonce(nonce)
            .gas_price(gas_price);
        req = match to {
            Some(to) => req.to(to).input(input.clone().into()),
            None => req.with_deploy_code(input.clone()),
        };
        let gas_limit = self.rpc.estimate_gas(&req).await?;
        debug!(nonce, gas_price, gas_limit, "estimated transaction");

        let signed = LegacyTx {
            nonce,
            gas_price,
            gas_limit,
            to,
            value,
            input,
            chain_id,
        }
        .sign(&self.signer)?;

        self.rpc.send_raw_transaction(&signed.raw).await?;
        *last_sent = Some(LastSent {
            nonce,
            at: Instant::now(),
        });
        Ok(signed)
    }
}

#[async_trait]
impl<R: EvmRpc, S: Signer> PayoutAdapter for EvmPayoutAdapter<R, S> {
    fn chain(&self) -> ChainKind {
        ChainKind::Evm
    }

    fn payer(&self) -> String {
        self.signer.address().to_string()
    }

    async fn payout(&self, batch: &PayoutBatch) -> std::result::Result<TxId, PayoutError> {
        Ok(EvmPayoutAdapter::payout(self, batch).await?)
    }
}

/// Encodes `fill` calldata for `batch` and returns it with the total value.
///
/// Validates every recipient and amount before anything is encoded.
pub fn encode_fill(batch: &PayoutBatch) -> std::result::Result<(Bytes, U256), ValidationError> {
    let mut addresses = Vec::with_capacity(batch.len());
    let mut balances = Vec::with_capacity(batch.len());
    let mut total = U256::ZERO;

    for (index, entry) in batch.entries().iter().enumerate() {
        let amount = to_u256(index, &entry.amount)?;
        total = total
            .checked_add(amount)
            .ok_or(ValidationError::TotalOutOfRange { bits: UINT_BITS })?;
        addresses.push(parse_recipient(index, &entry.recipient)?);
        balances.push(amount);
    }

    Ok((tx::encode_fill(addresses, balances), total))
}

fn parse_recipient(index: usize, recipient: &str) -> std::result::Result<Address, ValidationError> {
    Address::from_str(recipient.trim()).map_err(|e| ValidationError::InvalidAddress {
        index,
        address: recipient.to_string(),
        reason: e.to_string(),
    })
}

fn to_u256(index: usize, amount: &Amount) -> std::result::Result<U256, ValidationError> {
    U256::try_from_be_slice(&amount.to_bytes_be()).ok_or(ValidationError::AmountOutOfRange {
        index,
        bits: UINT_BITS,
    })
}

fn tx_id(signed: &SignedTx) -> TxId {
    TxId::new(format!("{:#x}", signed.hash))
}
