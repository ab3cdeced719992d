//! JSON-RPC seam for the EVM adapter.
//!
//! [`EvmRpc`] is the narrow set of node calls the payout adapter needs.
//! [`EvmClient`] implements it over an alloy HTTP provider; tests substitute
//! their own implementation.

use std::collections::VecDeque;
use std::time::Duration;

use alloy::network::Ethereum;
use alloy::primitives::{Address, Bytes, B256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::{Filter, Log, TransactionRequest};
use alloy::transports::TransportError;
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use thiserror::Error;

/// Errors from node calls.
#[derive(Debug, Clone, Error)]
pub enum RpcError {
    #[error("RPC transport error: {0}")]
    Transport(String),
    #[error("node rejected request: {0}")]
    Rejected(String),
    #[error("execution reverted: {message}")]
    Reverted {
        message: String,
        data: Option<Bytes>,
    },
    #[error("URL parse error: {0}")]
    UrlParse(String),
}

/// Result alias for node calls.
pub type Result<T> = std::result::Result<T, RpcError>;

/// A live stream of logs. Dropping it releases the underlying subscription.
pub type LogStream = BoxStream<'static, Result<Log>>;

/// Node calls used by the payout adapter.
#[async_trait]
pub trait EvmRpc: Send + Sync {
    /// Chain ID of the connected node.
    async fn chain_id(&self) -> Result<u64>;

    /// Transaction count of `address` including pending transactions.
    async fn transaction_count(&self, address: Address) -> Result<u64>;

    /// Current legacy gas price in wei.
    async fn gas_price(&self) -> Result<u128>;

    /// Gas estimate for `tx`; a contract revert surfaces as
    /// [`RpcError::Reverted`].
    async fn estimate_gas(&self, tx: &TransactionRequest) -> Result<u64>;

    /// Executes a read-only call.
    async fn call(&self, tx: &TransactionRequest) -> Result<Bytes>;

    /// Broadcasts a signed raw transaction and returns its hash.
    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<B256>;

    /// Latest block number.
    async fn block_number(&self) -> Result<u64>;

    /// Logs matching `filter`.
    async fn get_logs(&self, filter: &Filter) -> Result<Vec<Log>>;

    /// Streams logs matching `filter` from `from_block` onwards.
    ///
    /// A transport failure is yielded once as an `Err` and ends the stream.
    async fn subscribe_logs(&self, filter: Filter, from_block: u64) -> Result<LogStream>;
}

/// Default interval between log polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// An EVM node client connected to a specific RPC endpoint.
#[derive(Clone)]
pub struct EvmClient {
    provider: DynProvider<Ethereum>,
    rpc_url: String,
    poll_interval: Duration,
}

impl std::fmt::Debug for EvmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvmClient")
            .field("rpc_url", &self.rpc_url)
            .finish()
    }
}

impl EvmClient {
    /// Creates a new client for the given RPC URL.
    pub fn new(rpc_url: &str) -> Result<Self> {
        let url: alloy::transports::http::reqwest::Url = rpc_url
            .parse()
            .map_err(|e| RpcError::UrlParse(format!("{e}")))?;

        let provider = ProviderBuilder::new().connect_http(url).erased();

        Ok(Self {
            provider,
            rpc_url: rpc_url.to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }

    /// Overrides how often [`EvmRpc::subscribe_logs`] polls for new blocks.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Returns a reference to the underlying provider.
    pub fn provider(&self) -> &DynProvider<Ethereum> {
        &self.provider
    }

    /// Returns the RPC URL.
    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }
}

/// Sorts an alloy transport error into revert, node rejection, or transport
/// failure.
fn classify(err: TransportError) -> RpcError {
    if let Some(payload) = err.as_error_resp() {
        let message = payload.message.to_string();
        if let Some(data) = payload.as_revert_data() {
            return RpcError::Reverted {
                message,
                data: Some(data),
            };
        }
        if message.contains("revert") {
            return RpcError::Reverted {
                message,
                data: None,
            };
        }
        return RpcError::Rejected(message);
    }
    RpcError::Transport(err.to_string())
}

#[async_trait]
impl EvmRpc for EvmClient {
    async fn chain_id(&self) -> Result<u64> {
        self.provider.get_chain_id().await.map_err(classify)
    }

    async fn transaction_count(&self, address: Address) -> Result<u64> {
        self.provider
            .get_transaction_count(address)
            .pending()
            .await
            .map_err(classify)
    }

    async fn gas_price(&self) -> Result<u128> {
        self.provider.get_gas_price().await.map_err(classify)
    }

    async fn estimate_gas(&self, tx: &TransactionRequest) -> Result<u64> {
        self.provider.estimate_gas(tx.clone()).await.map_err(classify)
    }

    async fn call(&self, tx: &TransactionRequest) -> Result<Bytes> {
        self.provider.call(tx.clone()).await.map_err(classify)
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<B256> {
        let pending = self
            .provider
            .send_raw_transaction(raw)
            .await
            .map_err(classify)?;
        Ok(*pending.tx_hash())
    }

    async fn block_number(&self) -> Result<u64> {
        self.provider.get_block_number().await.map_err(classify)
    }

    async fn get_logs(&self, filter: &Filter) -> Result<Vec<Log>> {
        self.provider.get_logs(filter).await.map_err(classify)
    }

    async fn subscribe_logs(&self, filter: Filter, from_block: u64) -> Result<LogStream> {
        let state = PollState {
            provider: self.provider.clone(),
            filter,
            next_block: from_block,
            buffered: VecDeque::new(),
            interval: self.poll_interval,
            failed: false,
        };
        Ok(stream::unfold(state, poll_next_log).boxed())
    }
}

/// Block-range cursor over `eth_getLogs`.
struct PollState {
    provider: DynProvider<Ethereum>,
    filter: Filter,
    next_block: u64,
    buffered: VecDeque<Log>,
    interval: Duration,
    failed: bool,
}

async fn poll_next_log(mut st: PollState) -> Option<(Result<Log>, PollState)> {
    if st.failed {
        return None;
    }
    loop {
        if let Some(log) = st.buffered.pop_front() {
            return Some((Ok(log), st));
        }

        let head = match st.provider.get_block_number().await {
            Ok(head) => head,
            Err(e) => {
                st.failed = true;
                return Some((Err(classify(e)), st));
            }
        };

        if head >= st.next_block {
            let range = st.filter.clone().from_block(st.next_block).to_block(head);
            match st.provider.get_logs(&range).await {
                Ok(logs) => {
                    st.buffered.extend(logs);
                    st.next_block = head + 1;
                }
                Err(e) => {
                    st.failed = true;
                    return Some((Err(classify(e)), st));
                }
            }
        }

        if st.buffered.is_empty() {
            tokio::time::sleep(st.interval).await;
        }
    }
}

/// Convert a `payrail_core::types::Address` to an alloy `Address`.
pub fn core_address_to_alloy(addr: &payrail_core::types::Address) -> Address {
    Address::from(addr.0)
}
