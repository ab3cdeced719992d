//! In-memory node used by the adapter tests.

#![allow(dead_code)]

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use alloy::consensus::{TxEnvelope, TxLegacy};
use alloy::eips::eip2718::Decodable2718;
use alloy::primitives::{keccak256, Address, Bytes, LogData, B256, U256};
use alloy::rpc::types::{Filter, Log, TransactionRequest};
use alloy::sol_types::SolEvent;
use async_trait::async_trait;
use futures::channel::mpsc;
use futures::stream::{self, Stream, StreamExt};
use payrail_evm::abi::IPayout;
use payrail_evm::{EvmRpc, LogStream, RpcError};

/// Anvil's first development account.
pub const OWNER_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
pub const CHAIN_ID: u64 = 31337;
pub const X: &str = "0x70997970c51812dc3a010c7d01b50e0d17dc79c8";
pub const Y: &str = "0x3c44cdddb6a900fa2b585dd299e03d12fa4293bc";

#[derive(Default)]
struct State {
    calls: Mutex<Vec<&'static str>>,
    pending_nonce: Mutex<u64>,
    nonce_delay: Mutex<Duration>,
    revert: Mutex<Option<RpcError>>,
    estimates: Mutex<Vec<TransactionRequest>>,
    sent: Mutex<Vec<Vec<u8>>>,
    call_result: Mutex<Bytes>,
    logs: Mutex<Vec<Log>>,
    stream_items: Mutex<Vec<Result<Log, RpcError>>>,
    stream_stays_open: AtomicBool,
    live_feed: Mutex<Option<mpsc::UnboundedReceiver<Result<Log, RpcError>>>>,
    subscribed_from: Mutex<Option<u64>>,
    stream_released: Arc<AtomicBool>,
}

/// A scripted [`EvmRpc`] that records every call.
#[derive(Clone, Default)]
pub struct MockRpc {
    state: Arc<State>,
}

impl MockRpc {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, method: &'static str) {
        self.state.calls.lock().unwrap().push(method);
    }

    /// Every method invoked so far, in order.
    pub fn calls(&self) -> Vec<&'static str> {
        self.state.calls.lock().unwrap().clone()
    }

    pub fn count(&self, method: &str) -> usize {
        self.calls().iter().filter(|m| **m == method).count()
    }

    pub fn set_pending_nonce(&self, nonce: u64) {
        *self.state.pending_nonce.lock().unwrap() = nonce;
    }

    /// Delays every nonce lookup, widening the window for races.
    pub fn set_nonce_delay(&self, delay: Duration) {
        *self.state.nonce_delay.lock().unwrap() = delay;
    }

    /// Makes gas estimation fail with `err`.
    pub fn fail_estimate_with(&self, err: RpcError) {
        *self.state.revert.lock().unwrap() = Some(err);
    }

    pub fn clear_estimate_failure(&self) {
        *self.state.revert.lock().unwrap() = None;
    }

    pub fn set_call_result(&self, out: Bytes) {
        *self.state.call_result.lock().unwrap() = out;
    }

    pub fn set_logs(&self, logs: Vec<Log>) {
        *self.state.logs.lock().unwrap() = logs;
    }

    /// Items the next subscription yields; with `stays_open` the stream
    /// then idles instead of ending.
    pub fn set_stream(&self, items: Vec<Result<Log, RpcError>>, stays_open: bool) {
        *self.state.stream_items.lock().unwrap() = items;
        self.state
            .stream_stays_open
            .store(stays_open, Ordering::SeqCst);
    }

    /// Hands the next subscription a stream fed by the returned sender,
    /// after any items from [`set_stream`](Self::set_stream).
    pub fn live_feed(&self) -> mpsc::UnboundedSender<Result<Log, RpcError>> {
        let (tx, rx) = mpsc::unbounded();
        *self.state.live_feed.lock().unwrap() = Some(rx);
        tx
    }

    pub fn subscribed_from(&self) -> Option<u64> {
        *self.state.subscribed_from.lock().unwrap()
    }

    /// Whether the stream handed out by `subscribe_logs` has been dropped.
    pub fn stream_released(&self) -> bool {
        self.state.stream_released.load(Ordering::SeqCst)
    }

    pub fn estimates(&self) -> Vec<TransactionRequest> {
        self.state.estimates.lock().unwrap().clone()
    }

    /// Raw transactions passed to `send_raw_transaction`.
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.state.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl EvmRpc for MockRpc {
    async fn chain_id(&self) -> Result<u64, RpcError> {
        self.record("chain_id");
        Ok(CHAIN_ID)
    }

    async fn transaction_count(&self, _address: Address) -> Result<u64, RpcError> {
        self.record("transaction_count");
        let delay = *self.state.nonce_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(*self.state.pending_nonce.lock().unwrap())
    }

    async fn gas_price(&self) -> Result<u128, RpcError> {
        self.record("gas_price");
        Ok(1_000_000_000)
    }

    async fn estimate_gas(&self, tx: &TransactionRequest) -> Result<u64, RpcError> {
        self.record("estimate_gas");
        self.state.estimates.lock().unwrap().push(tx.clone());
        match self.state.revert.lock().unwrap().clone() {
            Some(err) => Err(err),
            None => Ok(120_000),
        }
    }

    async fn call(&self, _tx: &TransactionRequest) -> Result<Bytes, RpcError> {
        self.record("call");
        Ok(self.state.call_result.lock().unwrap().clone())
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<B256, RpcError> {
        self.record("send_raw_transaction");
        self.state.sent.lock().unwrap().push(raw.to_vec());
        Ok(keccak256(raw))
    }

    async fn block_number(&self) -> Result<u64, RpcError> {
        self.record("block_number");
        Ok(100)
    }

    async fn get_logs(&self, _filter: &Filter) -> Result<Vec<Log>, RpcError> {
        self.record("get_logs");
        Ok(self.state.logs.lock().unwrap().clone())
    }

    async fn subscribe_logs(
        &self,
        _filter: Filter,
        from_block: u64,
    ) -> Result<LogStream, RpcError> {
        self.record("subscribe_logs");
        *self.state.subscribed_from.lock().unwrap() = Some(from_block);

        let items = std::mem::take(&mut *self.state.stream_items.lock().unwrap());
        let live = self.state.live_feed.lock().unwrap().take();
        let inner = if let Some(live) = live {
            stream::iter(items).chain(live).boxed()
        } else if self.state.stream_stays_open.load(Ordering::SeqCst) {
            stream::iter(items).chain(stream::pending()).boxed()
        } else {
            stream::iter(items).boxed()
        };
        Ok(TrackedStream {
            inner,
            released: self.state.stream_released.clone(),
        }
        .boxed())
    }
}

/// Flags its own drop so tests can see the subscription was released.
struct TrackedStream {
    inner: LogStream,
    released: Arc<AtomicBool>,
}

impl Stream for TrackedStream {
    type Item = Result<Log, RpcError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

impl Drop for TrackedStream {
    fn drop(&mut self) {
        self.released.store(true, Ordering::SeqCst);
    }
}

/// A `PaymentReleased` log at the given position.
pub fn released_log(to: Address, amount: u64, block: u64, index: u64) -> Log {
    let data: LogData = IPayout::PaymentReleased {
        to,
        amount: U256::from(amount),
    }
    .encode_log_data();
    Log {
        inner: alloy::primitives::Log {
            address: Address::repeat_byte(0xcc),
            data,
        },
        block_number: Some(block),
        log_index: Some(index),
        ..Default::default()
    }
}

/// Decodes a raw signed legacy transaction.
pub fn decode_legacy(raw: &[u8]) -> TxLegacy {
    let envelope = TxEnvelope::decode_2718(&mut &raw[..]).expect("valid signed transaction");
    envelope
        .as_legacy()
        .expect("legacy transaction")
        .tx()
        .clone()
}
