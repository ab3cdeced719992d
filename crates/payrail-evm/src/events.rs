//! `PaymentReleased` event queries and subscriptions.
//!
//! Historical queries go through `eth_getLogs`; live delivery wraps the
//! RPC log stream in a [`PaymentReleasedSubscription`] that can be resumed
//! from the last delivered [`EventCursor`].

use std::pin::Pin;
use std::task::{Context, Poll};

use alloy::primitives::{Address, B256, U256};
use alloy::rpc::types::{Filter, Log};
use alloy::sol_types::SolEvent;
use futures::{Stream, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use payrail_signer::Signer;

use crate::abi::IPayout;
use crate::payout::{EvmPayoutAdapter, EvmPayoutError, Result};
use crate::rpc::{EvmRpc, LogStream};

/// Buffered events between the forwarding task and the consumer.
const CHANNEL_CAPACITY: usize = 64;

/// A decoded `PaymentReleased(to, amount)` log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentReleasedEvent {
    pub to: Address,
    pub amount: U256,
    pub block_number: u64,
    pub log_index: u64,
    pub tx_hash: Option<B256>,
}

impl PaymentReleasedEvent {
    /// Cursor positioned at this event; resuming from it skips the event.
    pub fn cursor(&self) -> EventCursor {
        EventCursor {
            block: self.block_number,
            log_index: Some(self.log_index),
        }
    }
}

/// Position in the log sequence.
///
/// With `log_index: None` delivery starts at the first log of `block`;
/// otherwise it starts right after `(block, log_index)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EventCursor {
    pub block: u64,
    pub log_index: Option<u64>,
}

impl EventCursor {
    /// Cursor that delivers everything from `block` on.
    pub fn from_block(block: u64) -> Self {
        Self {
            block,
            log_index: None,
        }
    }

    fn admits(&self, block: u64, log_index: u64) -> bool {
        match self.log_index {
            None => block >= self.block,
            Some(last) => block > self.block || (block == self.block && log_index > last),
        }
    }
}

/// Decodes a raw log into a [`PaymentReleasedEvent`].
pub fn decode_payment_released(log: &Log) -> Result<PaymentReleasedEvent> {
    let decoded = IPayout::PaymentReleased::decode_log(&log.inner)
        .map_err(|e| EvmPayoutError::Encoding(e.to_string()))?;
    Ok(PaymentReleasedEvent {
        to: decoded.data.to,
        amount: decoded.data.amount,
        block_number: log.block_number.unwrap_or_default(),
        log_index: log.log_index.unwrap_or_default(),
        tx_hash: log.transaction_hash,
    })
}

/// Log filter for `PaymentReleased` emitted by `contract`.
pub fn payment_released_filter(contract: Address) -> Filter {
    Filter::new()
        .address(contract)
        .event_signature(IPayout::PaymentReleased::SIGNATURE_HASH)
}

impl<R: EvmRpc, S: Signer> EvmPayoutAdapter<R, S> {
    /// `PaymentReleased` events between `from_block` and `to_block`
    /// (inclusive; `None` means the latest block).
    pub async fn filter_payment_released(
        &self,
        from_block: u64,
        to_block: Option<u64>,
    ) -> Result<Vec<PaymentReleasedEvent>> {
        let mut filter = payment_released_filter(self.contract).from_block(from_block);
        if let Some(to) = to_block {
            filter = filter.to_block(to);
        }
        let logs = self.rpc.get_logs(&filter).await?;
        logs.iter().map(decode_payment_released).collect()
    }

    /// Streams `PaymentReleased` events after `cursor` until cancelled.
    pub async fn watch_payment_released(
        &self,
        cursor: EventCursor,
    ) -> Result<PaymentReleasedSubscription> {
        let filter = payment_released_filter(self.contract);
        let logs = self.rpc.subscribe_logs(filter, cursor.block).await?;
        debug!(contract = %self.contract, from_block = cursor.block, "watching payment releases");
        Ok(PaymentReleasedSubscription::spawn(logs, cursor))
    }
}

/// A cancellable stream of [`PaymentReleasedEvent`]s.
///
/// An error is yielded at most once and ends the stream. Dropping the
/// subscription or calling [`cancel`](Self::cancel) releases the
/// underlying log stream.
pub struct PaymentReleasedSubscription {
    rx: mpsc::Receiver<Result<PaymentReleasedEvent>>,
    cancel: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
    cancelled: bool,
}

impl std::fmt::Debug for PaymentReleasedSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentReleasedSubscription")
            .field("cancelled", &self.cancelled)
            .finish()
    }
}

impl PaymentReleasedSubscription {
    fn spawn(logs: LogStream, cursor: EventCursor) -> Self {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let task = tokio::spawn(forward(logs, cursor, tx, cancel_rx));
        Self {
            rx,
            cancel: Some(cancel_tx),
            task: Some(task),
            cancelled: false,
        }
    }

    /// Stops delivery and waits for the underlying stream to be dropped.
    ///
    /// After this returns the subscription yields no further items.
    pub async fn cancel(&mut self) {
        self.cancelled = true;
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
        self.rx.close();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("payment release forwarder ended abnormally: {e}");
            }
        }
    }

    /// Whether [`cancel`](Self::cancel) has been called.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }
}

impl Stream for PaymentReleasedSubscription {
    type Item = Result<PaymentReleasedEvent>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.cancelled {
            return Poll::Ready(None);
        }
        self.rx.poll_recv(cx)
    }
}

impl Drop for PaymentReleasedSubscription {
    fn drop(&mut self) {
        if let Some(task) = &self.task {
            task.abort();
        }
    }
}

async fn forward(
    mut logs: LogStream,
    cursor: EventCursor,
    tx: mpsc::Sender<Result<PaymentReleasedEvent>>,
    mut cancel: oneshot::Receiver<()>,
) {
    loop {
        let item = tokio::select! {
            _ = &mut cancel => break,
            item = logs.next() => item,
        };
        let event = match item {
            None => break,
            Some(Ok(log)) => decode_payment_released(&log),
            Some(Err(e)) => Err(e.into()),
        };
        match event {
            Ok(event) if !cursor.admits(event.block_number, event.log_index) => continue,
            Ok(event) => {
                if tx.send(Ok(event)).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                warn!("payment release subscription failed: {e}");
                let _ = tx.send(Err(e)).await;
                break;
            }
        }
    }
    // Release the node-side stream before the channel reports the end.
    drop(logs);
    debug!("payment release subscription stopped");
}
