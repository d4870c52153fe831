//! Confirmation tracking for broadcast transactions
//!
//! A tracker polls for the receipt of one transaction id at a fixed interval
//! until it is included (success or reverted), a deadline passes, the caller
//! cancels, or the receipt query keeps failing. Progress notifications run on
//! their own task and cadence so they never hold up a poll.

use super::{LedgerClient, TransactionReceipt};
use crate::config::ConfirmationConfig;
use crate::error::{SubmitterError, SubmitterResult};

use ethers::types::H256;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep_until, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Stand-in deadline for bounds the clock cannot represent
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Terminal outcome of waiting for a transaction
#[derive(Debug, Clone, PartialEq)]
pub enum ConfirmationResult {
    /// Included and executed successfully
    Success(TransactionReceipt),
    /// Included but execution failed
    Reverted(TransactionReceipt),
    /// No receipt before the bound
    TimedOut { elapsed: Duration },
    /// The receipt query failed repeatedly
    NetworkError(String),
    /// The caller stopped the wait; the ledger outcome is unknown
    Cancelled,
}

impl ConfirmationResult {
    /// Label used in metrics and logs
    pub fn label(&self) -> &'static str {
        match self {
            ConfirmationResult::Success(_) => "success",
            ConfirmationResult::Reverted(_) => "reverted",
            ConfirmationResult::TimedOut { .. } => "timed_out",
            ConfirmationResult::NetworkError(_) => "network_error",
            ConfirmationResult::Cancelled => "cancelled",
        }
    }

    pub fn receipt(&self) -> Option<&TransactionReceipt> {
        match self {
            ConfirmationResult::Success(r) | ConfirmationResult::Reverted(r) => Some(r),
            _ => None,
        }
    }

    /// Convert to a `Result` for callers that only care about success
    pub fn into_result(self, tx_hash: H256) -> SubmitterResult<TransactionReceipt> {
        match self {
            ConfirmationResult::Success(receipt) => Ok(receipt),
            ConfirmationResult::Reverted(receipt) => Err(SubmitterError::ExecutionReverted {
                tx_hash: format!("{:?}", tx_hash),
                block_number: receipt.included_in_block,
            }),
            ConfirmationResult::TimedOut { elapsed } => Err(SubmitterError::ConfirmationTimeout {
                tx_hash: format!("{:?}", tx_hash),
                waited: elapsed,
            }),
            ConfirmationResult::NetworkError(detail) => Err(SubmitterError::Network(detail)),
            ConfirmationResult::Cancelled => Err(SubmitterError::Cancelled {
                tx_hash: format!("{:?}", tx_hash),
            }),
        }
    }
}

/// Sending half of a cancellation signal
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// Receiving half of a cancellation signal, threaded through waits
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    /// Create a linked handle/signal pair
    pub fn pair() -> (CancelHandle, CancelSignal) {
        let (tx, rx) = watch::channel(false);
        (CancelHandle { tx }, CancelSignal { rx })
    }

    /// A signal that never fires
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        CancelSignal { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation is requested
    pub async fn cancelled(&mut self) {
        // Dropped handle without cancelling means "never"
        if self.rx.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Advisory progress notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmationProgress {
    pub tx_hash: H256,
    pub elapsed: Duration,
    pub polls: u64,
}

/// Aborts the progress task when the wait ends or is dropped
struct ProgressTask(JoinHandle<()>);

impl Drop for ProgressTask {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Polls the ledger for the receipt of a single transaction
pub struct ConfirmationTracker {
    client: Arc<dyn LedgerClient>,
    poll_interval: Duration,
    progress_interval: Duration,
    max_consecutive_failures: u32,
    progress_tx: Option<mpsc::Sender<ConfirmationProgress>>,
}

impl ConfirmationTracker {
    /// Create a tracker from configuration
    pub fn new(client: Arc<dyn LedgerClient>, config: &ConfirmationConfig) -> Self {
        Self {
            client,
            poll_interval: config.poll_interval(),
            progress_interval: config.progress_interval(),
            max_consecutive_failures: config.max_consecutive_poll_failures.max(1),
            progress_tx: None,
        }
    }

    /// Deliver progress notifications to `tx`; full channels drop updates
    pub fn with_progress(mut self, tx: mpsc::Sender<ConfirmationProgress>) -> Self {
        self.progress_tx = Some(tx);
        self
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Wait for `tx_hash` to be included, for at most `bound`.
    ///
    /// Never returns an error: every outcome, including timeout and
    /// cancellation, is a `ConfirmationResult` the caller branches on.
    pub async fn await_confirmation(
        &self,
        tx_hash: H256,
        bound: Duration,
        mut cancel: CancelSignal,
    ) -> ConfirmationResult {
        let started = Instant::now();
        let deadline = started
            .checked_add(bound)
            .unwrap_or_else(|| started + FAR_FUTURE);
        let polls = Arc::new(AtomicU64::new(0));

        debug!(
            "Tracking {:?} (poll every {:?}, bound {:?})",
            tx_hash, self.poll_interval, bound
        );

        let result = {
            let _progress = self.spawn_progress(tx_hash, started, polls.clone());
            self.poll_until(tx_hash, started, deadline, &mut cancel, &polls)
                .await
        };

        let elapsed = started.elapsed();
        match &result {
            ConfirmationResult::Success(r) => info!(
                "Transaction {:?} confirmed in block {} after {:?}",
                tx_hash, r.included_in_block, elapsed
            ),
            ConfirmationResult::Reverted(r) => warn!(
                "Transaction {:?} reverted in block {} after {:?}",
                tx_hash, r.included_in_block, elapsed
            ),
            ConfirmationResult::TimedOut { .. } => {
                warn!("No receipt for {:?} within {:?}", tx_hash, bound)
            }
            ConfirmationResult::NetworkError(e) => {
                warn!("Receipt polling for {:?} failed: {}", tx_hash, e)
            }
            ConfirmationResult::Cancelled => {
                info!("Confirmation wait for {:?} cancelled after {:?}", tx_hash, elapsed)
            }
        }

        crate::metrics::record_confirmation(result.label(), elapsed.as_secs_f64());
        result
    }

    async fn poll_until(
        &self,
        tx_hash: H256,
        started: Instant,
        deadline: Instant,
        cancel: &mut CancelSignal,
        polls: &AtomicU64,
    ) -> ConfirmationResult {
        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut failures = 0u32;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return ConfirmationResult::Cancelled,
                _ = sleep_until(deadline) => {
                    return ConfirmationResult::TimedOut { elapsed: started.elapsed() }
                }
                _ = ticker.tick() => {}
            }

            polls.fetch_add(1, Ordering::Relaxed);

            // In-flight query is abandoned on cancel or deadline
            let response = tokio::select! {
                biased;
                _ = cancel.cancelled() => return ConfirmationResult::Cancelled,
                _ = sleep_until(deadline) => {
                    return ConfirmationResult::TimedOut { elapsed: started.elapsed() }
                }
                response = self.client.transaction_receipt(tx_hash) => response,
            };

            match response {
                Ok(Some(receipt)) => {
                    return if receipt.succeeded() {
                        ConfirmationResult::Success(receipt)
                    } else {
                        ConfirmationResult::Reverted(receipt)
                    };
                }
                Ok(None) => {
                    failures = 0;
                    debug!("Transaction {:?} pending", tx_hash);
                }
                Err(e) => {
                    failures += 1;
                    warn!(
                        "Receipt query for {:?} failed ({}/{}): {}",
                        tx_hash, failures, self.max_consecutive_failures, e
                    );
                    if failures >= self.max_consecutive_failures {
                        return ConfirmationResult::NetworkError(e.to_string());
                    }
                }
            }
        }
    }

    fn spawn_progress(
        &self,
        tx_hash: H256,
        started: Instant,
        polls: Arc<AtomicU64>,
    ) -> ProgressTask {
        let progress_tx = self.progress_tx.clone();
        let cadence = self.progress_interval;

        ProgressTask(tokio::spawn(async move {
            let mut ticker = interval(cadence);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // First tick is immediate; nothing to report yet
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let progress = ConfirmationProgress {
                    tx_hash,
                    elapsed: started.elapsed(),
                    polls: polls.load(Ordering::Relaxed),
                };
                debug!(
                    "Waiting for {:?}: {:?} elapsed, {} polls",
                    tx_hash, progress.elapsed, progress.polls
                );
                if let Some(tx) = &progress_tx {
                    if let Err(mpsc::error::TrySendError::Closed(_)) = tx.try_send(progress) {
                        return;
                    }
                }
            }
        }))
    }
}
