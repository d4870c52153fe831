//! Nonce sequencing for reliable transaction submission
//!
//! Handles:
//! - Reading the next nonce from the network's pending view
//! - Serializing the read-then-broadcast section per address
//! - A local high-water mark so a lagging node never hands out a used nonce
//!
//! The high-water mark only bridges the lag between an accepted broadcast and
//! the node's pending count. If the pending count stays below it for longer
//! than the lag tolerance, the accepted transactions are assumed dropped from
//! the pool and the network's count wins again, so no nonce gap is left behind.

use crate::chain::LedgerClient;
use crate::error::{SubmitterError, SubmitterResult};

use dashmap::DashMap;
use ethers::types::Address;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::Instant;
use tracing::{debug, warn};

/// Default time the pending count may trail our own broadcasts
pub const DEFAULT_NONCE_LAG_TOLERANCE: Duration = Duration::from_secs(60);

/// Next nonce after the last accepted broadcast, and when it was recorded
#[derive(Debug, Clone, Copy)]
struct HighWaterMark {
    next: u64,
    committed_at: Instant,
}

/// Per-address nonce state, only touched while holding its mutex
#[derive(Debug, Default)]
struct AddressNonceState {
    mark: Option<HighWaterMark>,
}

/// Exclusive right to submit for one address.
///
/// Held from nonce resolution through broadcast. Dropping it without calling
/// [`SubmissionPermit::commit`] records nothing, so a failed broadcast leaves
/// no gap.
pub struct SubmissionPermit {
    address: Address,
    state: OwnedMutexGuard<AddressNonceState>,
}

impl SubmissionPermit {
    pub fn address(&self) -> Address {
        self.address
    }

    /// Record that the network accepted a transaction with `nonce`
    pub fn commit(&mut self, nonce: u64) {
        let next = nonce + 1;
        let next = match self.state.mark {
            Some(mark) if mark.next > next => mark.next,
            _ => next,
        };
        self.state.mark = Some(HighWaterMark {
            next,
            committed_at: Instant::now(),
        });
    }

    /// Forget the local high-water mark and trust the network again
    pub fn reset(&mut self) {
        self.state.mark = None;
    }
}

/// Resolves per-address nonces and serializes submissions per address
pub struct NonceSequencer {
    client: Arc<dyn LedgerClient>,
    /// One mutex per address; different addresses never contend
    addresses: DashMap<Address, Arc<Mutex<AddressNonceState>>>,
    lag_tolerance: Duration,
}

impl NonceSequencer {
    /// Create a new nonce sequencer
    pub fn new(client: Arc<dyn LedgerClient>) -> Self {
        Self {
            client,
            addresses: DashMap::new(),
            lag_tolerance: DEFAULT_NONCE_LAG_TOLERANCE,
        }
    }

    /// How long the pending count may trail the local mark
    pub fn with_lag_tolerance(mut self, lag_tolerance: Duration) -> Self {
        self.lag_tolerance = lag_tolerance;
        self
    }

    /// Wait for exclusive submission rights for `address`
    pub async fn lock(&self, address: Address) -> SubmissionPermit {
        // Clone the Arc so the map shard is not held across the await
        let slot = self.addresses.entry(address).or_default().clone();
        let state = slot.lock_owned().await;

        SubmissionPermit { address, state }
    }

    /// Next nonce for the permit's address.
    ///
    /// Uses the pending transaction count, raised to the local high-water mark
    /// while the node has not caught up with our own broadcasts yet. A mark
    /// the node never reaches within the lag tolerance is discarded.
    pub async fn next_nonce(&self, permit: &mut SubmissionPermit) -> SubmitterResult<u64> {
        let pending = self.pending_nonce(permit.address).await?;

        let nonce = match permit.state.mark {
            Some(mark) if mark.next > pending => {
                let behind_for = mark.committed_at.elapsed();
                if behind_for > self.lag_tolerance {
                    warn!(
                        "Pending count for {:?} stuck at {} below local nonce {} for {:?}, \
                         resynchronizing with the network",
                        permit.address, pending, mark.next, behind_for
                    );
                    permit.reset();
                    pending
                } else {
                    debug!(
                        "Pending view for {:?} lags ({} < {}), using local nonce",
                        permit.address, pending, mark.next
                    );
                    mark.next
                }
            }
            Some(_) => {
                // Node has caught up
                permit.reset();
                pending
            }
            None => pending,
        };

        debug!("Resolved nonce {} for {:?}", nonce, permit.address);
        Ok(nonce)
    }

    /// Drop the local mark for `address` so the next nonce comes from the
    /// network's pending count alone
    pub async fn resync(&self, address: Address) {
        let mut permit = self.lock(address).await;
        permit.reset();
        debug!("Nonce for {:?} resynchronized with the network", address);
    }

    /// Unguarded read of the pending transaction count.
    ///
    /// Two concurrent callers can observe the same value; use [`lock`] and
    /// [`next_nonce`] for anything that will be broadcast.
    ///
    /// [`lock`]: NonceSequencer::lock
    /// [`next_nonce`]: NonceSequencer::next_nonce
    pub async fn pending_nonce(&self, address: Address) -> SubmitterResult<u64> {
        self.client.pending_nonce(address).await.map_err(|e| {
            warn!("Failed to fetch nonce for {:?}: {}", address, e);
            match e {
                SubmitterError::Network(_) => e,
                other => SubmitterError::Network(other.to_string()),
            }
        })
    }

    /// Number of addresses seen so far
    pub fn tracked_addresses(&self) -> usize {
        self.addresses.len()
    }
}
