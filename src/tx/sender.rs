//! Transaction submitter: intent in, broadcast transaction and outcome out

use super::broadcast::Broadcaster;
use super::builder::{parse_address, TransactionBuilder, TransactionKind, UnsignedTransaction};
use super::gas::FeeEstimator;
use super::identity::SigningIdentity;
use super::nonce::NonceSequencer;
use super::signer::Signer;
use crate::chain::{
    CancelSignal, ConfirmationProgress, ConfirmationResult, ConfirmationTracker, LedgerClient,
};
use crate::config::{ConfirmationConfig, Settings, SubmissionConfig};
use crate::error::{SubmitterError, SubmitterResult};

use chrono::{DateTime, Utc};
use ethers::types::{Address, Bytes, H256, U256};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

/// Record of one accepted broadcast
#[derive(Debug, Clone, Serialize)]
pub struct Submission {
    /// Local correlation id for logs
    pub submission_id: Uuid,
    pub tx_hash: H256,
    pub from: Address,
    /// `None` for deployments
    pub to: Option<Address>,
    pub nonce: u64,
    pub kind: TransactionKind,
    pub fee_per_unit: U256,
    pub submitted_at: DateTime<Utc>,
}

/// Orchestrates nonce, fee, build, sign and broadcast for one network
pub struct TransactionSubmitter {
    client: Arc<dyn LedgerClient>,
    network_id: u64,
    sequencer: NonceSequencer,
    fees: FeeEstimator,
    broadcaster: Broadcaster,
    confirmation: ConfirmationConfig,
    progress_tx: Option<mpsc::Sender<ConfirmationProgress>>,
}

impl TransactionSubmitter {
    /// Create a submitter for `network_id`
    pub fn new(
        client: Arc<dyn LedgerClient>,
        network_id: u64,
        submission: &SubmissionConfig,
        confirmation: &ConfirmationConfig,
    ) -> Self {
        Self {
            sequencer: NonceSequencer::new(client.clone())
                .with_lag_tolerance(submission.nonce_lag_tolerance()),
            fees: FeeEstimator::new(client.clone(), submission),
            broadcaster: Broadcaster::new(client.clone()),
            client,
            network_id,
            confirmation: confirmation.clone(),
            progress_tx: None,
        }
    }

    /// Create a submitter for whatever network `client` is connected to
    pub async fn connect(
        client: Arc<dyn LedgerClient>,
        settings: &Settings,
    ) -> SubmitterResult<Self> {
        let network_id = client.chain_id().await?;
        info!("Submitter bound to network {}", network_id);

        Ok(Self::new(
            client,
            network_id,
            &settings.submission,
            &settings.confirmation,
        ))
    }

    /// Forward confirmation progress to `tx`
    pub fn with_progress(mut self, tx: mpsc::Sender<ConfirmationProgress>) -> Self {
        self.progress_tx = Some(tx);
        self
    }

    pub fn network_id(&self) -> u64 {
        self.network_id
    }

    pub fn sequencer(&self) -> &NonceSequencer {
        &self.sequencer
    }

    pub fn client(&self) -> &Arc<dyn LedgerClient> {
        &self.client
    }

    /// A fresh tracker sharing this submitter's client and settings
    pub fn tracker(&self) -> ConfirmationTracker {
        let tracker = ConfirmationTracker::new(self.client.clone(), &self.confirmation);
        match &self.progress_tx {
            Some(tx) => tracker.with_progress(tx.clone()),
            None => tracker,
        }
    }

    /// Move `value` base units from `identity` to `to`
    pub async fn send_transfer(
        &self,
        identity: &SigningIdentity,
        to: &str,
        value: U256,
    ) -> SubmitterResult<Submission> {
        parse_address(to)?;

        self.submit(identity, |nonce, fee| {
            TransactionBuilder::build(identity.address(), to, value, nonce, fee, None)
        })
        .await
    }

    /// Invoke a contract method with pre-encoded call data
    pub async fn invoke(
        &self,
        identity: &SigningIdentity,
        contract: &str,
        payload: Bytes,
        value: U256,
    ) -> SubmitterResult<Submission> {
        parse_address(contract)?;
        if payload.is_empty() {
            return Err(SubmitterError::InvalidInput(
                "contract call payload is empty".to_string(),
            ));
        }

        self.submit(identity, |nonce, fee| {
            TransactionBuilder::build(
                identity.address(),
                contract,
                value,
                nonce,
                fee,
                Some(payload.clone()),
            )
        })
        .await
    }

    /// Deploy a contract from creation bytecode
    pub async fn deploy(
        &self,
        identity: &SigningIdentity,
        bytecode: Bytes,
        value: U256,
    ) -> SubmitterResult<Submission> {
        if bytecode.is_empty() {
            return Err(SubmitterError::InvalidInput(
                "deployment bytecode is empty".to_string(),
            ));
        }

        self.submit(identity, |nonce, fee| {
            TransactionBuilder::build_deployment(
                identity.address(),
                bytecode.clone(),
                value,
                nonce,
                fee,
            )
        })
        .await
    }

    /// Wait for a submission using the configured bound.
    ///
    /// A timed-out transaction may have been dropped from the pool, so the
    /// sender's nonce is resynchronized with the network afterwards.
    pub async fn await_confirmation(
        &self,
        submission: &Submission,
        cancel: CancelSignal,
    ) -> ConfirmationResult {
        let result = self
            .tracker()
            .await_confirmation(submission.tx_hash, self.confirmation.timeout(), cancel)
            .await;

        if let ConfirmationResult::TimedOut { .. } = result {
            self.sequencer.resync(submission.from).await;
        }
        result
    }

    /// Take the next nonce for `address` from the network's pending count,
    /// discarding what this submitter has broadcast locally
    pub async fn resync_nonce(&self, address: Address) {
        self.sequencer.resync(address).await;
    }

    /// Submit a transfer or call and wait for its outcome.
    ///
    /// A rejected broadcast returns the error and starts no tracker.
    pub async fn submit_and_confirm(
        &self,
        identity: &SigningIdentity,
        to: &str,
        value: U256,
        payload: Option<Bytes>,
        cancel: CancelSignal,
    ) -> SubmitterResult<(Submission, ConfirmationResult)> {
        let submission = match payload {
            Some(payload) => self.invoke(identity, to, payload, value).await?,
            None => self.send_transfer(identity, to, value).await?,
        };

        let result = self.await_confirmation(&submission, cancel).await;
        Ok((submission, result))
    }

    /// Resolve nonce and fee under the address permit, build, sign, broadcast.
    ///
    /// The permit is held until the broadcast returns; only an accepted
    /// broadcast advances the local nonce.
    async fn submit<F>(&self, identity: &SigningIdentity, build: F) -> SubmitterResult<Submission>
    where
        F: FnOnce(u64, U256) -> SubmitterResult<UnsignedTransaction>,
    {
        let mut permit = self.sequencer.lock(identity.address()).await;

        let nonce = self.sequencer.next_nonce(&mut permit).await?;
        let fee = self.fees.suggested_fee().await?;
        let unsigned = build(nonce, fee)?;
        let signed = Signer::sign(&unsigned, identity, self.network_id)?;

        debug!(
            "Signed {} from {:?} with nonce {} at {} wei/unit",
            unsigned.kind().as_str(),
            unsigned.from,
            nonce,
            fee
        );

        let tx_hash = self.broadcaster.submit(&signed).await?;
        permit.commit(nonce);
        drop(permit);

        crate::metrics::record_tx_submitted(unsigned.kind().as_str());

        Ok(Submission {
            submission_id: Uuid::new_v4(),
            tx_hash,
            from: unsigned.from,
            to: unsigned.to,
            nonce,
            kind: unsigned.kind(),
            fee_per_unit: fee,
            submitted_at: Utc::now(),
        })
    }
}
