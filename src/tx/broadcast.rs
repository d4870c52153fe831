//! Broadcast of signed transactions

use super::signer::SignedTransaction;
use crate::chain::LedgerClient;
use crate::error::{SubmitterError, SubmitterResult};

use ethers::types::H256;
use sha3::{Digest, Keccak256};
use std::sync::Arc;
use tracing::{info, warn};

/// Keccak-256 of the signed encoding, the ledger's transaction id
pub fn content_hash(raw: &[u8]) -> H256 {
    let mut hasher = Keccak256::new();
    hasher.update(raw);
    H256::from_slice(&hasher.finalize())
}

/// Submits signed bytes to the network.
///
/// Exactly one attempt per call. A network failure or rejection is returned to
/// the caller as-is; resubmitting is the caller's decision.
pub struct Broadcaster {
    client: Arc<dyn LedgerClient>,
}

impl Broadcaster {
    pub fn new(client: Arc<dyn LedgerClient>) -> Self {
        Self { client }
    }

    /// Broadcast `signed` and return its transaction id
    pub async fn submit(&self, signed: &SignedTransaction) -> SubmitterResult<H256> {
        let tx_hash = signed.transaction_id();
        let nonce = signed.unsigned().nonce;

        match self.client.send_raw_transaction(signed.raw().clone()).await {
            Ok(reported) => {
                if reported != tx_hash {
                    warn!(
                        "Node reported hash {:?} for transaction {:?}, keeping local id",
                        reported, tx_hash
                    );
                }
                info!(
                    "Broadcast {:?} (nonce {}, {})",
                    tx_hash,
                    nonce,
                    signed.unsigned().kind().as_str()
                );
                Ok(tx_hash)
            }
            Err(SubmitterError::Rejected { reason, message }) => {
                warn!(
                    "Transaction {:?} with nonce {} rejected ({}): {}",
                    tx_hash, nonce, reason, message
                );
                crate::metrics::record_tx_rejected(reason.as_str());
                Err(SubmitterError::Rejected { reason, message })
            }
            Err(SubmitterError::Network(detail)) => {
                warn!("Broadcast of {:?} failed: {}", tx_hash, detail);
                Err(SubmitterError::Network(detail))
            }
            Err(other) => Err(SubmitterError::Network(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::MockLedgerClient;
    use crate::error::RejectionReason;
    use crate::tx::builder::TransactionBuilder;
    use crate::tx::identity::{tests::DEV_KEY, SigningIdentity};
    use crate::tx::signer::Signer;
    use ethers::types::U256;

    fn signed() -> SignedTransaction {
        let identity = SigningIdentity::from_hex(DEV_KEY).unwrap();
        let unsigned = TransactionBuilder::build(
            identity.address(),
            "0xAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA",
            U256::from(1_000u64),
            0,
            U256::from(1_000_000_000u64),
            None,
        )
        .unwrap();
        Signer::sign(&unsigned, &identity, 31337).unwrap()
    }

    #[test]
    fn test_content_hash_of_empty_input() {
        assert_eq!(
            format!("{:?}", content_hash(&[])),
            "0xc5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[tokio::test]
    async fn test_returns_content_hash() {
        let signed = signed();
        let expected = content_hash(signed.raw());
        let raw = signed.raw().clone();

        let mut mock = MockLedgerClient::new();
        mock.expect_send_raw_transaction()
            .withf(move |bytes| *bytes == raw)
            .times(1)
            .returning(move |_| Ok(expected));

        let broadcaster = Broadcaster::new(Arc::new(mock));
        assert_eq!(broadcaster.submit(&signed).await.unwrap(), expected);
    }

    #[tokio::test]
    async fn test_keeps_local_id_on_hash_mismatch() {
        let signed = signed();
        let mut mock = MockLedgerClient::new();
        mock.expect_send_raw_transaction()
            .returning(|_| Ok(H256::repeat_byte(1)));

        let broadcaster = Broadcaster::new(Arc::new(mock));
        assert_eq!(
            broadcaster.submit(&signed).await.unwrap(),
            signed.transaction_id()
        );
    }

    #[tokio::test]
    async fn test_rejection_is_surfaced_once() {
        let mut mock = MockLedgerClient::new();
        mock.expect_send_raw_transaction()
            .times(1)
            .returning(|_| {
                Err(SubmitterError::rejected(
                    "insufficient funds for gas * price + value",
                ))
            });

        let broadcaster = Broadcaster::new(Arc::new(mock));
        match broadcaster.submit(&signed()).await {
            Err(SubmitterError::Rejected { reason, .. }) => {
                assert_eq!(reason, RejectionReason::InsufficientFunds)
            }
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_transport_failure_is_network_error() {
        let mut mock = MockLedgerClient::new();
        mock.expect_send_raw_transaction()
            .times(1)
            .returning(|_| Err(SubmitterError::Network("connection reset".into())));

        let broadcaster = Broadcaster::new(Arc::new(mock));
        tokio_test::assert_err!(broadcaster.submit(&signed()).await);
    }
}
