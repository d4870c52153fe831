//! Confirmation timing against the simulated ledger, on a paused clock

mod common;

use common::{ether, SimulatedLedger, DEV_KEY, NETWORK_ID, RECIPIENT};
use ethers::types::U256;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

use tesseract_submitter::chain::{CancelSignal, ConfirmationResult, ConfirmationTracker};
use tesseract_submitter::config::{ConfirmationConfig, SubmissionConfig};
use tesseract_submitter::tx::{SigningIdentity, TransactionSubmitter};

fn setup(
    inclusion_delay: Option<Duration>,
) -> (Arc<SimulatedLedger>, TransactionSubmitter, SigningIdentity) {
    let identity = SigningIdentity::from_hex(DEV_KEY).unwrap();
    let ledger = Arc::new(
        SimulatedLedger::new()
            .fund(identity.address(), ether(1))
            .with_inclusion_delay(inclusion_delay),
    );
    let submitter = TransactionSubmitter::new(
        ledger.clone(),
        NETWORK_ID,
        &SubmissionConfig::default(),
        &ConfirmationConfig::default(),
    );
    (ledger, submitter, identity)
}

#[tokio::test(start_paused = true)]
async fn receipt_after_ten_seconds_is_success() {
    let (_ledger, submitter, identity) = setup(Some(Duration::from_secs(10)));

    let started = Instant::now();
    let (_, result) = submitter
        .submit_and_confirm(&identity, RECIPIENT, U256::one(), None, CancelSignal::never())
        .await
        .unwrap();

    let elapsed = started.elapsed();
    assert!(matches!(result, ConfirmationResult::Success(_)));
    // Found on the first poll at or after inclusion
    assert!(elapsed >= Duration::from_secs(10), "{:?}", elapsed);
    assert!(elapsed <= Duration::from_secs(12), "{:?}", elapsed);
}

#[tokio::test(start_paused = true)]
async fn missing_receipt_times_out_without_error() {
    let (ledger, submitter, identity) = setup(None);

    let started = Instant::now();
    let (submission, result) = submitter
        .submit_and_confirm(&identity, RECIPIENT, U256::one(), None, CancelSignal::never())
        .await
        .unwrap();

    match result {
        ConfirmationResult::TimedOut { elapsed } => {
            assert_eq!(elapsed, Duration::from_secs(300));
        }
        other => panic!("expected timeout, got {:?}", other),
    }
    assert_eq!(started.elapsed(), Duration::from_secs(300));

    // No further network calls once the bound is reached
    let queries = ledger.receipt_queries();
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(ledger.receipt_queries(), queries);

    // The transaction itself stays accepted
    assert_eq!(ledger.nonce_of(submission.from), 1);
}

#[tokio::test(start_paused = true)]
async fn cancel_stops_waiting_but_keeps_broadcast() {
    let (ledger, submitter, identity) = setup(None);
    let submission = submitter
        .send_transfer(&identity, RECIPIENT, U256::one())
        .await
        .unwrap();

    let (handle, cancel) = CancelSignal::pair();
    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(7)).await;
        handle.cancel();
    });

    let started = Instant::now();
    let result = submitter.await_confirmation(&submission, cancel).await;
    canceller.await.unwrap();

    assert_eq!(result, ConfirmationResult::Cancelled);
    assert_eq!(started.elapsed(), Duration::from_secs(7));
    assert_eq!(ledger.transaction_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn trackers_run_independently() {
    let (ledger, submitter, identity) = setup(Some(Duration::from_secs(4)));

    let first = submitter
        .send_transfer(&identity, RECIPIENT, U256::one())
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_secs(20)).await;
    let second = submitter
        .send_transfer(&identity, RECIPIENT, U256::from(2u64))
        .await
        .unwrap();
    assert_eq!((first.nonce, second.nonce), (0, 1));

    let short = ConfirmationTracker::new(ledger.clone(), &ConfirmationConfig::default());
    let (a, b) = tokio::join!(
        submitter.await_confirmation(&first, CancelSignal::never()),
        short.await_confirmation(second.tx_hash, Duration::from_secs(2), CancelSignal::never())
    );

    assert!(matches!(a, ConfirmationResult::Success(_)));
    assert!(matches!(b, ConfirmationResult::TimedOut { .. }));
}

#[tokio::test(start_paused = true)]
async fn progress_is_reported_while_waiting() {
    let (_ledger, submitter, identity) = setup(Some(Duration::from_secs(9)));
    let (tx, mut rx) = mpsc::channel(64);
    let submitter = submitter.with_progress(tx);

    let (submission, result) = submitter
        .submit_and_confirm(&identity, RECIPIENT, U256::one(), None, CancelSignal::never())
        .await
        .unwrap();
    assert!(matches!(result, ConfirmationResult::Success(_)));

    let mut updates = Vec::new();
    while let Ok(progress) = rx.try_recv() {
        updates.push(progress);
    }
    assert!(!updates.is_empty());
    assert!(updates.iter().all(|p| p.tx_hash == submission.tx_hash));
    assert!(updates.windows(2).all(|w| w[0].elapsed <= w[1].elapsed));
}
