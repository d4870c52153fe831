//! Tesseract Submitter - transaction submission and confirmation for EVM-style ledgers
//!
//! Turns an intent (move value, invoke a contract method, deploy a contract)
//! into a sequenced, signed transaction, broadcasts it, and tracks it until the
//! ledger reports an outcome or the wait is bounded out or cancelled.

pub mod chain;
pub mod config;
pub mod contract;
pub mod error;
pub mod events;
pub mod metrics;
pub mod tx;

pub use chain::{
    CancelHandle, CancelSignal, ChainProvider, ConfirmationProgress, ConfirmationResult,
    ConfirmationTracker, ExecutionStatus, LedgerClient, TransactionReceipt,
};
pub use config::Settings;
pub use error::{RejectionReason, SubmitterError, SubmitterResult};
pub use tx::{SigningIdentity, Submission, TransactionSubmitter};
