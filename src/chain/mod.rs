//! Chain module - the network seam of the submitter
//!
//! This module provides:
//! - The `LedgerClient` trait every component talks to
//! - A multi-RPC provider with read failover
//! - Receipt polling with bounded, cancellable confirmation tracking

pub mod confirmation;
pub mod provider;

pub use confirmation::{
    CancelHandle, CancelSignal, ConfirmationProgress, ConfirmationResult, ConfirmationTracker,
};
pub use provider::ChainProvider;

use crate::error::SubmitterResult;

use async_trait::async_trait;
use ethers::types::{Address, Bytes, Filter, Log, H256, U256};
use serde::Serialize;

/// Read/write RPC surface of the ledger.
///
/// Constructed once and shared (`Arc<dyn LedgerClient>`) by every component.
/// Implementations must be safe to call from many tasks at once.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Network id used for signature domain separation
    async fn chain_id(&self) -> SubmitterResult<u64>;

    /// Transaction count for `address` including the pending pool
    async fn pending_nonce(&self, address: Address) -> SubmitterResult<u64>;

    /// Currently suggested fee per resource unit, in base units
    async fn suggested_fee(&self) -> SubmitterResult<U256>;

    /// Submit raw signed bytes; returns the hash reported by the node
    async fn send_raw_transaction(&self, raw: Bytes) -> SubmitterResult<H256>;

    /// Receipt for `tx_hash`, `None` while not yet included
    async fn transaction_receipt(&self, tx_hash: H256)
        -> SubmitterResult<Option<TransactionReceipt>>;

    /// Logs matching `filter`
    async fn logs(&self, filter: &Filter) -> SubmitterResult<Vec<Log>>;

    /// Read-only contract call against the latest state
    async fn call(&self, to: Address, data: Bytes) -> SubmitterResult<Bytes>;

    /// Balance of `address` in base units
    async fn balance(&self, address: Address) -> SubmitterResult<U256>;
}

/// Execution outcome recorded in a receipt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Success,
    Reverted,
}

/// The network's record of a transaction's inclusion
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionReceipt {
    pub transaction_id: H256,
    pub included_in_block: u64,
    pub status: ExecutionStatus,
    pub resource_used: Option<U256>,
    /// Address created by a deployment
    pub contract_address: Option<Address>,
    pub logs: Vec<Log>,
}

impl TransactionReceipt {
    /// Convert an RPC receipt. Returns `None` for receipts without a block.
    pub fn from_rpc(receipt: ethers::types::TransactionReceipt) -> Option<Self> {
        let block = receipt.block_number?;

        // Pre-Byzantium receipts carry no status; treat them as success
        let status = match receipt.status {
            Some(s) if s.is_zero() => ExecutionStatus::Reverted,
            _ => ExecutionStatus::Success,
        };

        Some(Self {
            transaction_id: receipt.transaction_hash,
            included_in_block: block.as_u64(),
            status,
            resource_used: receipt.gas_used,
            contract_address: receipt.contract_address,
            logs: receipt.logs,
        })
    }

    pub fn succeeded(&self) -> bool {
        self.status == ExecutionStatus::Success
    }
}
