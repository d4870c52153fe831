//! Fee estimation and resource limits

use crate::chain::LedgerClient;
use crate::config::SubmissionConfig;
use crate::error::{SubmitterError, SubmitterResult};

use ethers::types::U256;
use std::sync::Arc;
use tracing::debug;

/// Resource limit for a plain value transfer
pub const TRANSFER_GAS_LIMIT: u64 = 21_000;

/// Resource ceiling for a contract method invocation
pub const CONTRACT_CALL_GAS_LIMIT: u64 = 300_000;

/// Resource ceiling for a contract deployment
pub const DEPLOY_GAS_LIMIT: u64 = 3_000_000;

const GWEI: u64 = 1_000_000_000;

/// Single-shot fee estimator.
///
/// One network call per estimate, no retry, no caching.
pub struct FeeEstimator {
    client: Arc<dyn LedgerClient>,
    /// Buffer percentage for fee per unit (e.g., 10 = 10% buffer)
    fee_buffer_percent: u64,
    /// Ceiling on the buffered fee per unit
    max_fee_per_unit: Option<U256>,
}

impl FeeEstimator {
    /// Create a new fee estimator
    pub fn new(client: Arc<dyn LedgerClient>, config: &SubmissionConfig) -> Self {
        Self {
            client,
            fee_buffer_percent: config.fee_buffer_percent,
            max_fee_per_unit: config
                .max_fee_per_unit_gwei
                .map(|gwei| U256::from(gwei) * U256::from(GWEI)),
        }
    }

    /// Network's currently suggested fee per unit, with the configured buffer
    pub async fn suggested_fee(&self) -> SubmitterResult<U256> {
        let suggested = self.client.suggested_fee().await.map_err(|e| match e {
            SubmitterError::Network(_) => e,
            other => SubmitterError::Network(other.to_string()),
        })?;

        let buffered = suggested + suggested * self.fee_buffer_percent / 100;

        if let Some(max) = self.max_fee_per_unit {
            if buffered > max {
                return Err(SubmitterError::FeeTooHigh {
                    suggested_gwei: to_gwei(buffered),
                    max_gwei: to_gwei(max),
                });
            }
        }

        crate::metrics::record_suggested_fee(to_gwei(buffered) as f64);
        debug!(
            "Suggested fee {} wei, using {} wei ({}% buffer)",
            suggested, buffered, self.fee_buffer_percent
        );

        Ok(buffered)
    }
}

/// Maximum fee a transaction can be charged
pub fn max_fee(gas_limit: u64, fee_per_unit: U256) -> U256 {
    fee_per_unit * U256::from(gas_limit)
}

fn to_gwei(wei: U256) -> u64 {
    let gwei = wei / U256::from(GWEI);
    if gwei > U256::from(u64::MAX) {
        u64::MAX
    } else {
        gwei.as_u64()
    }
}
