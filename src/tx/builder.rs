//! Unsigned transaction assembly and input validation

use super::gas::{CONTRACT_CALL_GAS_LIMIT, DEPLOY_GAS_LIMIT, TRANSFER_GAS_LIMIT};
use crate::error::{SubmitterError, SubmitterResult};

use ethers::types::{Address, Bytes, TransactionRequest, U256};
use ethers::utils::parse_ether;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;

lazy_static! {
    static ref ADDRESS_PATTERN: Regex =
        Regex::new(r"^0x[0-9a-fA-F]{40}$").expect("address pattern is valid");
}

/// What a transaction does on the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Transfer,
    ContractCall,
    Deployment,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Transfer => "transfer",
            TransactionKind::ContractCall => "contract_call",
            TransactionKind::Deployment => "deployment",
        }
    }
}

/// A transaction ready to be signed.
///
/// Built only through [`TransactionBuilder`], so every instance has passed
/// input validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedTransaction {
    pub from: Address,
    /// `None` only for deployments
    pub to: Option<Address>,
    pub value: U256,
    pub gas_limit: u64,
    pub fee_per_unit: U256,
    pub nonce: u64,
    pub payload: Option<Bytes>,
}

impl UnsignedTransaction {
    pub fn kind(&self) -> TransactionKind {
        match (&self.to, &self.payload) {
            (None, _) => TransactionKind::Deployment,
            (Some(_), Some(_)) => TransactionKind::ContractCall,
            (Some(_), None) => TransactionKind::Transfer,
        }
    }

    /// Upper bound on what the sender pays: value plus maximum fee
    pub fn max_cost(&self) -> U256 {
        self.value + self.fee_per_unit * U256::from(self.gas_limit)
    }

    /// Legacy request carrying `chain_id` for EIP-155 signing
    pub(crate) fn to_request(&self, chain_id: u64) -> TransactionRequest {
        let mut request = TransactionRequest::new()
            .from(self.from)
            .value(self.value)
            .gas(self.gas_limit)
            .gas_price(self.fee_per_unit)
            .nonce(self.nonce)
            .chain_id(chain_id);

        if let Some(to) = self.to {
            request = request.to(to);
        }
        if let Some(payload) = &self.payload {
            request = request.data(payload.clone());
        }

        request
    }
}

/// Assembles unsigned transactions
pub struct TransactionBuilder;

impl TransactionBuilder {
    /// Build a transfer (no payload) or a contract invocation (payload).
    ///
    /// The payload is opaque pre-encoded call data and is not inspected.
    pub fn build(
        from: Address,
        to: &str,
        value: U256,
        nonce: u64,
        fee_per_unit: U256,
        payload: Option<Bytes>,
    ) -> SubmitterResult<UnsignedTransaction> {
        let to = parse_address(to)?;
        let payload = payload.filter(|p| !p.is_empty());

        let gas_limit = if payload.is_some() {
            CONTRACT_CALL_GAS_LIMIT
        } else {
            TRANSFER_GAS_LIMIT
        };

        Ok(UnsignedTransaction {
            from,
            to: Some(to),
            value,
            gas_limit,
            fee_per_unit,
            nonce,
            payload,
        })
    }

    /// Build a contract deployment carrying `bytecode` (constructor args appended)
    pub fn build_deployment(
        from: Address,
        bytecode: Bytes,
        value: U256,
        nonce: u64,
        fee_per_unit: U256,
    ) -> SubmitterResult<UnsignedTransaction> {
        if bytecode.is_empty() {
            return Err(SubmitterError::InvalidInput(
                "deployment bytecode is empty".to_string(),
            ));
        }

        Ok(UnsignedTransaction {
            from,
            to: None,
            value,
            gas_limit: DEPLOY_GAS_LIMIT,
            fee_per_unit,
            nonce,
            payload: Some(bytecode),
        })
    }
}

/// Parse a `0x`-prefixed 40 hex character address
pub fn parse_address(input: &str) -> SubmitterResult<Address> {
    let input = input.trim();
    if !ADDRESS_PATTERN.is_match(input) {
        return Err(SubmitterError::InvalidInput(format!(
            "malformed address: {:?}",
            input
        )));
    }

    input
        .parse::<Address>()
        .map_err(|e| SubmitterError::InvalidInput(format!("malformed address: {}", e)))
}

/// Convert a human-scaled amount ("0.01") to base units (x 10^18)
pub fn parse_amount(input: &str) -> SubmitterResult<U256> {
    let input = input.trim();
    if input.starts_with('-') {
        return Err(SubmitterError::InvalidInput(
            "amount must not be negative".to_string(),
        ));
    }
    if input.is_empty() {
        return Err(SubmitterError::InvalidInput("amount is empty".to_string()));
    }

    parse_ether(input)
        .map_err(|e| SubmitterError::InvalidInput(format!("invalid amount {:?}: {}", input, e)))
}
