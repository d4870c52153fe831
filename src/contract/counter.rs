//! Binding for the sample `Counter` contract

use super::{decode_bytecode, from_abi_u256, to_abi_u256};
use crate::chain::{LedgerClient, TransactionReceipt};
use crate::error::{SubmitterError, SubmitterResult};
use crate::events::{decode_receipt_logs, malformed, DecodedEvent, EventQuery, LogDecoder};

use alloy_primitives::B256;
use alloy_sol_types::{sol, SolCall, SolEvent};
use ethers::types::{Address, Bytes, Log, H256, U256};
use serde::Serialize;
use std::sync::Arc;

/// Compiled Counter creation code
const CREATION_CODE: &str = include_str!("../../contracts/Counter.bin");

sol! {
    function increment() external;
    function decrement() external;
    function incrementBy(uint256 value) external;
    function reset() external;
    function getCount() external view returns (uint256);

    event Increment(uint256 newValue);
    event Decrement(uint256 newValue);
    event Reset();
}

/// State-changing Counter methods
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterMethod {
    Increment,
    Decrement,
    IncrementBy(U256),
    Reset,
}

impl CounterMethod {
    /// Parse a method name and its optional argument.
    ///
    /// `incrementBy` requires a positive decimal integer; the other methods
    /// take no argument.
    pub fn parse(method: &str, value: Option<&str>) -> SubmitterResult<Self> {
        let method = match (method, value) {
            ("increment", None) => CounterMethod::Increment,
            ("decrement", None) => CounterMethod::Decrement,
            ("reset", None) => CounterMethod::Reset,
            ("incrementBy" | "increment-by", Some(value)) => {
                CounterMethod::IncrementBy(parse_positive(value)?)
            }
            ("incrementBy" | "increment-by", None) => {
                return Err(SubmitterError::InvalidInput(
                    "incrementBy requires a value".to_string(),
                ))
            }
            ("increment" | "decrement" | "reset", Some(_)) => {
                return Err(SubmitterError::InvalidInput(format!(
                    "{} takes no value",
                    method
                )))
            }
            (other, _) => {
                return Err(SubmitterError::InvalidInput(format!(
                    "unknown Counter method {:?}",
                    other
                )))
            }
        };
        Ok(method)
    }

    pub fn name(&self) -> &'static str {
        match self {
            CounterMethod::Increment => "increment",
            CounterMethod::Decrement => "decrement",
            CounterMethod::IncrementBy(_) => "incrementBy",
            CounterMethod::Reset => "reset",
        }
    }

    /// ABI-encoded call data
    pub fn encode(&self) -> Bytes {
        let data = match self {
            CounterMethod::Increment => incrementCall {}.abi_encode(),
            CounterMethod::Decrement => decrementCall {}.abi_encode(),
            CounterMethod::IncrementBy(value) => incrementByCall {
                value: to_abi_u256(*value),
            }
            .abi_encode(),
            CounterMethod::Reset => resetCall {}.abi_encode(),
        };
        Bytes::from(data)
    }
}

fn parse_positive(input: &str) -> SubmitterResult<U256> {
    let value = U256::from_dec_str(input.trim())
        .map_err(|e| SubmitterError::InvalidInput(format!("invalid value {:?}: {}", input, e)))?;
    if value.is_zero() {
        return Err(SubmitterError::InvalidInput(
            "value must be positive".to_string(),
        ));
    }
    Ok(value)
}

/// Events emitted by Counter
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CounterEvent {
    Increment { new_value: U256 },
    Decrement { new_value: U256 },
    Reset,
}

/// Log decoder for Counter events
#[derive(Debug, Clone, Copy, Default)]
pub struct CounterDecoder;

impl LogDecoder for CounterDecoder {
    type Event = CounterEvent;

    fn signatures(&self) -> Vec<H256> {
        [
            Increment::SIGNATURE_HASH,
            Decrement::SIGNATURE_HASH,
            Reset::SIGNATURE_HASH,
        ]
        .iter()
        .map(|hash| H256(hash.0))
        .collect()
    }

    fn decode(&self, log: &Log) -> SubmitterResult<Option<CounterEvent>> {
        let Some(topic0) = log.topics.first() else {
            return Ok(None);
        };
        let topics = log.topics.iter().map(|t| B256::from(t.0));
        let data = log.data.as_ref();

        let event = if topic0.0 == Increment::SIGNATURE_HASH.0 {
            let decoded = Increment::decode_raw_log(topics, data, true)
                .map_err(|e| malformed("Increment", log, e))?;
            CounterEvent::Increment {
                new_value: from_abi_u256(decoded.newValue),
            }
        } else if topic0.0 == Decrement::SIGNATURE_HASH.0 {
            let decoded = Decrement::decode_raw_log(topics, data, true)
                .map_err(|e| malformed("Decrement", log, e))?;
            CounterEvent::Decrement {
                new_value: from_abi_u256(decoded.newValue),
            }
        } else if topic0.0 == Reset::SIGNATURE_HASH.0 {
            Reset::decode_raw_log(topics, data, true).map_err(|e| malformed("Reset", log, e))?;
            CounterEvent::Reset
        } else {
            return Ok(None);
        };

        Ok(Some(event))
    }
}

/// A deployed Counter
pub struct Counter {
    address: Address,
    client: Arc<dyn LedgerClient>,
}

impl Counter {
    pub fn new(address: Address, client: Arc<dyn LedgerClient>) -> Self {
        Self { address, client }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Creation bytecode for deploying a fresh Counter, starting at zero
    pub fn creation_bytecode() -> SubmitterResult<Bytes> {
        decode_bytecode(CREATION_CODE)
    }

    /// Current count, read without a transaction
    pub async fn count(&self) -> SubmitterResult<U256> {
        let data = Bytes::from(getCountCall {}.abi_encode());
        let output = self.client.call(self.address, data).await?;

        let decoded = getCountCall::abi_decode_returns(&output, true).map_err(|e| {
            SubmitterError::EventDecoding(format!("getCount returned malformed data: {}", e))
        })?;
        Ok(from_abi_u256(decoded._0))
    }

    /// Counter events from `from_block` onwards
    pub fn events(&self, from_block: u64, to_block: Option<u64>) -> EventQuery<CounterDecoder> {
        EventQuery::for_contract(
            self.client.clone(),
            self.address,
            from_block,
            to_block,
            CounterDecoder,
        )
    }

    /// Counter events carried in a receipt
    pub fn receipt_events(
        receipt: &TransactionReceipt,
    ) -> SubmitterResult<Vec<DecodedEvent<CounterEvent>>> {
        decode_receipt_logs(&CounterDecoder, receipt)
    }
}
