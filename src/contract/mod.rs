//! Contract bindings
//!
//! Bindings only encode call data and decode results; submission goes through
//! [`TransactionSubmitter`](crate::tx::TransactionSubmitter) like any other
//! transaction.

pub mod counter;

pub use counter::{Counter, CounterDecoder, CounterEvent, CounterMethod};

use crate::error::{SubmitterError, SubmitterResult};

use alloy_primitives::U256 as AbiU256;
use ethers::types::{Bytes, U256};

/// Parse hex creation bytecode; the `0x` prefix and surrounding whitespace
/// are optional
pub fn decode_bytecode(text: &str) -> SubmitterResult<Bytes> {
    let text = text.trim();
    let code = hex::decode(text.strip_prefix("0x").unwrap_or(text))
        .map_err(|e| SubmitterError::InvalidInput(format!("bytecode is not hex: {}", e)))?;
    if code.is_empty() {
        return Err(SubmitterError::InvalidInput("bytecode is empty".to_string()));
    }
    Ok(Bytes::from(code))
}

/// Convert to the ABI encoder's integer type
pub(crate) fn to_abi_u256(value: U256) -> AbiU256 {
    let mut bytes = [0u8; 32];
    value.to_big_endian(&mut bytes);
    AbiU256::from_be_bytes(bytes)
}

/// Convert from the ABI encoder's integer type
pub(crate) fn from_abi_u256(value: AbiU256) -> U256 {
    U256::from_big_endian(&value.to_be_bytes::<32>())
}
