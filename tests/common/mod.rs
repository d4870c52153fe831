//! In-memory ledger for integration tests
//!
//! Enforces per-address nonces, balances and the network id the way a node's
//! transaction pool does, and hosts a single Counter contract. Accepted
//! transactions are applied at once; their receipts become visible after a
//! configurable inclusion delay measured on the tokio clock.

#![allow(dead_code)]

use async_trait::async_trait;
use ethers::types::{Address, Bytes, Filter, Log, H256, U256, U64};
use ethers::utils::keccak256;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

use tesseract_submitter::chain::{ExecutionStatus, LedgerClient, TransactionReceipt};
use tesseract_submitter::contract::CounterMethod;
use tesseract_submitter::error::{SubmitterError, SubmitterResult};
use tesseract_submitter::tx::{content_hash, Signer};

pub const NETWORK_ID: u64 = 11_155_111;

/// Well-known development key (hardhat/anvil account 0)
pub const DEV_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

pub const RECIPIENT: &str = "0xAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA";

pub const GWEI: u64 = 1_000_000_000;

pub fn ether(whole: u64) -> U256 {
    U256::from(whole) * U256::exp10(18)
}

struct IncludedTransaction {
    from: Address,
    nonce: u64,
    receipt: TransactionReceipt,
    visible_at: Option<Instant>,
}

#[derive(Default)]
struct LedgerState {
    balances: HashMap<Address, U256>,
    nonces: HashMap<Address, u64>,
    transactions: HashMap<H256, IncludedTransaction>,
    known: HashSet<H256>,
    counter_value: U256,
    logs: Vec<Log>,
    block: u64,
}

pub struct SimulatedLedger {
    network_id: u64,
    fee: U256,
    /// `None` keeps every transaction pending forever
    inclusion_delay: Option<Duration>,
    counter: Address,
    state: Mutex<LedgerState>,
    receipt_queries: AtomicUsize,
    broadcasts: AtomicUsize,
}

impl SimulatedLedger {
    pub fn new() -> Self {
        Self {
            network_id: NETWORK_ID,
            fee: U256::from(GWEI),
            inclusion_delay: Some(Duration::ZERO),
            counter: Address::repeat_byte(0xc0),
            state: Mutex::new(LedgerState {
                block: 100,
                ..Default::default()
            }),
            receipt_queries: AtomicUsize::new(0),
            broadcasts: AtomicUsize::new(0),
        }
    }

    pub fn with_inclusion_delay(mut self, delay: Option<Duration>) -> Self {
        self.inclusion_delay = delay;
        self
    }

    pub fn fund(self, address: Address, amount: U256) -> Self {
        self.state.lock().unwrap().balances.insert(address, amount);
        self
    }

    pub fn with_nonce(self, address: Address, nonce: u64) -> Self {
        self.state.lock().unwrap().nonces.insert(address, nonce);
        self
    }

    pub fn counter_address(&self) -> Address {
        self.counter
    }

    pub fn counter_value(&self) -> U256 {
        self.state.lock().unwrap().counter_value
    }

    pub fn balance_of(&self, address: Address) -> U256 {
        self.state
            .lock()
            .unwrap()
            .balances
            .get(&address)
            .copied()
            .unwrap_or_default()
    }

    pub fn nonce_of(&self, address: Address) -> u64 {
        self.state
            .lock()
            .unwrap()
            .nonces
            .get(&address)
            .copied()
            .unwrap_or_default()
    }

    pub fn receipt_queries(&self) -> usize {
        self.receipt_queries.load(Ordering::SeqCst)
    }

    pub fn broadcasts(&self) -> usize {
        self.broadcasts.load(Ordering::SeqCst)
    }

    pub fn transaction_count(&self) -> usize {
        self.state.lock().unwrap().transactions.len()
    }

    /// Drop an accepted transaction from the pool, as a node does on eviction
    /// or reorg; the sender's next nonce falls back to it
    pub fn evict(&self, tx_hash: H256) {
        let mut state = self.state.lock().unwrap();
        if let Some(evicted) = state.transactions.remove(&tx_hash) {
            state.known.remove(&tx_hash);
            state.nonces.insert(evicted.from, evicted.nonce);
        }
    }

    /// Run the Counter method in `payload`; `false` means the call reverts
    fn execute_counter(
        state: &mut LedgerState,
        payload: &[u8],
    ) -> (bool, Option<(&'static str, Option<U256>)>) {
        if payload == &CounterMethod::Increment.encode()[..] {
            state.counter_value += U256::one();
            (true, Some(("Increment(uint256)", Some(state.counter_value))))
        } else if payload == &CounterMethod::Decrement.encode()[..] {
            if state.counter_value.is_zero() {
                return (false, None);
            }
            state.counter_value -= U256::one();
            (true, Some(("Decrement(uint256)", Some(state.counter_value))))
        } else if payload == &CounterMethod::Reset.encode()[..] {
            state.counter_value = U256::zero();
            (true, Some(("Reset()", None)))
        } else if payload.len() == 36
            && payload[..4] == CounterMethod::IncrementBy(U256::one()).encode()[..4]
        {
            state.counter_value += U256::from_big_endian(&payload[4..]);
            (true, Some(("Increment(uint256)", Some(state.counter_value))))
        } else {
            (false, None)
        }
    }
}

fn word(value: U256) -> Bytes {
    let mut bytes = [0u8; 32];
    value.to_big_endian(&mut bytes);
    Bytes::from(bytes.to_vec())
}

#[async_trait]
impl LedgerClient for SimulatedLedger {
    async fn chain_id(&self) -> SubmitterResult<u64> {
        Ok(self.network_id)
    }

    async fn pending_nonce(&self, address: Address) -> SubmitterResult<u64> {
        Ok(self.nonce_of(address))
    }

    async fn suggested_fee(&self) -> SubmitterResult<U256> {
        Ok(self.fee)
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> SubmitterResult<H256> {
        self.broadcasts.fetch_add(1, Ordering::SeqCst);

        let decoded = Signer::decode(&raw).map_err(|e| SubmitterError::rejected(e.to_string()))?;
        if decoded.network_id != self.network_id {
            return Err(SubmitterError::rejected("invalid chain id for signer"));
        }

        let tx = decoded.transaction;
        let hash = content_hash(&raw);
        let mut state = self.state.lock().unwrap();

        if state.known.contains(&hash) {
            return Err(SubmitterError::rejected("already known"));
        }

        let expected = state.nonces.get(&tx.from).copied().unwrap_or_default();
        if tx.nonce < expected {
            return Err(SubmitterError::rejected(format!(
                "nonce too low: next nonce {}, tx nonce {}",
                expected, tx.nonce
            )));
        }
        if tx.nonce > expected {
            return Err(SubmitterError::rejected(format!(
                "nonce too high: next nonce {}, tx nonce {}",
                expected, tx.nonce
            )));
        }

        let balance = state.balances.get(&tx.from).copied().unwrap_or_default();
        if balance < tx.max_cost() {
            return Err(SubmitterError::rejected(format!(
                "insufficient funds for gas * price + value: balance {}, tx cost {}",
                balance,
                tx.max_cost()
            )));
        }

        state.known.insert(hash);
        state.nonces.insert(tx.from, expected + 1);
        state.block += 1;
        let block = state.block;

        let gas_used = U256::from(tx.gas_limit);
        let fee = gas_used * tx.fee_per_unit;
        let mut status = ExecutionStatus::Success;
        let mut logs = Vec::new();
        let mut contract_address = None;

        match tx.to {
            Some(to) if to == self.counter && tx.payload.is_some() => {
                let payload = tx.payload.clone().unwrap_or_default();
                let (ok, event) = Self::execute_counter(&mut state, &payload);
                if ok {
                    if let Some((signature, value)) = event {
                        logs.push(Log {
                            address: self.counter,
                            topics: vec![H256(keccak256(signature))],
                            data: value.map(word).unwrap_or_default(),
                            block_number: Some(U64::from(block)),
                            transaction_hash: Some(hash),
                            ..Default::default()
                        });
                    }
                } else {
                    status = ExecutionStatus::Reverted;
                }
            }
            Some(to) => {
                *state.balances.entry(to).or_default() += tx.value;
            }
            None => {
                contract_address = Some(ethers::utils::get_contract_address(tx.from, tx.nonce));
            }
        }

        let debit = if status == ExecutionStatus::Success {
            fee + tx.value
        } else {
            fee
        };
        if let Some(from) = state.balances.get_mut(&tx.from) {
            *from -= debit;
        }
        state.logs.extend(logs.iter().cloned());

        let receipt = TransactionReceipt {
            transaction_id: hash,
            included_in_block: block,
            status,
            resource_used: Some(gas_used),
            contract_address,
            logs,
        };
        state.transactions.insert(
            hash,
            IncludedTransaction {
                from: tx.from,
                nonce: tx.nonce,
                receipt,
                visible_at: self.inclusion_delay.map(|delay| Instant::now() + delay),
            },
        );

        Ok(hash)
    }

    async fn transaction_receipt(
        &self,
        tx_hash: H256,
    ) -> SubmitterResult<Option<TransactionReceipt>> {
        self.receipt_queries.fetch_add(1, Ordering::SeqCst);

        let state = self.state.lock().unwrap();
        Ok(state.transactions.get(&tx_hash).and_then(|included| {
            match included.visible_at {
                Some(at) if Instant::now() >= at => Some(included.receipt.clone()),
                _ => None,
            }
        }))
    }

    async fn logs(&self, filter: &Filter) -> SubmitterResult<Vec<Log>> {
        let state = self.state.lock().unwrap();
        let from_block = filter
            .get_from_block()
            .map(|b| b.as_u64())
            .unwrap_or_default();

        Ok(state
            .logs
            .iter()
            .filter(|log| log.block_number.map_or(false, |b| b.as_u64() >= from_block))
            .cloned()
            .collect())
    }

    async fn call(&self, to: Address, data: Bytes) -> SubmitterResult<Bytes> {
        if to != self.counter {
            return Ok(Bytes::new());
        }
        // getCount()
        if data[..] == [0xa8u8, 0x7d, 0x94, 0x2c] {
            Ok(word(self.counter_value()))
        } else {
            Err(SubmitterError::Network("execution reverted".to_string()))
        }
    }

    async fn balance(&self, address: Address) -> SubmitterResult<U256> {
        Ok(self.balance_of(address))
    }
}
