//! Contract event decoding
//!
//! A [`LogDecoder`] turns raw logs into typed events for one contract.
//! Events come from two places: the logs of a confirmed receipt, and a
//! filtered log query over a block range ([`EventQuery`]).

use crate::chain::{LedgerClient, TransactionReceipt};
use crate::error::{SubmitterError, SubmitterResult};

use ethers::types::{Address, BlockNumber, Filter, Log, ValueOrArray, H256, U256};
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// Decodes the raw logs of one contract
pub trait LogDecoder: Send + Sync {
    type Event;

    /// Topic-0 hashes of every event this decoder understands
    fn signatures(&self) -> Vec<H256>;

    /// Decode `log`.
    ///
    /// `Ok(None)` means the log is not one of ours; a log with a known
    /// signature but malformed data is an `EventDecoding` error.
    fn decode(&self, log: &Log) -> SubmitterResult<Option<Self::Event>>;
}

/// A decoded event and where it was emitted
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodedEvent<E> {
    pub event: E,
    pub address: Address,
    pub block_number: Option<u64>,
    pub tx_hash: Option<H256>,
    pub log_index: Option<U256>,
}

impl<E> DecodedEvent<E> {
    fn from_log(event: E, log: &Log) -> Self {
        Self {
            event,
            address: log.address,
            block_number: log.block_number.map(|b| b.as_u64()),
            tx_hash: log.transaction_hash,
            log_index: log.log_index,
        }
    }
}

/// Decode the events `decoder` recognises among a receipt's logs, in log order
pub fn decode_receipt_logs<D: LogDecoder>(
    decoder: &D,
    receipt: &TransactionReceipt,
) -> SubmitterResult<Vec<DecodedEvent<D::Event>>> {
    let mut events = Vec::new();
    for log in &receipt.logs {
        if let Some(event) = decoder.decode(log)? {
            events.push(DecodedEvent::from_log(event, log));
        }
    }
    Ok(events)
}

/// A filtered event query that can be run any number of times.
///
/// Each [`fetch`](EventQuery::fetch) issues one log query; the returned
/// iterator decodes lazily as it is advanced and ends with the result set.
pub struct EventQuery<D> {
    client: Arc<dyn LedgerClient>,
    filter: Filter,
    decoder: D,
}

impl<D: LogDecoder> EventQuery<D> {
    pub fn new(client: Arc<dyn LedgerClient>, filter: Filter, decoder: D) -> Self {
        Self {
            client,
            filter,
            decoder,
        }
    }

    /// Events of `contract` known to `decoder`, from `from_block` to `to_block`
    /// (latest when `None`)
    pub fn for_contract(
        client: Arc<dyn LedgerClient>,
        contract: Address,
        from_block: u64,
        to_block: Option<u64>,
        decoder: D,
    ) -> Self {
        let topics: Vec<Option<H256>> = decoder.signatures().into_iter().map(Some).collect();
        let to_block = to_block.map_or(BlockNumber::Latest, BlockNumber::from);

        let filter = Filter::new()
            .address(contract)
            .from_block(from_block)
            .to_block(to_block)
            .topic0(ValueOrArray::Array(topics));

        Self::new(client, filter, decoder)
    }

    pub fn filter(&self) -> &Filter {
        &self.filter
    }

    /// Run the query; calling again restarts from the first matching log
    pub async fn fetch(&self) -> SubmitterResult<EventIter<'_, D>> {
        let logs = self.client.logs(&self.filter).await?;
        debug!("Event query returned {} logs", logs.len());

        Ok(EventIter {
            decoder: &self.decoder,
            logs: logs.into_iter(),
        })
    }

    /// Run the query and decode everything
    pub async fn collect(&self) -> SubmitterResult<Vec<DecodedEvent<D::Event>>> {
        self.fetch().await?.collect()
    }
}

/// Lazily decoded result set of one [`EventQuery::fetch`]
pub struct EventIter<'a, D: LogDecoder> {
    decoder: &'a D,
    logs: std::vec::IntoIter<Log>,
}

impl<'a, D: LogDecoder> Iterator for EventIter<'a, D> {
    type Item = SubmitterResult<DecodedEvent<D::Event>>;

    fn next(&mut self) -> Option<Self::Item> {
        for log in self.logs.by_ref() {
            match self.decoder.decode(&log) {
                Ok(Some(event)) => return Some(Ok(DecodedEvent::from_log(event, &log))),
                Ok(None) => continue,
                Err(e) => return Some(Err(e)),
            }
        }
        None
    }
}

/// Shorthand for decoders reporting a malformed log
pub(crate) fn malformed(name: &str, log: &Log, detail: impl std::fmt::Display) -> SubmitterError {
    SubmitterError::EventDecoding(format!(
        "{} log at {:?} is malformed: {}",
        name, log.transaction_hash, detail
    ))
}
