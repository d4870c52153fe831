//! Chain provider with multi-RPC support and automatic read failover

use super::{LedgerClient, TransactionReceipt};
use crate::config::NetworkConfig;
use crate::error::{RejectionReason, SubmitterError, SubmitterResult};

use async_trait::async_trait;
use ethers::providers::{Http, Middleware, Provider, ProviderError, RpcError};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{
    Address, BlockId, BlockNumber, Bytes, Filter, Log, TransactionRequest, H256, U256,
};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Multi-provider wrapper with automatic failover for reads.
///
/// Broadcasts go to the active provider only and are never replayed against
/// another endpoint.
pub struct ChainProvider {
    /// HTTP providers (multiple for failover)
    http_providers: Vec<Provider<Http>>,
    /// Current active provider index
    current_provider: AtomicUsize,
    /// Per-request deadline
    request_timeout: Duration,
}

impl ChainProvider {
    /// Create a new chain provider
    pub fn new(config: &NetworkConfig) -> SubmitterResult<Self> {
        let mut http_providers = Vec::new();

        for url in &config.rpc_urls {
            match Provider::<Http>::try_from(url.as_str()) {
                Ok(provider) => {
                    http_providers.push(provider.interval(Duration::from_millis(100)));
                    debug!("Added HTTP provider: {}", redact(url));
                }
                Err(e) => {
                    warn!("Failed to create provider for {}: {}", redact(url), e);
                }
            }
        }

        if http_providers.is_empty() {
            return Err(SubmitterError::Config("No valid RPC providers".to_string()));
        }

        Ok(Self {
            http_providers,
            current_provider: AtomicUsize::new(0),
            request_timeout: config.request_timeout(),
        })
    }

    /// Connect and check the node reports the expected network id
    pub async fn connect(config: &NetworkConfig) -> SubmitterResult<Self> {
        let provider = Self::new(config)?;
        let chain_id = provider.chain_id().await?;

        if let Some(expected) = config.chain_id {
            if expected != chain_id {
                return Err(SubmitterError::Config(format!(
                    "Chain ID mismatch: expected {}, node reports {}",
                    expected, chain_id
                )));
            }
        }

        info!("Connected to chain {}", chain_id);
        Ok(provider)
    }

    /// Get the active HTTP provider
    pub fn http(&self) -> &Provider<Http> {
        let idx = self.current_provider.load(Ordering::Relaxed);
        &self.http_providers[idx % self.http_providers.len()]
    }

    /// Switch to next available provider
    pub fn failover(&self) {
        let current = self.current_provider.load(Ordering::Relaxed);
        let next = (current + 1) % self.http_providers.len();
        self.current_provider.store(next, Ordering::Relaxed);
        warn!("Failover to provider {}", next);
    }

    /// Run a read against each provider in turn until one answers
    async fn read<T, F, Fut>(&self, operation: &str, f: F) -> SubmitterResult<T>
    where
        F: Fn(Provider<Http>) -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut last_error = String::from("no providers");

        for _ in 0..self.http_providers.len() {
            match timeout(self.request_timeout, f(self.http().clone())).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) => {
                    warn!("{} failed: {}", operation, e);
                    last_error = e.to_string();
                }
                Err(_) => {
                    warn!("{} timed out after {:?}", operation, self.request_timeout);
                    last_error = format!("timed out after {:?}", self.request_timeout);
                }
            }
            self.failover();
        }

        Err(SubmitterError::Network(format!(
            "{}: all providers failed ({})",
            operation, last_error
        )))
    }
}

#[async_trait]
impl LedgerClient for ChainProvider {
    async fn chain_id(&self) -> SubmitterResult<u64> {
        let id = self
            .read("eth_chainId", |p| async move { p.get_chainid().await })
            .await?;
        Ok(id.as_u64())
    }

    async fn pending_nonce(&self, address: Address) -> SubmitterResult<u64> {
        let pending: BlockId = BlockNumber::Pending.into();
        let count = self
            .read("eth_getTransactionCount", |p| async move {
                p.get_transaction_count(address, Some(pending)).await
            })
            .await?;
        Ok(count.as_u64())
    }

    async fn suggested_fee(&self) -> SubmitterResult<U256> {
        self.read("eth_gasPrice", |p| async move { p.get_gas_price().await })
            .await
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> SubmitterResult<H256> {
        let result = timeout(self.request_timeout, self.http().send_raw_transaction(raw)).await;

        match result {
            Ok(Ok(pending)) => Ok(pending.tx_hash()),
            Ok(Err(e)) => Err(classify_send_error(e)),
            Err(_) => Err(SubmitterError::Network(format!(
                "eth_sendRawTransaction timed out after {:?}",
                self.request_timeout
            ))),
        }
    }

    async fn transaction_receipt(
        &self,
        tx_hash: H256,
    ) -> SubmitterResult<Option<TransactionReceipt>> {
        let receipt = timeout(self.request_timeout, self.http().get_transaction_receipt(tx_hash))
            .await
            .map_err(|_| SubmitterError::Network("eth_getTransactionReceipt timed out".into()))?
            .map_err(|e| SubmitterError::Network(e.to_string()))?;

        Ok(receipt.and_then(TransactionReceipt::from_rpc))
    }

    async fn logs(&self, filter: &Filter) -> SubmitterResult<Vec<Log>> {
        self.read("eth_getLogs", |p| {
            let filter = filter.clone();
            async move { p.get_logs(&filter).await }
        })
        .await
    }

    async fn call(&self, to: Address, data: Bytes) -> SubmitterResult<Bytes> {
        let tx: TypedTransaction = TransactionRequest::new().to(to).data(data).into();
        self.read("eth_call", |p| {
            let tx = tx.clone();
            async move { p.call(&tx, None).await }
        })
        .await
    }

    async fn balance(&self, address: Address) -> SubmitterResult<U256> {
        self.read("eth_getBalance", |p| async move {
            p.get_balance(address, None).await
        })
        .await
    }
}

/// Map a broadcast failure onto the error taxonomy.
///
/// Only a JSON-RPC error naming a known validation failure counts as a
/// rejection. Throttling, internal errors and transport failures are network
/// errors.
fn classify_send_error(e: ProviderError) -> SubmitterError {
    match e.as_error_response() {
        Some(response) => classify_error_response(response.code, &response.message),
        None => SubmitterError::Network(e.to_string()),
    }
}

fn classify_error_response(code: i64, message: &str) -> SubmitterError {
    match RejectionReason::recognize(message) {
        Some(reason) => SubmitterError::Rejected {
            reason,
            message: message.to_string(),
        },
        None => SubmitterError::Network(format!("RPC error {}: {}", code, message)),
    }
}

/// Strip path and query from an RPC URL so API keys stay out of logs
fn redact(url: &str) -> String {
    match url.split_once("://") {
        Some((scheme, rest)) => {
            let host = rest.split('/').next().unwrap_or(rest);
            format!("{}://{}", scheme, host)
        }
        None => "<invalid url>".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn network(urls: &[&str]) -> NetworkConfig {
        NetworkConfig {
            rpc_urls: urls.iter().map(|u| u.to_string()).collect(),
            chain_id: None,
            request_timeout_ms: 1_000,
        }
    }

    #[test]
    fn test_only_known_refusals_are_rejections() {
        assert!(matches!(
            classify_error_response(-32000, "nonce too low: next nonce 7, tx nonce 6"),
            SubmitterError::Rejected {
                reason: RejectionReason::StaleNonce,
                ..
            }
        ));
        assert!(matches!(
            classify_error_response(-32000, "intrinsic gas too low"),
            SubmitterError::Rejected {
                reason: RejectionReason::Other,
                ..
            }
        ));

        let throttled = "daily request count exceeded, request rate limited";
        match classify_error_response(-32005, throttled) {
            SubmitterError::Network(detail) => assert!(detail.contains("-32005")),
            other => panic!("expected network error, got {:?}", other),
        }
        assert!(matches!(
            classify_error_response(-32603, "Internal error"),
            SubmitterError::Network(_)
        ));
    }

    #[test]
    fn test_redact_hides_api_key() {
        assert_eq!(
            redact("https://sepolia.infura.io/v3/3bbd17e943844442"),
            "https://sepolia.infura.io"
        );
        assert_eq!(redact("garbage"), "<invalid url>");
    }

    #[test]
    fn test_requires_a_valid_url() {
        assert!(matches!(
            ChainProvider::new(&network(&["not a url"])),
            Err(SubmitterError::Config(_))
        ));
    }

    #[test]
    fn test_failover_wraps_around() {
        let provider =
            ChainProvider::new(&network(&["http://localhost:8545", "http://localhost:8546"]))
                .unwrap();
        assert_eq!(provider.http().url().port(), Some(8545));
        provider.failover();
        assert_eq!(provider.http().url().port(), Some(8546));
        provider.failover();
        assert_eq!(provider.http().url().port(), Some(8545));
    }
}
