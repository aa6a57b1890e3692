//! Execution-layer reader backed by `alloy` HTTP providers

use std::future::Future;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;

use alloy::eips::BlockNumberOrTag;
use alloy::primitives::Address;
use alloy::primitives::Bytes;
use alloy::providers::DynProvider;
use alloy::providers::Provider;
use alloy::providers::ProviderBuilder;
use alloy::rpc::types::TransactionRequest;
use alloy::transports::http::reqwest::Url;
use alloy::transports::TransportError;
use async_trait::async_trait;
use tracing::debug;
use tracing::warn;

use super::BlockRef;
use super::BlockTag;
use super::ChainReader;
use crate::config::AppConfig;
use crate::errors::ChainError;
use crate::Result;
use crate::StakeKeysError;

/// JSON-RPC error code used by nodes for reverted calls
const EXECUTION_REVERTED_CODE: i64 = 3;

struct Endpoint {
    url: String,
    provider: DynProvider,
}

/// [`ChainReader`] that fails over across several JSON-RPC endpoints.
///
/// Every request is bounded by `timeout`. Transport failures and timeouts move
/// on to the next endpoint; reverts and decode failures are returned as-is
/// since another node would answer the same.
pub struct AlloyChainReader {
    endpoints: Vec<Endpoint>,
    timeout: Duration,
    preferred: AtomicUsize,
}

impl AlloyChainReader {
    pub fn new(urls: &[String], timeout: Duration) -> Result<Self> {
        if urls.is_empty() {
            return Err(StakeKeysError::ConfigError(
                "at least one execution-layer endpoint is required".to_string(),
            ));
        }

        let endpoints = urls
            .iter()
            .map(|url| {
                let parsed: Url = url.parse().map_err(|e| {
                    StakeKeysError::ConfigError(format!("invalid RPC URL {url}: {e}"))
                })?;
                Ok(Endpoint {
                    url: url.clone(),
                    provider: ProviderBuilder::new().connect_http(parsed).erased(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            endpoints,
            timeout,
            preferred: AtomicUsize::new(0),
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Self::new(&config.chain.el_rpc_urls, config.request_timeout())
    }

    async fn with_failover<T, F, Fut>(&self, op: &str, f: F) -> std::result::Result<T, ChainError>
    where
        F: Fn(DynProvider) -> Fut,
        Fut: Future<Output = std::result::Result<T, TransportError>>,
    {
        let start = self.preferred.load(Ordering::Relaxed);
        let mut last_error = None;

        for offset in 0..self.endpoints.len() {
            let idx = (start + offset) % self.endpoints.len();
            let endpoint = &self.endpoints[idx];

            let outcome = match tokio::time::timeout(self.timeout, f(endpoint.provider.clone()))
                .await
            {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(e)) => Err(classify_transport_error(&endpoint.url, &e)),
                Err(_) => Err(ChainError::Timeout(self.timeout)),
            };

            match outcome {
                Ok(value) => {
                    if idx != start {
                        debug!("Switching preferred RPC endpoint to {}", endpoint.url);
                        self.preferred.store(idx, Ordering::Relaxed);
                    }
                    return Ok(value);
                }
                Err(e) if e.is_transient() => {
                    warn!("{} failed on {}: {}", op, endpoint.url, e);
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| ChainError::Transport {
            endpoint: "<none>".to_string(),
            message: format!("{op}: no endpoints configured"),
        }))
    }
}

fn classify_transport_error(endpoint: &str, error: &TransportError) -> ChainError {
    if let Some(payload) = error.as_error_resp() {
        if payload.code == EXECUTION_REVERTED_CODE || payload.message.contains("revert") {
            return ChainError::Revert(payload.message.to_string());
        }
    }
    ChainError::Transport {
        endpoint: endpoint.to_string(),
        message: error.to_string(),
    }
}

#[async_trait]
impl ChainReader for AlloyChainReader {
    async fn chain_id(&self) -> std::result::Result<u64, ChainError> {
        self.with_failover("eth_chainId", |provider| async move {
            provider.get_chain_id().await
        })
        .await
    }

    async fn block(&self, tag: BlockTag) -> std::result::Result<BlockRef, ChainError> {
        let block = self
            .with_failover("eth_getBlock", |provider| async move {
                match tag {
                    BlockTag::Latest => {
                        provider.get_block_by_number(BlockNumberOrTag::Latest).await
                    }
                    BlockTag::Safe => provider.get_block_by_number(BlockNumberOrTag::Safe).await,
                    BlockTag::Finalized => {
                        provider
                            .get_block_by_number(BlockNumberOrTag::Finalized)
                            .await
                    }
                    BlockTag::Number(number) => {
                        provider
                            .get_block_by_number(BlockNumberOrTag::Number(number))
                            .await
                    }
                    BlockTag::Hash(hash) => provider.get_block_by_hash(hash).await,
                }
            })
            .await?
            .ok_or_else(|| ChainError::NotFound(format!("block {tag:?}")))?;

        Ok(BlockRef {
            number: block.header.number,
            hash: block.header.hash,
            timestamp: block.header.timestamp,
        })
    }

    async fn call(
        &self,
        contract: Address,
        calldata: Bytes,
        tag: BlockTag,
    ) -> std::result::Result<Bytes, ChainError> {
        let block_id = tag.to_block_id();
        self.with_failover("eth_call", |provider| {
            let request = TransactionRequest::default()
                .to(contract)
                .input(calldata.clone().into());
            async move { provider.call(request).block(block_id).await }
        })
        .await
    }
}
