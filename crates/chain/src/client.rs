//! Chain RPC client.
//!
//! Read-only JSON-RPC boundary: `eth_blockNumber`, `eth_getLogs`, and
//! `eth_getBlockByNumber` for timestamps. No write calls originate here.
//! The client is constructed once at process start and injected into each
//! job instance; tests inject fakes implementing [`ChainClient`].

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ethers::providers::{Http, Middleware, Provider};
use ethers::types::{Filter, Log};

use chainwatch_core::config::ChainConfig;

use crate::error::{ChainError, ChainResult};

/// Read-only chain access used by the indexing jobs
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Current chain head block number
    async fn block_number(&self) -> ChainResult<u64>;

    /// Fetch logs matching a filter; errors surface whole, never partial
    async fn get_logs(&self, filter: &Filter) -> ChainResult<Vec<Log>>;

    /// Timestamp of a block
    async fn block_timestamp(&self, block: u64) -> ChainResult<DateTime<Utc>>;
}

/// JSON-RPC backed [`ChainClient`] over an HTTP provider
#[derive(Debug, Clone)]
pub struct RpcClient {
    provider: Provider<Http>,
    request_timeout: Duration,
}

impl RpcClient {
    /// Create a client from chain configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the RPC URL does not parse.
    pub fn new(config: &ChainConfig) -> ChainResult<Self> {
        let provider = Provider::<Http>::try_from(config.rpc_url.as_str())
            .map_err(|e| ChainError::configuration(format!("invalid RPC URL: {e}")))?;

        Ok(Self {
            provider,
            request_timeout: config.request_timeout,
        })
    }

    /// Enforce the configured per-request timeout around an RPC future
    async fn bounded<T>(
        &self,
        operation: &str,
        fut: impl std::future::Future<Output = Result<T, ethers::providers::ProviderError>> + Send,
    ) -> ChainResult<T> {
        match tokio::time::timeout(self.request_timeout, fut).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(ChainError::timeout(operation, self.request_timeout)),
        }
    }
}

#[async_trait]
impl ChainClient for RpcClient {
    async fn block_number(&self) -> ChainResult<u64> {
        let number = self
            .bounded("eth_blockNumber", self.provider.get_block_number())
            .await?;
        Ok(number.as_u64())
    }

    async fn get_logs(&self, filter: &Filter) -> ChainResult<Vec<Log>> {
        self.bounded("eth_getLogs", self.provider.get_logs(filter))
            .await
    }

    async fn block_timestamp(&self, block: u64) -> ChainResult<DateTime<Utc>> {
        let header = self
            .bounded("eth_getBlockByNumber", self.provider.get_block(block))
            .await?
            .ok_or(ChainError::BlockUnavailable { block })?;

        let secs = i64::try_from(header.timestamp.as_u64())
            .map_err(|_| ChainError::rpc("eth_getBlockByNumber", "timestamp out of range"))?;

        DateTime::<Utc>::from_timestamp(secs, 0)
            .ok_or_else(|| ChainError::rpc("eth_getBlockByNumber", "timestamp out of range"))
    }
}
