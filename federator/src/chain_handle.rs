// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::config::ChainConfig;
use crate::error::{FederatorError, FederatorResult};
use crate::metered_eth_provider::{new_metered_eth_provider, MeteredEthHttpProvider};
use crate::metrics::FederatorMetrics;
use crate::retry::RetryPolicy;
use async_trait::async_trait;
use ethers::providers::{JsonRpcClient, Middleware, Provider};
use ethers::types::SyncingStatus;
use std::sync::Arc;
use tap::TapFallible;
use tokio::sync::OnceCell;

/// Chain level queries the federator needs, independent of any contract.
#[async_trait]
pub trait ChainReader: Send + Sync {
    fn name(&self) -> &str;

    async fn chain_id(&self) -> FederatorResult<u64>;

    async fn block_number(&self) -> FederatorResult<u64>;

    async fn is_syncing(&self) -> FederatorResult<bool>;
}

/// Connection to one chain's JSON-RPC node.
pub struct ChainHandle<P> {
    name: String,
    provider: Arc<Provider<P>>,
    expected_chain_id: Option<u64>,
    chain_id: OnceCell<u64>,
    retry: RetryPolicy,
}

impl ChainHandle<MeteredEthHttpProvider> {
    pub async fn connect(
        config: &ChainConfig,
        retry: RetryPolicy,
        metrics: Arc<FederatorMetrics>,
    ) -> anyhow::Result<Self> {
        let provider = new_metered_eth_provider(&config.host, &config.name, metrics)?;
        let handle = Self::new(&config.name, provider, Some(config.chain_id), retry);
        handle.describe().await?;
        Ok(handle)
    }
}

impl<P> ChainHandle<P>
where
    P: JsonRpcClient + 'static,
{
    pub fn new(
        name: &str,
        provider: Provider<P>,
        expected_chain_id: Option<u64>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            name: name.to_string(),
            provider: Arc::new(provider),
            expected_chain_id,
            chain_id: OnceCell::new(),
            retry,
        }
    }

    pub fn provider(&self) -> Arc<Provider<P>> {
        self.provider.clone()
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    // Validate chain identifier and log connection info
    pub async fn describe(&self) -> FederatorResult<()> {
        let chain_id = self.chain_id().await?;
        let block_number = self.block_number().await?;
        if let Some(expected) = self.expected_chain_id {
            if chain_id != expected {
                return Err(FederatorError::ConfigError(format!(
                    "[{}] Chain ID mismatch: expected {}, got {}",
                    self.name, expected, chain_id
                )));
            }
        }
        tracing::info!(
            "[{}] Connected to chain {}, current block: {}",
            self.name,
            chain_id,
            block_number
        );
        Ok(())
    }
}

#[async_trait]
impl<P> ChainReader for ChainHandle<P>
where
    P: JsonRpcClient + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn chain_id(&self) -> FederatorResult<u64> {
        self.chain_id
            .get_or_try_init(|| async {
                self.retry
                    .retry("eth_chainId", || async {
                        let id = self.provider.get_chainid().await?;
                        Ok::<_, FederatorError>(id.as_u64())
                    })
                    .await
                    .map_err(FederatorError::from)
            })
            .await
            .copied()
            .tap_err(|e| tracing::error!("[{}] Failed to get chain id: {:?}", self.name, e))
    }

    async fn block_number(&self) -> FederatorResult<u64> {
        self.retry
            .retry("eth_blockNumber", || async {
                Ok::<_, FederatorError>(self.provider.get_block_number().await?.as_u64())
            })
            .await
            .map_err(FederatorError::from)
            .tap_err(|e| tracing::error!("[{}] Failed to get block number: {:?}", self.name, e))
    }

    async fn is_syncing(&self) -> FederatorResult<bool> {
        let status = self
            .retry
            .retry("eth_syncing", || async {
                Ok::<_, FederatorError>(self.provider.syncing().await?)
            })
            .await?;
        match status {
            SyncingStatus::IsFalse => Ok(false),
            other => {
                tracing::warn!(
                    "[{}] Node is syncing: {:?}, votes wait until it catches up",
                    self.name,
                    other
                );
                Ok(true)
            }
        }
    }
}
