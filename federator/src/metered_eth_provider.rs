// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::metrics::FederatorMetrics;
use ethers::providers::{Http, HttpClientError, JsonRpcClient, Provider};
use serde::{de::DeserializeOwned, Serialize};
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;
use url::{ParseError, Url};

/// Limits concurrent requests so a burst of receipt polls does not trip
/// provider rate limits.
const MAX_CONCURRENT_REQUESTS: usize = 4;

const MAX_RATE_LIMIT_RETRIES: u32 = 3;

#[derive(Debug, Clone)]
pub struct MeteredEthHttpProvider {
    inner: Http,
    chain: String,
    metrics: Arc<FederatorMetrics>,
    semaphore: Arc<tokio::sync::Semaphore>,
}

fn is_rate_limited<R>(result: &Result<R, HttpClientError>) -> bool {
    match result {
        Err(e) => {
            // Some providers answer {"code":-32005,"message":"Too Many Requests"}
            // which fails deserialization, so match on the rendered error.
            let error_str = format!("{:?}", e).to_lowercase();
            error_str.contains("rate limit")
                || error_str.contains("429")
                || error_str.contains("too many requests")
                || error_str.contains("-32005")
        }
        Ok(_) => false,
    }
}

#[async_trait::async_trait]
impl JsonRpcClient for MeteredEthHttpProvider {
    type Error = HttpClientError;

    async fn request<T: Serialize + Send + Sync + Debug, R: DeserializeOwned + Send>(
        &self,
        method: &str,
        params: T,
    ) -> Result<R, HttpClientError> {
        // The semaphore is owned by this provider and never closed.
        let _permit = self.semaphore.acquire().await.ok();

        self.metrics
            .rpc_queries
            .with_label_values(&[&self.chain, method])
            .inc();
        let _guard = self
            .metrics
            .rpc_queries_latency
            .with_label_values(&[&self.chain, method])
            .start_timer();

        let mut result = self.inner.request(method, &params).await;
        let mut retry_count = 0;
        while retry_count < MAX_RATE_LIMIT_RETRIES && is_rate_limited(&result) {
            // 1s, 2s, 4s
            let backoff_duration = Duration::from_secs(1 << retry_count);
            tracing::warn!(
                "[{}] Rate limited on {}, retrying after {:?} (attempt {}/{})",
                self.chain,
                method,
                backoff_duration,
                retry_count + 1,
                MAX_RATE_LIMIT_RETRIES
            );
            tokio::time::sleep(backoff_duration).await;
            result = self.inner.request(method, &params).await;
            retry_count += 1;
        }

        let connected = self.metrics.node_connected.with_label_values(&[&self.chain]);
        match &result {
            Ok(_) => connected.set(1),
            Err(_) => connected.set(0),
        }
        result
    }
}

impl MeteredEthHttpProvider {
    pub fn new(url: impl Into<Url>, chain: &str, metrics: Arc<FederatorMetrics>) -> Self {
        Self {
            inner: Http::new(url),
            chain: chain.to_string(),
            metrics,
            semaphore: Arc::new(tokio::sync::Semaphore::new(MAX_CONCURRENT_REQUESTS)),
        }
    }
}

pub fn new_metered_eth_provider(
    url: &str,
    chain: &str,
    metrics: Arc<FederatorMetrics>,
) -> Result<Provider<MeteredEthHttpProvider>, ParseError> {
    let http_provider = MeteredEthHttpProvider::new(Url::parse(url)?, chain, metrics);
    Ok(Provider::new(http_provider))
}
