// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

pub mod abi;
pub mod chain_handle;
pub mod config;
pub mod confirmations;
pub mod contracts;
pub mod error;
pub mod federator;
pub mod metered_eth_provider;
pub mod metrics;
pub mod node;
pub mod progress_store;
pub mod retry;
pub mod scheduler;
pub mod transaction_sender;
pub mod types;

#[cfg(test)]
pub mod eth_mock_provider;

#[cfg(test)]
pub mod test_utils;

#[macro_export]
macro_rules! retry_with_max_elapsed_time {
    ($func:expr, $max_elapsed_time:expr) => {{
        // The following delay sequence (in secs) will be used, applied with jitter
        // 0.4, 0.8, 1.6, 3.2, 6.4, 12.8, 25.6, 30, 60, 120, 120 ...
        let backoff = backoff::ExponentialBackoff {
            initial_interval: Duration::from_millis(400),
            randomization_factor: 0.1,
            multiplier: 2.0,
            max_interval: Duration::from_secs(120),
            max_elapsed_time: Some($max_elapsed_time),
            ..Default::default()
        };
        backoff::future::retry(backoff, || {
            let fut = async {
                let result = $func.await;
                match result {
                    Ok(_) => {
                        return Ok(result);
                    }
                    Err(e) => {
                        // Every error is retried until max_elapsed_time runs out
                        tracing::debug!("Retrying due to error: {:?}", e);
                        return Err(backoff::Error::transient(e));
                    }
                }
            };
            std::boxed::Box::pin(fut)
        })
        .await
    }};
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    async fn connect_ok() -> anyhow::Result<()> {
        Ok(())
    }

    async fn connect_refused(attempts: &AtomicUsize) -> anyhow::Result<()> {
        attempts.fetch_add(1, Ordering::SeqCst);
        Err(anyhow::anyhow!("connection refused"))
    }

    #[tokio::test]
    async fn test_retry_with_max_elapsed_time() {
        // No retry is needed, returns well within a very small max_elapsed_time.
        let max_elapsed_time = Duration::from_millis(20);
        retry_with_max_elapsed_time!(connect_ok(), max_elapsed_time)
            .unwrap()
            .unwrap();

        // A function that always errors returns before max_elapsed_time runs out.
        let attempts = AtomicUsize::new(0);
        let max_elapsed_time = Duration::from_secs(2);
        let instant = std::time::Instant::now();
        retry_with_max_elapsed_time!(connect_refused(&attempts), max_elapsed_time).unwrap_err();
        assert!(instant.elapsed() < max_elapsed_time * 2);
        assert!(attempts.load(Ordering::SeqCst) > 1);
    }
}
