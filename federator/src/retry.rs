// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Bounded retry policy for fallible async calls.
//!
//! Unlike `retry_with_max_elapsed_time!`, which bounds by wall-clock time,
//! `RetryPolicy` bounds by attempt count and reports running out of
//! attempts as [`RetryError::Exhausted`], distinct from success and from an
//! error that was never worth retrying.

use crate::error::FederatorError;
use backoff::backoff::{Backoff, Constant};
use backoff::ExponentialBackoff;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

/// Errors that know whether another attempt can help.
pub trait Retryable {
    fn is_transient(&self) -> bool;
}

impl Retryable for FederatorError {
    fn is_transient(&self) -> bool {
        FederatorError::is_transient(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RetryBackoff {
    Fixed,
    Exponential { multiplier: f64, max_interval_ms: u64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RetryPolicy {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_backoff")]
    pub backoff: RetryBackoff,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_interval_ms() -> u64 {
    1_000
}

fn default_backoff() -> RetryBackoff {
    RetryBackoff::Fixed
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            interval_ms: default_interval_ms(),
            backoff: default_backoff(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryError<E> {
    /// Every attempt failed with a transient error.
    Exhausted { attempts: u32, last_error: E },
    /// The operation failed with an error that is not retried.
    Aborted(E),
}

impl<E> RetryError<E> {
    pub fn into_inner(self) -> E {
        match self {
            RetryError::Exhausted { last_error, .. } => last_error,
            RetryError::Aborted(e) => e,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, RetryError::Exhausted { .. })
    }
}

impl From<RetryError<FederatorError>> for FederatorError {
    fn from(err: RetryError<FederatorError>) -> Self {
        err.into_inner()
    }
}

/// Stops the wrapped backoff after a fixed number of retries.
struct Bounded<B> {
    inner: B,
    retries: u32,
    remaining: u32,
}

impl<B: Backoff> Backoff for Bounded<B> {
    fn next_backoff(&mut self) -> Option<Duration> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        self.inner.next_backoff()
    }

    fn reset(&mut self) {
        self.remaining = self.retries;
        self.inner.reset();
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval_ms: interval.as_millis() as u64,
            backoff: RetryBackoff::Fixed,
        }
    }

    pub fn with_backoff(mut self, backoff: RetryBackoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    fn backoff(&self) -> Box<dyn Backoff + Send> {
        let retries = self.max_attempts.max(1) - 1;
        match self.backoff {
            RetryBackoff::Fixed => Box::new(Bounded {
                inner: Constant::new(self.interval()),
                retries,
                remaining: retries,
            }),
            RetryBackoff::Exponential {
                multiplier,
                max_interval_ms,
            } => Box::new(Bounded {
                inner: ExponentialBackoff {
                    current_interval: self.interval(),
                    initial_interval: self.interval(),
                    randomization_factor: 0.0,
                    multiplier,
                    max_interval: Duration::from_millis(max_interval_ms),
                    max_elapsed_time: None,
                    ..Default::default()
                },
                retries,
                remaining: retries,
            }),
        }
    }

    /// Runs `op` until it succeeds, fails with a non transient error, or
    /// `max_attempts` attempts have failed.
    pub async fn retry<T, E, F, Fut>(&self, label: &str, mut op: F) -> Result<T, RetryError<E>>
    where
        E: Retryable + Debug,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let attempts = AtomicU32::new(0);
        let result = backoff::future::retry_notify(
            self.backoff(),
            || {
                attempts.fetch_add(1, Ordering::Relaxed);
                let fut = op();
                async move {
                    fut.await.map_err(|e| {
                        if e.is_transient() {
                            backoff::Error::transient(e)
                        } else {
                            backoff::Error::permanent(e)
                        }
                    })
                }
            },
            |e: E, wait: Duration| {
                tracing::warn!("[{}] attempt failed, retrying in {:?}: {:?}", label, wait, e);
            },
        )
        .await;

        result.map_err(|e| {
            let attempts = attempts.load(Ordering::Relaxed);
            if e.is_transient() && attempts >= self.max_attempts.max(1) {
                tracing::error!("[{}] giving up after {} attempts: {:?}", label, attempts, e);
                RetryError::Exhausted {
                    attempts,
                    last_error: e,
                }
            } else {
                RetryError::Aborted(e)
            }
        })
    }
}
