// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::error::{FederatorError, FederatorResult};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Runs a job to completion, sleeps `interval`, and repeats. Ticks missed
/// while the job runs are not made up.
pub struct Scheduler {
    interval: Duration,
    running: Arc<AtomicBool>,
    cancel: Mutex<CancellationToken>,
}

impl Scheduler {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            running: Arc::new(AtomicBool::new(false)),
            cancel: Mutex::new(CancellationToken::new()),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// The returned handle resolves once the loop is stopped, or with the
    /// first error the job returns.
    pub fn start<F, Fut>(&self, mut job: F) -> FederatorResult<JoinHandle<FederatorResult<()>>>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = FederatorResult<()>> + Send + 'static,
    {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(FederatorError::InternalError(
                "Scheduler is already running".to_string(),
            ));
        }
        let cancel = CancellationToken::new();
        *self
            .cancel
            .lock()
            .map_err(|e| FederatorError::InternalError(e.to_string()))? = cancel.clone();
        let running = self.running.clone();
        let interval = self.interval;
        Ok(tokio::spawn(async move {
            let result = loop {
                if let Err(e) = job().await {
                    tracing::error!("Scheduled job failed, stopping: {:?}", e);
                    break Err(e);
                }
                tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::info!("Scheduler stopped");
                        break Ok(());
                    }
                    _ = tokio::time::sleep(interval) => {}
                }
            };
            running.store(false, Ordering::SeqCst);
            result
        }))
    }

    /// Cancels the pending sleep. A job already running completes first.
    pub fn stop(&self) {
        if let Ok(cancel) = self.cancel.lock() {
            cancel.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counting_job(
        calls: Arc<AtomicUsize>,
        fail_on: Option<usize>,
    ) -> impl FnMut() -> std::pin::Pin<Box<dyn Future<Output = FederatorResult<()>> + Send>> {
        move || {
            let calls = calls.clone();
            Box::pin(async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if fail_on == Some(n) {
                    return Err(FederatorError::NotFederationMember(Default::default()));
                }
                Ok(())
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_job_repeats_every_interval() {
        let calls = Arc::new(AtomicUsize::new(0));
        let scheduler = Scheduler::new(Duration::from_secs(60));
        let handle = scheduler.start(counting_job(calls.clone(), None)).unwrap();

        tokio::time::sleep(Duration::from_secs(150)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(scheduler.is_running());

        scheduler.stop();
        assert_eq!(handle.await.unwrap(), Ok(()));
        assert!(!scheduler.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_twice_is_rejected() {
        let scheduler = Scheduler::new(Duration::from_secs(60));
        let handle = scheduler
            .start(counting_job(Arc::new(AtomicUsize::new(0)), None))
            .unwrap();
        assert!(matches!(
            scheduler.start(counting_job(Arc::new(AtomicUsize::new(0)), None)),
            Err(FederatorError::InternalError(_))
        ));
        scheduler.stop();
        handle.await.unwrap().unwrap();

        // Startable again once stopped.
        let handle = scheduler
            .start(counting_job(Arc::new(AtomicUsize::new(0)), None))
            .unwrap();
        scheduler.stop();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_job_error_ends_loop() {
        let calls = Arc::new(AtomicUsize::new(0));
        let scheduler = Scheduler::new(Duration::from_secs(1));
        let handle = scheduler.start(counting_job(calls.clone(), Some(3))).unwrap();

        let result = handle.await.unwrap();
        assert_eq!(
            result,
            Err(FederatorError::NotFederationMember(Default::default()))
        );
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(!scheduler.is_running());
    }
}
