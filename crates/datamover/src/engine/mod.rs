//! Concurrent transfer engine.
//!
//! Runs independent units of work (tables, dumps, provisioning steps) on a
//! bounded worker pool, retrying transient failures and honoring
//! cancellation. Every unit produces a [`UnitOutcome`] regardless of how it
//! ended, so a single run yields a complete report.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::future::BoxFuture;
use tokio::sync::Semaphore;
use tokio_retry2::strategy::{jitter, FixedInterval};
use tokio_retry2::{Retry, RetryError};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::{OperationKind, RetryConfig};
use crate::report::{OperationReport, UnitOutcome};
use crate::Result;

/// One retryable unit of work. The closure is invoked once per attempt.
pub struct UnitTask {
    name: String,
    run: Box<dyn Fn() -> BoxFuture<'static, Result<u64>> + Send + Sync>,
}

impl UnitTask {
    pub fn new(
        name: impl Into<String>,
        run: impl Fn() -> BoxFuture<'static, Result<u64>> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            run: Box::new(run),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Worker pool that ships units of work and receives their outcomes.
pub struct ShippingAndReceiving {
    workers: usize,
    retry: RetryConfig,
    cancel: CancellationToken,
}

impl ShippingAndReceiving {
    pub fn new(workers: usize, retry: RetryConfig, cancel: CancellationToken) -> Self {
        Self {
            workers: workers.max(1),
            retry,
            cancel,
        }
    }

    /// Run all units and collect their outcomes in submission order.
    pub async fn run(&self, kind: OperationKind, units: Vec<UnitTask>) -> OperationReport {
        let started_at = Utc::now();
        let semaphore = Arc::new(Semaphore::new(self.workers));

        info!(
            "Running {} with {} unit(s) on {} worker(s)",
            kind,
            units.len(),
            self.workers
        );

        let mut handles = Vec::with_capacity(units.len());
        for unit in units {
            let semaphore = Arc::clone(&semaphore);
            let cancel = self.cancel.clone();
            let retry = self.retry.clone();
            let name = unit.name.clone();

            let handle = tokio::spawn(async move {
                let _permit = tokio::select! {
                    _ = cancel.cancelled() => return UnitOutcome::skipped(unit.name),
                    permit = semaphore.acquire_owned() => match permit {
                        Ok(p) => p,
                        Err(_) => return UnitOutcome::failed(unit.name, "worker pool closed", 0),
                    },
                };
                if cancel.is_cancelled() {
                    return UnitOutcome::skipped(unit.name);
                }

                let start = Instant::now();
                let strategy = FixedInterval::from_millis(retry.base_delay_ms)
                    .map(jitter)
                    .take(retry.max_attempts.saturating_sub(1));

                let unit_name = unit.name.clone();
                let result = Retry::spawn(strategy, || {
                    let fut = (unit.run)();
                    let unit_name = unit_name.clone();
                    async move {
                        match fut.await {
                            Ok(rows) => Ok(rows),
                            Err(e) if e.is_retryable() => {
                                warn!("{}: transient failure, will retry: {}", unit_name, e);
                                RetryError::to_transient(e)
                            }
                            Err(e) => RetryError::to_permanent(e),
                        }
                    }
                })
                .await;

                let duration_ms = start.elapsed().as_millis() as u64;
                match result {
                    Ok(rows) => {
                        info!("{}: done ({} rows, {} ms)", unit.name, rows, duration_ms);
                        UnitOutcome::success(unit.name, rows, duration_ms)
                    }
                    Err(e) => {
                        error!("{}: failed: {}", unit.name, e);
                        UnitOutcome::failed(unit.name, e.to_string(), duration_ms)
                    }
                }
            });
            handles.push((name, handle));
        }

        let mut outcomes = Vec::with_capacity(handles.len());
        for (name, handle) in handles {
            match handle.await {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => outcomes.push(UnitOutcome::failed(
                    name,
                    format!("worker task panicked: {}", e),
                    0,
                )),
            }
        }

        let report = OperationReport::new(kind, started_at, outcomes);
        let (ok, failed, skipped) = report.counts();
        info!(
            "{} finished: {} succeeded, {} failed, {} skipped, {} rows total",
            kind,
            ok,
            failed,
            skipped,
            report.total_rows()
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MoverError;
    use crate::report::UnitStatus;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fast_retry() -> RetryConfig {
        RetryConfig {
            max_attempts: 3,
            base_delay_ms: 1,
        }
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&attempts);
        let unit = UnitTask::new("flaky", move || {
            let counter = Arc::clone(&counter);
            Box::pin(async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(MoverError::connection("connection reset", "reading"))
                } else {
                    Ok(42)
                }
            })
        });

        let engine = ShippingAndReceiving::new(
            2,
            fast_retry(),
            CancellationToken::new(),
        );
        let report = engine
            .run(OperationKind::StagingToProcess, vec![unit])
            .await;
        assert!(report.is_success());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert_eq!(report.units[0].rows, 42);
    }

    #[tokio::test]
    async fn permanent_failures_are_not_retried() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&attempts);
        let unit = UnitTask::new("broken", move || {
            let counter = Arc::clone(&counter);
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(MoverError::integrity("broken", "row count mismatch"))
            })
        });

        let engine = ShippingAndReceiving::new(1, fast_retry(), CancellationToken::new());
        let report = engine.run(OperationKind::StagingToProcess, vec![unit]).await;
        assert!(!report.is_success());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert_eq!(report.units[0].status, UnitStatus::Failed);
    }

    #[tokio::test]
    async fn cancelled_units_are_skipped() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let unit = UnitTask::new("never-runs", || Box::pin(async { Ok(1) }));
        let engine = ShippingAndReceiving::new(1, fast_retry(), cancel);
        let report = engine.run(OperationKind::BackupRunner, vec![unit]).await;

        assert_eq!(report.units[0].status, UnitStatus::Skipped);
        assert_eq!(report.total_rows(), 0);
    }

    #[tokio::test]
    async fn cancel_mid_run_keeps_completed_outcomes() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        // One worker, so the second unit is still queued when the first
        // cancels the run.
        let first = UnitTask::new("first", move || {
            let trigger = trigger.clone();
            Box::pin(async move {
                trigger.cancel();
                Ok(3)
            })
        });
        let second = UnitTask::new("second", || Box::pin(async { Ok(7) }));

        let engine = ShippingAndReceiving::new(1, fast_retry(), cancel);
        let report = engine
            .run(OperationKind::StagingToProcess, vec![first, second])
            .await;

        assert_eq!(report.units[0].status, UnitStatus::Success);
        assert_eq!(report.units[0].rows, 3);
        assert_eq!(report.units[1].status, UnitStatus::Skipped);
        assert_eq!(report.counts(), (1, 0, 1));
    }

    #[tokio::test]
    async fn outcomes_preserve_submission_order() {
        let units = (0..5)
            .map(|i| {
                UnitTask::new(format!("unit-{}", i), move || {
                    Box::pin(async move { Ok(i as u64) })
                })
            })
            .collect();

        let engine = ShippingAndReceiving::new(4, fast_retry(), CancellationToken::new());
        let report = engine.run(OperationKind::BuildRunnerServer, units).await;
        let names: Vec<&str> = report.units.iter().map(|u| u.name.as_str()).collect();
        assert_eq!(names, vec!["unit-0", "unit-1", "unit-2", "unit-3", "unit-4"]);
    }
}
