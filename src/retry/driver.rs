//! Retry Driver

use super::{RetryConfig, RetryError};
use crate::clock::{default_clock, SharedClock};
use crate::errors::{classify, recovery_plan, StorageError};
use crate::notifications::{NotificationKind, NotificationManager, NotificationOptions};

use dashmap::DashMap;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Re-invokes failing operations with exponential backoff.
///
/// Attempt counters are keyed by operation id: concurrent calls that share
/// an id share one counter, distinct ids are independent.
pub struct RetryDriver {
    config: RetryConfig,
    attempts: DashMap<String, u32>,
    clock: SharedClock,
    notifier: Option<NotificationManager>,
}

impl RetryDriver {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            attempts: DashMap::new(),
            clock: default_clock(),
            notifier: None,
        }
    }

    /// Use `clock` for backoff delays
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    /// Show "retrying" notices through `notifier`
    pub fn with_notifier(mut self, notifier: NotificationManager) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    /// Retries already made for `operation_id`
    pub fn attempts_made(&self, operation_id: &str) -> u32 {
        self.attempts.get(operation_id).map(|a| *a).unwrap_or(0)
    }

    /// Run `operation` with the default classifier
    pub async fn run<F, Fut, T>(
        &self,
        operation_id: &str,
        cancel: &CancellationToken,
        operation: F,
    ) -> Result<T, RetryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        self.run_with_retry(operation_id, cancel, operation, |err| classify(err, None))
            .await
    }

    /// Run `operation`, retrying transient failures.
    ///
    /// Cancellation is checked before every attempt and raced against both
    /// the operation and the backoff delay; the in-flight operation future is
    /// dropped when `cancel` fires.
    pub async fn run_with_retry<F, Fut, T, E, C>(
        &self,
        operation_id: &str,
        cancel: &CancellationToken,
        mut operation: F,
        classifier: C,
    ) -> Result<T, RetryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        C: Fn(&E) -> StorageError,
    {
        let mut invocations = 0u32;

        loop {
            if cancel.is_cancelled() {
                return Err(self.cancelled(operation_id));
            }

            invocations += 1;
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                result = operation() => Some(result),
            };

            let raw = match outcome {
                None => return Err(self.cancelled(operation_id)),
                Some(Ok(value)) => {
                    if self.clear(operation_id) > 0 {
                        tracing::info!(operation_id, attempts = invocations, "Operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Some(Err(raw)) => raw,
            };

            let error = classifier(&raw);
            drop(raw);
            let plan = recovery_plan(&error);

            let Some(attempts_made) = self.reserve_retry(operation_id, plan.can_retry) else {
                self.clear(operation_id);
                let error = if plan.can_retry {
                    tracing::error!(
                        operation_id,
                        attempts = invocations,
                        kind = %error.kind,
                        "Operation failed after all retry attempts exhausted: {}",
                        error.message
                    );
                    error.with_recoverable(false)
                } else {
                    tracing::debug!(operation_id, kind = %error.kind, "Operation failed with non-retryable error");
                    error
                };
                return Err(RetryError::Failed {
                    error,
                    attempts: invocations,
                });
            };

            let delay = self.config.delay_for(attempts_made);
            tracing::warn!(
                operation_id,
                attempt = attempts_made + 1,
                max_attempts = self.config.max_attempts,
                delay_ms = delay.as_millis() as u64,
                kind = %error.kind,
                "Operation failed, retrying"
            );

            let notice = self.notifier.as_ref().map(|notifier| {
                notifier.show(
                    retry_message(delay, attempts_made + 1, self.config.max_attempts),
                    NotificationOptions::new(NotificationKind::Info).with_duration(delay),
                )
            });

            let cancelled = tokio::select! {
                biased;
                _ = cancel.cancelled() => true,
                _ = self.clock.sleep(delay) => false,
            };

            if let (Some(notifier), Some(id)) = (&self.notifier, notice) {
                notifier.dismiss(id);
            }
            if cancelled {
                return Err(self.cancelled(operation_id));
            }
        }
    }

    /// Claim the next retry slot; returns the retries made before it
    fn reserve_retry(&self, operation_id: &str, can_retry: bool) -> Option<u32> {
        if !can_retry {
            return None;
        }

        let mut made = self.attempts.entry(operation_id.to_string()).or_insert(0);
        if *made >= self.config.max_attempts {
            return None;
        }
        let before = *made;
        *made += 1;
        Some(before)
    }

    fn clear(&self, operation_id: &str) -> u32 {
        self.attempts
            .remove(operation_id)
            .map(|(_, made)| made)
            .unwrap_or(0)
    }

    fn cancelled(&self, operation_id: &str) -> RetryError {
        self.clear(operation_id);
        tracing::debug!(operation_id, "Operation cancelled");
        RetryError::Cancelled
    }
}

fn retry_message(delay: Duration, attempt: u32, max_attempts: u32) -> String {
    let secs = ((delay.as_millis() + 999) / 1000).max(1);
    let unit = if secs == 1 { "second" } else { "seconds" };
    format!(
        "Retrying in {} {}… (attempt {} of {})",
        secs, unit, attempt, max_attempts
    )
}
