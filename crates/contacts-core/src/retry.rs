//! Retry Policy
//!
//! Bounded exponential backoff for calls to the data store and the payment
//! provider. Every attempt runs under a timeout, and an injected
//! [`ConnectivityProbe`] is consulted before each attempt so an offline
//! backend fails fast into the backoff path instead of hanging.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::CoreError;

/// Connectivity check used before each attempt
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    async fn is_online(&self) -> bool;
}

/// Probe that never reports an outage
#[derive(Clone, Copy, Debug, Default)]
pub struct AlwaysOnline;

#[async_trait]
impl ConnectivityProbe for AlwaysOnline {
    async fn is_online(&self) -> bool {
        true
    }
}

/// Errors the retry policy can classify and synthesise
pub trait RetryableError: std::fmt::Display {
    fn is_retryable(&self) -> bool;

    /// Error for an attempt that exceeded its deadline
    fn timed_out(operation: &str, after: Duration) -> Self;

    /// Error for an attempt skipped because the probe reported an outage
    fn offline(operation: &str) -> Self;
}

impl RetryableError for CoreError {
    fn is_retryable(&self) -> bool {
        Self::is_retryable(self)
    }

    fn timed_out(operation: &str, after: Duration) -> Self {
        Self::Timeout {
            operation: operation.to_string(),
            millis: after.as_millis(),
        }
    }

    fn offline(operation: &str) -> Self {
        Self::Unavailable(format!("{operation}: backend offline"))
    }
}

/// Retry configuration
#[derive(Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,

    /// Delay before the second attempt; doubles afterwards
    pub base_delay: Duration,

    /// Upper bound on any single delay
    pub max_delay: Duration,

    /// Deadline for each attempt
    pub attempt_timeout: Duration,

    probe: Arc<dyn ConnectivityProbe>,
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .field("attempt_timeout", &self.attempt_timeout)
            .finish_non_exhaustive()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
            attempt_timeout: Duration::from_secs(10),
            probe: Arc::new(AlwaysOnline),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, attempt_timeout: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            attempt_timeout,
            ..Default::default()
        }
    }

    /// Replace the connectivity probe
    #[must_use]
    pub fn with_probe(mut self, probe: Arc<dyn ConnectivityProbe>) -> Self {
        self.probe = probe;
        self
    }

    /// Same timeout and probe, but no retries.
    ///
    /// For writes that have no dedup key, where a retry after an ambiguous
    /// timeout could apply twice.
    #[must_use]
    pub fn single_attempt(&self) -> Self {
        Self {
            max_attempts: 1,
            ..self.clone()
        }
    }

    /// Delay after the given (1-based) failed attempt
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out
    pub async fn run<T, E, F, Fut>(&self, operation: &str, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: RetryableError,
    {
        let mut attempt = 1;

        loop {
            let result = if self.probe.is_online().await {
                match tokio::time::timeout(self.attempt_timeout, op()).await {
                    Ok(result) => result,
                    Err(_) => Err(E::timed_out(operation, self.attempt_timeout)),
                }
            } else {
                Err(E::offline(operation))
            };

            match result {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < self.max_attempts => {
                    let delay = self.backoff(attempt);
                    tracing::warn!(
                        operation,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %err,
                        "Transient failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    if err.is_retryable() {
                        tracing::error!(operation, attempts = attempt, error = %err, "Retries exhausted");
                    }
                    return Err(err);
                }
            }
        }
    }
}
