//! Retry Mechanism
//!
//! Exponential backoff with optional jitter for transient failures.
//! Only errors for which [`LlmError::is_retryable`] holds are retried;
//! configuration, routing and upstream HTTP errors surface immediately.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::sleep;

use crate::error::LlmError;

/// Retry policy configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryPolicy {
    /// Maximum number of retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry
    pub initial_delay_ms: u64,
    /// Upper bound for any single delay
    pub max_delay_ms: u64,
    /// Backoff multiplier (for exponential backoff)
    pub backoff_multiplier: f64,
    /// Whether to add jitter to delays
    pub use_jitter: bool,
    /// Maximum jitter percentage (0.0 to 1.0)
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_delay_ms: 500,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
            use_jitter: true,
            jitter_factor: 0.1,
        }
    }
}

impl RetryPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay_ms = delay.as_millis() as u64;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay_ms = delay.as_millis() as u64;
        self
    }

    pub const fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    pub const fn with_jitter(mut self, use_jitter: bool) -> Self {
        self.use_jitter = use_jitter;
        self
    }

    /// Clamp the retry budget to a provider's `retry_attempts`.
    pub fn capped(&self, retry_attempts: u32) -> Self {
        let mut out = self.clone();
        out.max_retries = out.max_retries.min(retry_attempts);
        out
    }

    pub fn should_retry(&self, error: &LlmError, retries_so_far: u32) -> bool {
        retries_so_far < self.max_retries && error.is_retryable()
    }

    /// Delay before retry number `attempt` (0-based).
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let base_delay = self.initial_delay_ms as f64 * self.backoff_multiplier.powi(attempt as i32);
        let delay = Duration::from_millis(base_delay as u64).min(Duration::from_millis(self.max_delay_ms));

        if self.use_jitter {
            self.add_jitter(delay)
        } else {
            delay
        }
    }

    fn add_jitter(&self, delay: Duration) -> Duration {
        let jitter_range = delay.as_millis() as f64 * self.jitter_factor.clamp(0.0, 1.0);
        if jitter_range <= 0.0 {
            return delay;
        }
        let mut rng = rand::thread_rng();
        let jitter = rng.gen_range(-jitter_range..=jitter_range);
        let new_delay = delay.as_millis() as f64 + jitter;
        Duration::from_millis(new_delay.max(0.0) as u64)
    }
}

/// Retry executor that handles the actual retry loop
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    pub const fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// Run `operation` until it succeeds, fails with a non-retryable error,
    /// or the retry budget is spent. `on_retry` sees each error that is about
    /// to be retried together with the retry number.
    pub async fn execute<F, Fut, T, H>(&self, mut operation: F, mut on_retry: H) -> Result<T, LlmError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, LlmError>>,
        H: FnMut(&LlmError, u32),
    {
        let mut retries = 0;
        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(error) => {
                    if !self.policy.should_retry(&error, retries) {
                        return Err(error);
                    }
                    on_retry(&error, retries + 1);
                    let delay = self.policy.calculate_delay(retries);
                    tracing::debug!(retry = retries + 1, delay_ms = delay.as_millis() as u64, error = %error, "retrying after transient failure");
                    sleep(delay).await;
                    retries += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy::new()
            .with_max_retries(max_retries)
            .with_initial_delay(Duration::from_millis(1))
            .with_jitter(false)
    }

    #[tokio::test]
    async fn retries_timeouts_until_success() {
        let counter = Arc::new(AtomicU32::new(0));
        let c = counter.clone();
        let executor = RetryExecutor::new(fast_policy(3));
        let result = executor
            .execute(
                || {
                    let c = c.clone();
                    async move {
                        if c.fetch_add(1, Ordering::SeqCst) == 0 {
                            Err(LlmError::TimeoutError("slow".into()))
                        } else {
                            Ok("ok")
                        }
                    }
                },
                |_, _| {},
            )
            .await;
        assert_eq!(result.unwrap(), "ok");
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn never_retries_configuration_errors() {
        let counter = Arc::new(AtomicU32::new(0));
        let c = counter.clone();
        let executor = RetryExecutor::new(fast_policy(5));
        let result: Result<(), _> = executor
            .execute(
                || {
                    let c = c.clone();
                    async move {
                        c.fetch_add(1, Ordering::SeqCst);
                        Err(LlmError::MissingCredential("openai".into()))
                    }
                },
                |_, _| {},
            )
            .await;
        assert!(matches!(result, Err(LlmError::MissingCredential(_))));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn gives_up_after_budget() {
        let counter = Arc::new(AtomicU32::new(0));
        let c = counter.clone();
        let executor = RetryExecutor::new(fast_policy(5).capped(2));
        let result: Result<(), _> = executor
            .execute(
                || {
                    let c = c.clone();
                    async move {
                        c.fetch_add(1, Ordering::SeqCst);
                        Err(LlmError::ConnectionError("refused".into()))
                    }
                },
                |_, _| {},
            )
            .await;
        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_delay_calculation() {
        let policy = RetryPolicy::new()
            .with_initial_delay(Duration::from_millis(100))
            .with_backoff_multiplier(2.0)
            .with_max_delay(Duration::from_millis(300))
            .with_jitter(false);

        assert_eq!(policy.calculate_delay(0), Duration::from_millis(100));
        assert_eq!(policy.calculate_delay(1), Duration::from_millis(200));
        assert_eq!(policy.calculate_delay(2), Duration::from_millis(300));
    }
}
