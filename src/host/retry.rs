//! Exponential backoff retry for host API calls.
//!
//! Only transient errors are retried (3 retries at 2s, 4s, 8s by default).
//! Every other kind is a statement about the remote object and is returned
//! to the caller immediately.

use std::future::Future;
use std::time::Duration;

use super::error::HostApiError;

/// Configuration for exponential backoff retry.
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (not including the initial attempt).
    pub max_retries: u32,

    /// Delay before the first retry.
    pub initial_delay: Duration,

    /// Cap for exponential growth.
    pub max_delay: Duration,

    pub backoff_multiplier: f64,
}

impl RetryConfig {
    pub const DEFAULT: Self = Self {
        max_retries: 3,
        initial_delay: Duration::from_secs(2),
        max_delay: Duration::from_secs(16),
        backoff_multiplier: 2.0,
    };

    /// No waiting between attempts. For tests.
    pub const IMMEDIATE: Self = Self {
        max_retries: 3,
        initial_delay: Duration::ZERO,
        max_delay: Duration::ZERO,
        backoff_multiplier: 1.0,
    };

    /// Computes the delay for the given retry attempt (0-indexed):
    /// `initial_delay * backoff_multiplier^attempt`, capped at `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let multiplier = self.backoff_multiplier.powi(attempt as i32);
        let delay_secs = self.initial_delay.as_secs_f64() * multiplier;
        Duration::from_secs_f64(delay_secs.min(self.max_delay.as_secs_f64()))
    }

    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        (0..self.max_retries).map(|attempt| self.delay_for_attempt(attempt))
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Retry policy for controlling retry behavior at runtime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RetryPolicy {
    #[default]
    RetryTransient,
    NoRetry,
}

/// Outcome of [`retry_with_backoff`].
#[derive(Debug)]
pub enum RetryResult<T> {
    Success(T),

    /// A transient error persisted through every attempt.
    ExhaustedRetries {
        last_error: HostApiError,
        /// Attempts made, including the initial one.
        attempts: u32,
    },

    /// A non-retriable error.
    Failed(HostApiError),
}

impl<T> RetryResult<T> {
    pub fn into_result(self) -> Result<T, HostApiError> {
        match self {
            RetryResult::Success(v) => Ok(v),
            RetryResult::ExhaustedRetries { last_error, .. } => Err(last_error),
            RetryResult::Failed(e) => Err(e),
        }
    }
}

/// Executes an async operation, retrying transient failures with backoff.
pub async fn retry_with_backoff<T, F, Fut>(
    config: RetryConfig,
    policy: RetryPolicy,
    mut operation: F,
) -> RetryResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, HostApiError>>,
{
    let max_attempts = match policy {
        RetryPolicy::NoRetry => 1,
        RetryPolicy::RetryTransient => config.max_retries + 1,
    };
    let mut attempt = 0;

    loop {
        let err = match operation().await {
            Ok(value) => return RetryResult::Success(value),
            Err(e) => e,
        };
        attempt += 1;

        if !err.kind.is_retriable() {
            return RetryResult::Failed(err);
        }
        if attempt >= max_attempts {
            return RetryResult::ExhaustedRetries {
                last_error: err,
                attempts: attempt,
            };
        }

        let delay = config.delay_for_attempt(attempt - 1);
        tracing::debug!(attempt, ?delay, error = %err, "retrying transient host error");
        tokio::time::sleep(delay).await;
    }
}
