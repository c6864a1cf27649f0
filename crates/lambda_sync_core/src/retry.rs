//! Bounded exponential backoff.
//!
//! [`retry_with_backoff`] drives an operation until it succeeds, fails with
//! an error the caller does not consider retryable, or runs out of attempts.
//! Non-retryable errors never consume a retry slot.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::warn;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 4;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(5);
pub const DEFAULT_BACKOFF_FACTOR: u32 = 2;
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub factor: u32,
    /// Cap applied to every individual delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            factor: DEFAULT_BACKOFF_FACTOR,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Delay slept after failed attempt number `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let multiplier = self.factor.saturating_pow(exponent);
        self.base_delay
            .saturating_mul(multiplier)
            .min(self.max_delay)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryError<E> {
    pub attempts: u32,
    pub last_error: E,
    /// True when every attempt failed with a retryable error.
    pub exhausted: bool,
}

pub async fn retry_with_backoff<T, E, F, Fut, P>(
    policy: &RetryPolicy,
    is_retryable: P,
    mut operation: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        let error = match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };

        if !is_retryable(&error) {
            return Err(RetryError {
                attempts: attempt,
                last_error: error,
                exhausted: false,
            });
        }

        if attempt >= max_attempts {
            return Err(RetryError {
                attempts: attempt,
                last_error: error,
                exhausted: true,
            });
        }

        let delay = policy.delay_after(attempt);
        warn!(
            event = "retry_scheduled",
            attempt,
            max_attempts,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "retrying after transient error"
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}
