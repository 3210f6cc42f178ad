//! Capped exponential backoff around a fallible async operation.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

/// Runs an operation up to `max_attempts` times, sleeping between attempts
/// with a doubling, capped backoff. The last error is returned unchanged
/// when the budget is exhausted.
#[derive(Debug, Clone)]
pub struct Retrier {
    max_attempts: u32,
    min_backoff: Duration,
    max_backoff: Duration,
    log_attempts: bool,
}

impl Retrier {
    #[must_use]
    pub fn new(max_attempts: u32, min_backoff: Duration, max_backoff: Duration) -> Self {
        Self { max_attempts: max_attempts.max(1), min_backoff, max_backoff, log_attempts: true }
    }

    /// Enables or disables the per-attempt warn logs.
    #[must_use]
    pub fn log_attempts(mut self, enabled: bool) -> Self {
        self.log_attempts = enabled;
        self
    }

    /// Backoff slept after the n-th failed attempt (1-based):
    /// `min_backoff * 2^(n-1)`, capped at `max_backoff`.
    #[must_use]
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let doublings = attempt.saturating_sub(1).min(16);
        self.min_backoff.saturating_mul(1 << doublings).min(self.max_backoff)
    }

    /// Awaits `operation()`; on error, sleeps and retries while budget
    /// remains.
    ///
    /// # Errors
    ///
    /// Returns the final attempt's error once `max_attempts` is reached.
    pub async fn run<T, E, F, Fut>(&self, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match operation().await {
                Ok(value) => return Ok(value),
                Err(error) => {
                    if attempt >= self.max_attempts {
                        if self.log_attempts {
                            warn!(attempt, error = %error, "retry budget exhausted");
                        }
                        return Err(error);
                    }
                    let backoff = self.backoff_for(attempt);
                    if self.log_attempts {
                        warn!(
                            attempt,
                            backoff_ms = backoff.as_millis() as u64,
                            error = %error,
                            "attempt failed, backing off"
                        );
                    }
                    sleep(backoff).await;
                }
            }
        }
    }
}
