//! Bounded exponential backoff.
//!
//! [`RetryConfig::run`] drives an async operation until it succeeds, fails
//! with an error the caller does not consider retryable, or runs out of
//! attempts. The last error is returned as-is.

use crate::config::RetryConfig;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

impl RetryConfig {
    /// Wait before the attempt following failed attempt number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let wait = self.initial_backoff.as_secs_f64() * self.multiplier.powi(exponent);
        let cap = self.max_backoff.as_secs_f64();

        if wait.is_finite() && wait < cap {
            Duration::from_secs_f64(wait.max(0.0))
        } else {
            self.max_backoff
        }
    }

    /// Run `op` until it succeeds or a non-retryable error or the attempt cap is hit.
    ///
    /// `op` receives the 1-based attempt number. On success the value is
    /// returned together with the number of attempts it took.
    pub async fn run<T, E, F, Fut, P>(&self, is_retryable: P, mut op: F) -> Result<(T, u32), E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: std::fmt::Display,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            debug!(attempt, max_attempts, "Starting attempt");

            match op(attempt).await {
                Ok(value) => return Ok((value, attempt)),
                Err(error) => {
                    if attempt >= max_attempts || !is_retryable(&error) {
                        return Err(error);
                    }

                    let backoff = self.backoff(attempt);
                    warn!(
                        attempt,
                        max_attempts,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %error,
                        "Attempt failed, retrying"
                    );
                    sleep(backoff).await;
                }
            }
        }
    }
}
