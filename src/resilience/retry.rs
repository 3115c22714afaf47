//! Bounded retry with fixed or exponential delay.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default total attempts (first try included).
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
/// Default delay before the second attempt.
pub const DEFAULT_WAIT_DURATION: Duration = Duration::from_millis(500);
/// Default delay multiplier (1.0 = fixed delay).
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 1.0;

/// Retry settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts including the first one. 1 disables retrying.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    #[serde(with = "humantime_serde")]
    pub wait_duration: Duration,
    /// Each further delay is the previous one times this factor.
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            wait_duration: DEFAULT_WAIT_DURATION,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
        }
    }
}

impl RetryConfig {
    /// Delay slept after failed attempt number `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let factor = self.backoff_multiplier.max(1.0).powi(exp);
        self.wait_duration.mul_f64(factor.min(1e6))
    }

    /// Run `op` until it succeeds or `max_attempts` is reached.
    ///
    /// Returns the last error when every attempt failed.
    pub async fn run<T, E, F, Fut>(&self, name: &str, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt >= max_attempts => {
                    tracing::debug!(operation = name, attempt, error = %e, "Retries exhausted");
                    return Err(e);
                }
                Err(e) => {
                    let delay = self.delay_after(attempt);
                    tracing::debug!(
                        operation = name,
                        attempt,
                        max_attempts,
                        delay = ?delay,
                        error = %e,
                        "Attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn config(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            wait_duration: Duration::from_millis(100),
            backoff_multiplier: 1.0,
        }
    }

    #[test]
    fn test_fixed_delay() {
        let c = config(3);
        assert_eq!(c.delay_after(1), Duration::from_millis(100));
        assert_eq!(c.delay_after(2), Duration::from_millis(100));
    }

    #[test]
    fn test_exponential_delay() {
        let c = RetryConfig {
            backoff_multiplier: 2.0,
            ..config(4)
        };
        assert_eq!(c.delay_after(1), Duration::from_millis(100));
        assert_eq!(c.delay_after(2), Duration::from_millis(200));
        assert_eq!(c.delay_after(3), Duration::from_millis(400));
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<u32, String> = config(3)
            .run("test", || async move {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 { Err(format!("boom {n}")) } else { Ok(n) }
            })
            .await;
        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_returns_last_error_when_exhausted() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<(), String> = config(2)
            .run("test", || async move {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                Err(format!("boom {n}"))
            })
            .await;
        assert_eq!(result.unwrap_err(), "boom 2");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_attempts_still_tries_once() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let _: Result<(), &str> = config(0)
            .run("test", || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err("nope")
            })
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
