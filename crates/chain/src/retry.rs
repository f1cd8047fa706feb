//! Retry policy for transient failures.
//!
//! Drives the bounded, fixed-backoff retries on reputation snapshot writes
//! and is available to RPC callers. Transient indexing failures are NOT
//! retried in place: a failed run leaves the cursor untouched and the next
//! scheduled tick retries the same window.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Retry policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first)
    pub max_attempts: u32,
    /// Initial delay between attempts
    pub initial_delay: Duration,
    /// Maximum delay between attempts
    pub max_delay: Duration,
    /// Backoff multiplier (1.0 = fixed delay)
    pub backoff_multiplier: f64,
    /// Enable jitter to avoid thundering herd
    pub enable_jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0_f64,
            enable_jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Create exponential backoff retry policy
    #[must_use]
    pub fn exponential(max_attempts: u32, initial_delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay,
            ..Default::default()
        }
    }

    /// Create fixed delay retry policy
    #[must_use]
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay: delay,
            max_delay: delay,
            backoff_multiplier: 1.0_f64,
            enable_jitter: false,
        }
    }

    /// Create no-retry policy
    #[must_use]
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Calculate delay for the given retry attempt (1-based)
    #[must_use]
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let base_delay = if self.backoff_multiplier == 1.0_f64 {
            self.initial_delay
        } else {
            let multiplier = self
                .backoff_multiplier
                .powi(i32::try_from(attempt - 1).unwrap_or(0));
            Duration::from_nanos((self.initial_delay.as_nanos() as f64 * multiplier) as u64)
        };

        let delay = base_delay.min(self.max_delay);

        if self.enable_jitter {
            let jitter_factor = rand::thread_rng().gen_range(0.5_f64..1.5_f64);
            Duration::from_nanos((delay.as_nanos() as f64 * jitter_factor) as u64)
        } else {
            delay
        }
    }

    /// Run an operation under this policy.
    ///
    /// `retryable` classifies errors; a non-retryable error or an exhausted
    /// attempt budget returns the last error to the caller.
    ///
    /// # Errors
    ///
    /// Returns the final error once attempts are exhausted or the error is
    /// classified non-retryable.
    pub async fn run<T, E, F, Fut>(
        &self,
        operation: &str,
        retryable: impl Fn(&E) -> bool,
        mut f: F,
    ) -> Result<T, E>
    where
        E: std::fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 1u32;
        loop {
            match f().await {
                Ok(value) => return Ok(value),
                Err(error) => {
                    if attempt >= self.max_attempts.max(1) || !retryable(&error) {
                        return Err(error);
                    }
                    let delay = self.calculate_delay(attempt);
                    warn!(
                        operation,
                        attempt,
                        max_attempts = self.max_attempts,
                        %error,
                        "operation failed, retrying after {delay:?}"
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

    #[test]
    fn fixed_policy_keeps_constant_delay() {
        let policy = RetryPolicy::fixed(5, Duration::from_millis(250));
        assert_eq!(policy.calculate_delay(1), Duration::from_millis(250));
        assert_eq!(policy.calculate_delay(4), Duration::from_millis(250));
    }

    #[test]
    fn exponential_policy_grows_and_caps() {
        let mut policy = RetryPolicy::exponential(5, Duration::from_millis(100));
        policy.enable_jitter = false;
        policy.max_delay = Duration::from_millis(350);
        assert_eq!(policy.calculate_delay(1), Duration::from_millis(100));
        assert_eq!(policy.calculate_delay(2), Duration::from_millis(200));
        assert_eq!(policy.calculate_delay(3), Duration::from_millis(350));
    }

    #[tokio::test]
    async fn run_retries_until_success() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::fixed(3, Duration::from_millis(1));

        let result: Result<u32, String> = policy
            .run("flaky", |_| true, || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err("transient".to_string())
                    } else {
                        Ok(7)
                    }
                }
            })
            .await;

        assert_eq!(result, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn run_stops_on_non_retryable_error() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::fixed(5, Duration::from_millis(1));

        let result: Result<u32, String> = policy
            .run("fatal", |_| false, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("config".to_string()) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn run_exhausts_attempt_budget() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::fixed(3, Duration::from_millis(1));

        let result: Result<u32, String> = policy
            .run("always-failing", |_| true, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("transient".to_string()) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
