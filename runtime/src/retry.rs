//! Exponential backoff for event handling and reconnection.
//!
//! The consumer uses one [`RetryPolicy`] to retry a failing event handler in
//! place and another to space out resubscription attempts after the event
//! stream is lost.
//!
//! # Example
//!
//! ```rust
//! use todo_stats_runtime::retry::{RetryPolicy, retry_with_backoff};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), String> {
//! let policy = RetryPolicy::new(3, Duration::from_millis(10), Duration::from_secs(1));
//!
//! let value = retry_with_backoff(&policy, "increment", || async { Ok::<_, String>(7) }).await?;
//! assert_eq!(value, 7);
//! # Ok(())
//! # }
//! ```

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Capped exponential backoff.
///
/// The delay before retry `n` (zero-based) is
/// `initial_delay * multiplier^n`, never more than `max_delay`.
///
/// # Default Values
///
/// - `max_retries`: 3
/// - `initial_delay`: 100ms
/// - `max_delay`: 30 seconds
/// - `multiplier`: 2.0
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: usize,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Upper bound on any single delay
    pub max_delay: Duration,
    /// Growth factor between consecutive delays
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(100), Duration::from_secs(30))
    }
}

impl RetryPolicy {
    /// Create a doubling policy.
    #[must_use]
    pub const fn new(max_retries: usize, initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            initial_delay,
            max_delay,
            multiplier: 2.0,
        }
    }

    /// Replace the growth factor.
    #[must_use]
    pub const fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Delay before retry number `attempt` (zero-based).
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_possible_wrap,
        clippy::cast_sign_loss
    )]
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        let exponent = attempt.min(i32::MAX as usize) as i32;
        let millis = self.initial_delay.as_millis() as f64 * self.multiplier.powi(exponent);
        let cap = self.max_delay.as_millis() as f64;

        if !millis.is_finite() || millis >= cap {
            self.max_delay
        } else {
            Duration::from_millis(millis as u64)
        }
    }
}

/// Run `operation` until it succeeds or the policy's retries are used up.
///
/// Returns the first success, or the error of the final attempt.
///
/// # Errors
///
/// Returns the last error if every attempt failed.
pub async fn retry_with_backoff<F, Fut, T, E>(
    policy: &RetryPolicy,
    operation_name: &str,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 0 {
                    tracing::info!(operation = operation_name, attempt, "Succeeded after retry");
                }
                return Ok(value);
            }
            Err(error) if attempt >= policy.max_retries => {
                tracing::error!(
                    operation = operation_name,
                    attempt,
                    error = %error,
                    "Giving up after max retries"
                );
                return Err(error);
            }
            Err(error) => {
                let delay = policy.delay_for_attempt(attempt);
                tracing::warn!(
                    operation = operation_name,
                    attempt,
                    delay_ms = delay.as_millis(),
                    error = %error,
                    "Failed, retrying"
                );
                sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn delays_double_from_initial() {
        let policy = RetryPolicy::new(5, Duration::from_millis(100), Duration::from_secs(10));

        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(800));
    }

    #[test]
    fn delays_are_capped() {
        let policy = RetryPolicy::new(5, Duration::from_secs(1), Duration::from_secs(2))
            .with_multiplier(10.0);

        assert_eq!(policy.delay_for_attempt(5), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(10_000), Duration::from_secs(2));
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(5));
        let calls = Arc::new(AtomicUsize::new(0));

        let result = retry_with_backoff(&policy, "test", || {
            let calls = Arc::clone(&calls);
            async move {
                let attempt = calls.fetch_add(1, Ordering::SeqCst);
                if attempt < 2 { Err("transient") } else { Ok(attempt) }
            }
        })
        .await;

        assert_eq!(result, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn returns_last_error_when_exhausted() {
        let policy = RetryPolicy::new(2, Duration::from_millis(1), Duration::from_millis(5));
        let calls = Arc::new(AtomicUsize::new(0));

        let result: Result<(), String> = retry_with_backoff(&policy, "test", || {
            let calls = Arc::clone(&calls);
            async move { Err(format!("failure {}", calls.fetch_add(1, Ordering::SeqCst))) }
        })
        .await;

        assert_eq!(result, Err("failure 2".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    proptest! {
        #[test]
        fn delays_never_exceed_cap(attempt in 0_usize..200, initial in 1_u64..1_000, cap in 1_u64..60_000) {
            let policy = RetryPolicy::new(3, Duration::from_millis(initial), Duration::from_millis(cap));
            prop_assert!(policy.delay_for_attempt(attempt) <= Duration::from_millis(cap.max(initial)));
        }
    }
}
