//! Provider-call retry policy
//!
//! The orchestration loop retries provider completions at its boundary:
//! each attempt is bounded by a per-call timeout, network-shaped failures
//! back off exponentially and try again, and configuration or
//! malformed-response errors surface on the first attempt. Retryability
//! is decided by [`talos_llm::Error::is_retryable`].

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use talos_llm::Error as LlmError;
use tokio::time::{sleep, timeout};
use tracing::debug;

/// Backoff policy for provider completions
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts per provider call, including the first
    pub max_attempts: u32,
    /// Delay before the first retry; doubles on each further one
    pub base_delay: Duration,
    /// Ceiling on the backoff delay
    pub max_delay: Duration,
    /// Timeout applied to each individual provider call
    pub call_timeout: Duration,
    /// Spread concurrent retries with random jitter
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(10),
            call_timeout: Duration::from_secs(120),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Create the default policy
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the attempt budget
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Set the first-retry delay
    #[must_use]
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Set the backoff ceiling
    #[must_use]
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set the per-call timeout
    #[must_use]
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Enable or disable jitter
    #[must_use]
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Backoff before retry number `attempt`: doubling from `base_delay`,
    /// capped at `max_delay`, plus up to 25% jitter
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let doubled = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)));
        let capped = doubled.min(self.max_delay);
        if self.jitter {
            capped.mul_f64(1.0 + rand::thread_rng().gen_range(0.0..0.25))
        } else {
            capped
        }
    }

    /// Run one provider completion under the policy.
    ///
    /// A call that outlives `call_timeout` counts as a
    /// [`LlmError::Timeout`] attempt. Once a non-retryable error arrives
    /// or the attempt budget is spent, the last error comes back with the
    /// attempt count.
    pub async fn completion<T, F, Fut>(
        &self,
        mut operation: F,
    ) -> std::result::Result<T, RetryExhausted>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = talos_llm::Result<T>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = match timeout(self.call_timeout, operation()).await {
                Ok(result) => result,
                Err(_) => Err(LlmError::Timeout(self.call_timeout.as_millis() as u64)),
            };
            match result {
                Ok(value) => return Ok(value),
                Err(error) => {
                    if attempt >= self.max_attempts || !error.is_retryable() {
                        return Err(RetryExhausted {
                            last_error: error,
                            attempts: attempt,
                        });
                    }
                    let delay = self.backoff_delay(attempt);
                    debug!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Provider call failed, backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

/// The policy gave up on a provider call
#[derive(Debug)]
pub struct RetryExhausted {
    /// The error the final attempt produced
    pub last_error: LlmError,
    /// How many attempts ran
    pub attempts: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new()
            .with_max_attempts(max_attempts)
            .with_base_delay(Duration::from_millis(1))
            .with_jitter(false)
    }

    #[tokio::test]
    async fn test_retries_transient_errors_until_success() {
        let attempts = AtomicU32::new(0);
        let value = fast_policy(5)
            .completion(|| async {
                if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(LlmError::RateLimit)
                } else {
                    Ok(42)
                }
            })
            .await
            .unwrap();

        assert_eq!(value, 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_reports_last_error_and_attempts() {
        let exhausted = fast_policy(3)
            .completion(|| async {
                Err::<(), _>(LlmError::Network("connection reset".to_string()))
            })
            .await
            .unwrap_err();

        assert_eq!(exhausted.attempts, 3);
        assert!(matches!(exhausted.last_error, LlmError::Network(_)));
    }

    #[tokio::test]
    async fn test_non_retryable_error_surfaces_on_first_attempt() {
        let attempts = AtomicU32::new(0);
        let exhausted = fast_policy(5)
            .completion(|| async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(LlmError::InvalidResponse("no choices".to_string()))
            })
            .await
            .unwrap_err();

        assert_eq!(exhausted.attempts, 1);
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_slow_call_becomes_a_timeout_attempt() {
        let policy = fast_policy(2).with_call_timeout(Duration::from_millis(5));
        let exhausted = policy
            .completion(|| async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            })
            .await
            .unwrap_err();

        assert_eq!(exhausted.attempts, 2);
        assert!(matches!(exhausted.last_error, LlmError::Timeout(5)));
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy::new()
            .with_base_delay(Duration::from_millis(100))
            .with_max_delay(Duration::from_millis(300))
            .with_jitter(false);

        assert_eq!(policy.backoff_delay(1), Duration::from_millis(100));
        assert_eq!(policy.backoff_delay(2), Duration::from_millis(200));
        assert_eq!(policy.backoff_delay(3), Duration::from_millis(300));
        assert_eq!(policy.backoff_delay(8), Duration::from_millis(300));
    }

    #[test]
    fn test_jitter_stays_within_a_quarter() {
        let policy = RetryPolicy::new()
            .with_base_delay(Duration::from_millis(100))
            .with_jitter(true);

        for _ in 0..32 {
            let delay = policy.backoff_delay(1);
            assert!(delay >= Duration::from_millis(100));
            assert!(delay <= Duration::from_millis(125));
        }
    }
}
