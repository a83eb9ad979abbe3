//! Retry policy for inference calls
//!
//! The policy is an explicit object applied only by the inference client;
//! the generation coordinator never retries on its own, it only
//! de-duplicates and times out waiters.

use std::future::Future;
use std::time::Duration;

use rand::Rng;

use super::client::InferenceError;

/// Exponential backoff with jitter over a bounded attempt budget.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: Duration::from_secs(30),
        }
    }

    /// Delay before the retry following the given failed attempt (1-based):
    /// `base * 2^(attempt-1)`, capped, plus up to 25% random jitter.
    fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = (attempt - 1).min(16);
        let backoff = self
            .base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay);
        backoff + backoff.mul_f64(rand::thread_rng().gen_range(0.0..0.25))
    }

    /// Run `op` until it succeeds, fails terminally, or the attempt budget
    /// is exhausted. The closure receives the 1-based attempt number; the
    /// returned error carries the number of attempts actually spent.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T, InferenceError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, InferenceError>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.max_attempts => {
                    tracing::warn!(
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %err,
                        "Transient inference failure, retrying"
                    );
                    tokio::time::sleep(self.delay_after(attempt)).await;
                }
                Err(err) => return Err(err.with_attempts(attempt)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::client::InferenceError;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::from_millis(1))
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result = policy(3)
            .run(|attempt| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    if attempt < 3 {
                        Err(InferenceError::transient("503 from upstream", Some(503)))
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausted_budget_is_terminal() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result: Result<(), _> = policy(3)
            .run(|_attempt| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(InferenceError::transient("timed out", None))
                }
            })
            .await;

        let err = result.unwrap_err();
        assert_eq!(err.attempts, 3);
        assert!(err.is_transient());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn terminal_failure_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result: Result<(), _> = policy(3)
            .run(|_attempt| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(InferenceError::terminal("401 unauthorized", Some(401)))
                }
            })
            .await;

        let err = result.unwrap_err();
        assert_eq!(err.attempts, 1);
        assert!(!err.is_transient());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
