//! Bounded retry for broker-facing startup work.
//!
//! An operation is attempted at most `max_retries` times with a fixed sleep
//! between attempts. Exhaustion yields [`RetryExhausted`] carrying the last
//! failure instead of falling through with a half-initialised handle.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Zero is treated as one.
    pub max_retries: usize,
    /// Fixed sleep between attempts.
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: usize, backoff: Duration) -> Self {
        Self { max_retries, backoff }
    }

    fn attempts(&self) -> usize {
        self.max_retries.max(1)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{label} failed after {attempts} attempts: {last_error}")]
pub struct RetryExhausted<E: Display> {
    pub label: String,
    pub attempts: usize,
    pub last_error: E,
}

pub async fn retry_bounded<T, E, F, Fut>(policy: RetryPolicy, label: &str, mut op: F) -> Result<T, RetryExhausted<E>>
where
    E: Display,
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let attempts = policy.attempts();
    let mut attempt = 0;

    loop {
        info!("{}: attempt {} of {}", label, attempt + 1, attempts);
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) => {
                attempt += 1;
                error!("{} failed: {}", label, e);
                if attempt >= attempts {
                    return Err(RetryExhausted {
                        label: label.to_string(),
                        attempts,
                        last_error: e,
                    });
                }
                sleep(policy.backoff).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let calls = AtomicUsize::new(0);
        let policy = RetryPolicy::new(5, Duration::from_millis(1));

        let result = retry_bounded(policy, "connect", |_| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err("broker down".to_string())
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_is_a_typed_error() {
        let calls = AtomicUsize::new(0);
        let policy = RetryPolicy::new(3, Duration::ZERO);

        let result: Result<(), _> = retry_bounded(policy, "connect", |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { Err(format!("refused on attempt {}", attempt)) }
        })
        .await;

        let err = result.unwrap_err();
        assert_eq!(err.attempts, 3);
        assert_eq!(err.last_error, "refused on attempt 2");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_zero_budget_still_tries_once() {
        let calls = AtomicUsize::new(0);
        let policy = RetryPolicy::new(0, Duration::ZERO);

        let result: Result<(), _> = retry_bounded(policy, "connect", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("nope") }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
