//! Bounded retries and store-call timeouts.

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use crate::{EcommerceError, Result};

/// Retry policy for whole operations that hit `Conflict` or `Unavailable`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self { max_attempts: max_attempts.max(1), base_delay, max_delay: base_delay.saturating_mul(16) }
    }

    /// A policy that gives up after the first failure.
    pub fn none() -> Self { Self::new(1, Duration::ZERO) }

    /// Exponential backoff with full jitter for the retry following `attempt` (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = self.base_delay.saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)));
        let cap = exp.min(self.max_delay);
        if cap.is_zero() { return cap; }
        let millis = u64::try_from(cap.as_millis()).unwrap_or(u64::MAX);
        Duration::from_millis(rand::thread_rng().gen_range(0..=millis))
    }

    pub fn should_retry(&self, error: &EcommerceError, attempt: u32) -> bool {
        error.is_retryable() && attempt < self.max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self { Self::new(3, Duration::from_millis(25)) }
}

/// Runs a store call, turning an elapsed `limit` into `Unavailable`.
pub async fn with_timeout<T, F>(limit: Duration, what: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(EcommerceError::Unavailable(format!("{what} timed out after {limit:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_is_capped() {
        let policy = RetryPolicy::new(5, Duration::from_millis(10));
        for attempt in 1..10 {
            assert!(policy.delay_for_attempt(attempt) <= Duration::from_millis(160));
        }
        assert_eq!(RetryPolicy::none().delay_for_attempt(3), Duration::ZERO);
    }

    #[test]
    fn test_only_retryable_errors_within_budget() {
        let policy = RetryPolicy::default();
        let conflict = EcommerceError::Conflict("x".into());
        assert!(policy.should_retry(&conflict, 1));
        assert!(policy.should_retry(&conflict, 2));
        assert!(!policy.should_retry(&conflict, 3));
        assert!(!policy.should_retry(&EcommerceError::Expired("SAVE10".into()), 1));
    }

    #[tokio::test]
    async fn test_timeout_surfaces_unavailable() {
        let slow = async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok::<_, EcommerceError>(())
        };
        let err = with_timeout(Duration::from_millis(10), "product lookup", slow).await.unwrap_err();
        assert!(matches!(err, EcommerceError::Unavailable(_)));
    }
}
