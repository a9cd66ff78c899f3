//! Capped exponential backoff.

use std::time::Duration;

/// Configuration for a retry policy.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (not counting the first try).
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_backoff: Duration,
    /// Upper bound for any single delay.
    pub max_backoff: Duration,
    /// Growth factor between consecutive delays.
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

/// Stateless retry policy: computes delays from the attempt number.
#[derive(Debug, Clone, Default)]
pub struct RetryPolicy {
    pub config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Delay before the `attempt`-th retry (1-based), ignoring `max_retries`.
    ///
    /// Used by loops that retry forever (e.g. ledger polling) and only need
    /// the cap.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(63) as i32;
        let base_ms = self.config.initial_backoff.as_millis() as f64
            * self.config.multiplier.powi(exponent);
        let cap_ms = self.config.max_backoff.as_millis() as f64;
        Duration::from_millis(base_ms.min(cap_ms) as u64)
    }

    /// Delay before the `attempt`-th retry, or `None` once retries are exhausted.
    pub fn next_delay(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.config.max_retries {
            return None;
        }
        Some(self.backoff(attempt))
    }

    /// Returns `true` if a retry is allowed after `attempt` failures.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt <= self.config.max_retries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(max_retries: u32, max_backoff_ms: u64) -> RetryPolicy {
        RetryPolicy::new(RetryConfig {
            max_retries,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(max_backoff_ms),
            multiplier: 2.0,
        })
    }

    #[test]
    fn test_exponential_delays() {
        let policy = policy(3, 30_000);
        assert_eq!(policy.next_delay(1), Some(Duration::from_millis(100)));
        assert_eq!(policy.next_delay(2), Some(Duration::from_millis(200)));
        assert_eq!(policy.next_delay(3), Some(Duration::from_millis(400)));
        assert!(policy.next_delay(4).is_none());
        assert!(policy.next_delay(0).is_none());
    }

    #[test]
    fn test_backoff_is_capped() {
        let policy = policy(3, 500);
        assert_eq!(policy.backoff(10), Duration::from_millis(500));
        assert_eq!(policy.backoff(u32::MAX), Duration::from_millis(500));
    }

    #[test]
    fn test_should_retry_boundary() {
        let policy = policy(2, 1_000);
        assert!(policy.should_retry(1));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
    }
}
