//! Retry and timeout policy for saga steps.

use std::time::Duration;

/// Bounded exponential backoff applied to each saga step.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts per step, the first one included.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial_backoff: Duration,
    /// Multiplier applied to the delay after every failed attempt.
    pub backoff_coefficient: u32,
    /// Upper bound on a single delay.
    pub max_backoff: Duration,
    /// Time allowed for one attempt. Elapsing counts as a retryable failure.
    pub step_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(100),
            backoff_coefficient: 2,
            max_backoff: Duration::from_secs(10),
            step_timeout: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Returns the delay to wait after failed attempt number `attempt` (1-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = self
            .backoff_coefficient
            .max(1)
            .saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// Orchestrator configuration.
#[derive(Debug, Clone)]
pub struct SagaConfig {
    pub retry: RetryPolicy,
    /// Total time budget for the forward steps of one saga.
    pub saga_timeout: Duration,
    /// Finished sagas kept for `get_saga`. The oldest are evicted first.
    pub journal_capacity: usize,
}

impl Default for SagaConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            saga_timeout: Duration::from_secs(60),
            journal_capacity: 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_until_capped() {
        let policy = RetryPolicy {
            max_backoff: Duration::from_millis(500),
            ..Default::default()
        };

        assert_eq!(policy.backoff_for(1), Duration::from_millis(100));
        assert_eq!(policy.backoff_for(2), Duration::from_millis(200));
        assert_eq!(policy.backoff_for(3), Duration::from_millis(400));
        assert_eq!(policy.backoff_for(4), Duration::from_millis(500));
        assert_eq!(policy.backoff_for(40), Duration::from_millis(500));
    }

    #[test]
    fn test_defaults() {
        let config = SagaConfig::default();
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.step_timeout, Duration::from_secs(10));
        assert_eq!(config.saga_timeout, Duration::from_secs(60));
    }
}
