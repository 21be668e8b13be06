//! Step execution with retry, backoff and per-attempt timeouts.
//!
//! The orchestrator never retries on its own: it hands each step to a
//! [`StepRunner`], which decides how often and how long to try. Swapping the
//! runner is how a durable execution backend would be plugged in.

use async_trait::async_trait;
use common::Status;
use tokio::time::Instant;

use crate::{RetryPolicy, StepError};

/// One unit of saga work.
#[async_trait]
pub trait Step: Send + Sync {
    type Output: Send;

    /// Step name used in logs, metrics and the saga journal.
    fn name(&self) -> &'static str;

    /// Executes a single attempt.
    async fn execute(&self) -> Result<Self::Output, StepError>;
}

/// Result of running a step to completion or exhaustion.
#[derive(Debug)]
pub struct StepReport<T> {
    /// Output of the successful attempt, or the error that ended the step.
    pub outcome: Result<T, StepError>,
    /// Every failed attempt in order. Includes the final error unless the
    /// deadline passed before another attempt could start.
    pub failures: Vec<StepError>,
}

impl<T> StepReport<T> {
    /// Number of attempts made.
    pub fn attempts(&self) -> u32 {
        let failed = u32::try_from(self.failures.len()).unwrap_or(u32::MAX);
        if self.outcome.is_ok() {
            failed.saturating_add(1)
        } else {
            failed
        }
    }
}

/// Runs steps until they succeed, fail for good or run out of time.
#[async_trait]
pub trait StepRunner: Send + Sync {
    /// Runs `step`, giving up once `deadline` has passed.
    async fn run_step<S>(&self, step: &S, deadline: Instant) -> StepReport<S::Output>
    where
        S: Step;

    /// Makes a single attempt at `step`, bounded by `deadline`.
    ///
    /// Used for compensations, which are never retried.
    async fn run_once<S>(&self, step: &S, deadline: Instant) -> StepReport<S::Output>
    where
        S: Step;
}

/// In-process runner applying a [`RetryPolicy`].
#[derive(Debug, Clone, Default)]
pub struct RetryingStepRunner {
    policy: RetryPolicy,
}

impl RetryingStepRunner {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    async fn run_attempts<S>(
        &self,
        step: &S,
        deadline: Instant,
        max_attempts: u32,
    ) -> StepReport<S::Output>
    where
        S: Step,
    {
        let max_attempts = max_attempts.max(1);
        let mut failures = Vec::new();
        let mut attempt = 0;

        loop {
            attempt += 1;
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                tracing::warn!(attempt, "saga deadline exceeded, step not attempted");
                return StepReport {
                    outcome: Err(StepError::retryable(Status::internal(
                        "saga deadline exceeded",
                    ))),
                    failures,
                };
            }

            metrics::counter!("saga_step_attempts_total", "step" => step.name()).increment(1);
            let limit = self.policy.step_timeout.min(remaining);
            let err = match tokio::time::timeout(limit, step.execute()).await {
                Ok(Ok(output)) => {
                    return StepReport {
                        outcome: Ok(output),
                        failures,
                    };
                }
                Ok(Err(err)) => err,
                Err(_) => StepError::retryable(Status::internal(format!(
                    "step {} timed out after {}ms",
                    step.name(),
                    limit.as_millis()
                ))),
            };

            failures.push(err.clone());
            if !err.is_retryable() || attempt >= max_attempts {
                tracing::warn!(attempt, error = %err, "step failed for good");
                return StepReport {
                    outcome: Err(err),
                    failures,
                };
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            let delay = self.policy.backoff_for(attempt).min(remaining);
            tracing::debug!(attempt, error = %err, ?delay, "step attempt failed, retrying");
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl StepRunner for RetryingStepRunner {
    #[tracing::instrument(skip(self, step, deadline), fields(step = step.name()))]
    async fn run_step<S>(&self, step: &S, deadline: Instant) -> StepReport<S::Output>
    where
        S: Step,
    {
        self.run_attempts(step, deadline, self.policy.max_attempts)
            .await
    }

    #[tracing::instrument(skip(self, step, deadline), fields(step = step.name()))]
    async fn run_once<S>(&self, step: &S, deadline: Instant) -> StepReport<S::Output>
    where
        S: Step,
    {
        self.run_attempts(step, deadline, 1).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use super::*;

    /// Step that pops scripted results and counts calls.
    struct Scripted {
        results: Mutex<Vec<Result<u32, StepError>>>,
        hang: Option<Duration>,
        calls: AtomicU32,
    }

    impl Scripted {
        fn new(mut results: Vec<Result<u32, StepError>>) -> Self {
            results.reverse();
            Self {
                results: Mutex::new(results),
                hang: None,
                calls: AtomicU32::new(0),
            }
        }

        fn hanging(duration: Duration) -> Self {
            Self {
                hang: Some(duration),
                ..Self::new(vec![])
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Step for Scripted {
        type Output = u32;

        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn execute(&self) -> Result<u32, StepError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some(hang) = self.hang {
                tokio::time::sleep(hang).await;
            }
            self.results.lock().unwrap().pop().unwrap_or(Ok(n))
        }
    }

    fn transient() -> StepError {
        StepError::retryable(Status::internal("transient"))
    }

    fn far_deadline() -> Instant {
        Instant::now() + Duration::from_secs(3600)
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_transient_failures_then_succeeds() {
        let runner = RetryingStepRunner::default();
        let step = Scripted::new(vec![Err(transient()), Err(transient())]);
        let started = Instant::now();

        let report = runner.run_step(&step, far_deadline()).await;

        assert_eq!(report.outcome.clone().unwrap(), 3);
        assert_eq!(report.failures.len(), 2);
        assert_eq!(report.attempts(), 3);
        // 100ms + 200ms of backoff
        assert_eq!(started.elapsed(), Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_stops_immediately() {
        let runner = RetryingStepRunner::default();
        let fatal = StepError::non_retryable(Status::already_exists("taken"));
        let step = Scripted::new(vec![Err(fatal.clone())]);

        let report = runner.run_step(&step, far_deadline()).await;

        assert_eq!(report.outcome.clone().unwrap_err(), fatal);
        assert_eq!(step.calls(), 1);
        assert_eq!(report.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_attempts() {
        let runner = RetryingStepRunner::default();
        let step = Scripted::new(vec![Err(transient()); 10]);

        let report = runner.run_step(&step, far_deadline()).await;

        assert!(report.outcome.unwrap_err().is_retryable());
        assert_eq!(step.calls(), 5);
        assert_eq!(report.failures.len(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_timeout_is_retryable() {
        let runner = RetryingStepRunner::new(RetryPolicy {
            max_attempts: 2,
            ..Default::default()
        });
        let step = Scripted::hanging(Duration::from_secs(30));

        let report = runner.run_step(&step, far_deadline()).await;

        let err = report.outcome.unwrap_err();
        assert!(err.is_retryable());
        assert!(err.status().message.contains("timed out"));
        assert_eq!(step.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_bounds_total_time() {
        let runner = RetryingStepRunner::default();
        let step = Scripted::hanging(Duration::from_secs(30));
        let started = Instant::now();

        let report = runner
            .run_step(&step, started + Duration::from_secs(15))
            .await;

        assert!(report.outcome.is_err());
        // 10s timeout, 100ms backoff, then the remaining 4.9s
        assert_eq!(step.calls(), 2);
        assert_eq!(report.attempts(), 2);
        assert_eq!(started.elapsed(), Duration::from_secs(15));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_once_never_retries() {
        let runner = RetryingStepRunner::default();
        let step = Scripted::new(vec![Err(transient()), Err(transient())]);

        let report = runner.run_once(&step, far_deadline()).await;

        assert!(report.outcome.clone().unwrap_err().is_retryable());
        assert_eq!(step.calls(), 1);
        assert_eq!(report.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_once_is_bounded_by_step_timeout() {
        let runner = RetryingStepRunner::default();
        let step = Scripted::hanging(Duration::from_secs(30));
        let started = Instant::now();

        let report = runner.run_once(&step, far_deadline()).await;

        assert!(report.outcome.unwrap_err().status().message.contains("timed out"));
        assert_eq!(started.elapsed(), Duration::from_secs(10));
    }
}
