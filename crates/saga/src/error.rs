//! Saga error types.

use common::Status;
use thiserror::Error;

/// Classified failure of a single saga step attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StepError {
    /// Transient fault, eligible for another attempt.
    #[error("retryable: {0}")]
    Retryable(Status),

    /// Business-rule violation; no further attempts are made.
    #[error("non-retryable: {0}")]
    NonRetryable(Status),
}

impl StepError {
    pub fn retryable(status: Status) -> Self {
        StepError::Retryable(status)
    }

    pub fn non_retryable(status: Status) -> Self {
        StepError::NonRetryable(status)
    }

    /// Returns true if another attempt is allowed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StepError::Retryable(_))
    }

    /// Returns the classified status carried by this error.
    pub fn status(&self) -> &Status {
        match self {
            StepError::Retryable(status) | StepError::NonRetryable(status) => status,
        }
    }
}

/// Errors that prevent a saga from being run at all.
///
/// A saga that runs and fails is not an error: it ends in the `Failed` state.
#[derive(Debug, Error)]
pub enum SagaError {
    /// A saga with the same id is already in flight.
    #[error("Saga {0} is already running")]
    AlreadyRunning(String),

    /// The task running the saga ended without producing an outcome.
    #[error("Saga {saga_id} aborted: {reason}")]
    Aborted { saga_id: String, reason: String },
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;

#[cfg(test)]
mod tests {
    use super::*;
    use common::Code;

    #[test]
    fn test_classification() {
        let retryable = StepError::retryable(Status::internal("db down"));
        let fatal = StepError::non_retryable(Status::already_exists("taken"));

        assert!(retryable.is_retryable());
        assert!(!fatal.is_retryable());
        assert_eq!(fatal.status().code, Code::AlreadyExists);
    }

    #[test]
    fn test_display_includes_status() {
        let err = StepError::retryable(Status::internal("db down"));
        assert_eq!(err.to_string(), "retryable: INTERNAL: db down");
    }
}
