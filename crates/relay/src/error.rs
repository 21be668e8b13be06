//! Relay error types.

use thiserror::Error;

/// Errors that can occur while relaying outbox records.
#[derive(Debug, Error)]
pub enum RelayError {
    /// An error occurred in the outbox store.
    #[error("Store error: {0}")]
    Store(#[from] store::StoreError),

    /// An outbox payload could not be decoded into a work item.
    #[error("Payload error: {0}")]
    Payload(#[from] serde_json::Error),

    /// The saga could not be run.
    #[error("Dispatch error: {0}")]
    Dispatch(#[from] saga::SagaError),

    /// The poller task ended abnormally.
    #[error("Poller task failed: {0}")]
    Task(String),
}

/// Result type for relay operations.
pub type Result<T> = std::result::Result<T, RelayError>;
