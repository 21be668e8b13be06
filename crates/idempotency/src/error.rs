use thiserror::Error;

/// Errors raised by cache stores and the cache envelope codec.
///
/// None of these ever reach the caller of an intercepted method.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The cache store could not be reached or refused the operation.
    #[error("Cache unavailable: {0}")]
    Unavailable(String),

    /// A cached success payload names a type with no registered decoder.
    #[error("No decoder registered for response type {0}")]
    UnknownType(String),

    /// A cached payload decoded to a different type than the caller expects.
    #[error("Cached response is {actual}, expected {expected}")]
    TypeMismatch {
        expected: &'static str,
        actual: String,
    },

    /// The purge task ended abnormally.
    #[error("Purge task failed: {0}")]
    Task(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;
