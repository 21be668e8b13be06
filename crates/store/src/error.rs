use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::{EntityId, OutboxStatus};

/// Errors that can occur when interacting with the relational store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A uniqueness constraint was violated.
    #[error("{entity} already exists: {key}")]
    AlreadyExists { entity: &'static str, key: String },

    /// The addressed row does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: EntityId },

    /// A compare-and-set status update found the row in another status.
    #[error("Outbox record {id} is {actual}, expected {expected}")]
    StatusConflict {
        id: EntityId,
        expected: OutboxStatus,
        actual: OutboxStatus,
    },

    /// A PROCESSING record is still leased by its current claimer.
    #[error("Outbox record {id} is leased until after {leased_before}")]
    LeaseHeld {
        id: EntityId,
        leased_before: DateTime<Utc>,
    },

    /// The requested status change is not a legal forward transition.
    #[error("Illegal outbox transition {from} -> {to}")]
    InvalidTransition { from: OutboxStatus, to: OutboxStatus },

    /// A stored status string could not be parsed.
    #[error("Unknown outbox status: {0}")]
    UnknownStatus(String),

    /// The store could not be reached or refused the operation.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Returns true for uniqueness violations.
    pub fn is_already_exists(&self) -> bool {
        matches!(self, StoreError::AlreadyExists { .. })
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
