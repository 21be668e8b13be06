//! Domain error types.

use common::{EntityId, FieldViolation, Status};
use store::StoreError;
use thiserror::Error;

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// The candidate failed validation; nothing was persisted.
    #[error("Invalid registrant: {}", summarize(.0))]
    Validation(Vec<FieldViolation>),

    /// A registrant with the same unique key already exists.
    #[error("Registrant already exists: {0}")]
    AlreadyExists(String),

    /// Registrant not found.
    #[error("Registrant not found: {0}")]
    NotFound(EntityId),

    /// An error occurred in the store.
    #[error("Store error: {0}")]
    Store(StoreError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

fn summarize(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(|v| format!("{} {}", v.field, v.description))
        .collect::<Vec<_>>()
        .join("; ")
}

impl From<StoreError> for DomainError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::AlreadyExists { key, .. } => DomainError::AlreadyExists(key),
            other => DomainError::Store(other),
        }
    }
}

impl From<DomainError> for Status {
    fn from(e: DomainError) -> Self {
        match e {
            DomainError::Validation(violations) => {
                Status::invalid_argument("invalid registrant").with_details(violations)
            }
            DomainError::AlreadyExists(_) => Status::already_exists(e.to_string()),
            DomainError::NotFound(_) => Status::not_found(e.to_string()),
            DomainError::Store(_) | DomainError::Serialization(_) => {
                Status::internal(e.to_string())
            }
        }
    }
}
