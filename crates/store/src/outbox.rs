//! Outbox record and its status lifecycle.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{EntityId, StoreError};

/// Delivery status of an outbox record.
///
/// Transitions are forward-only:
/// ```text
/// Ready ──► Processing ──┬──► Delivered
///                        └──► Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutboxStatus {
    /// Written alongside the primary entity, waiting for a poller.
    #[default]
    Ready,
    /// Claimed by a poller and handed to the orchestrator.
    Processing,
    /// The orchestrator reported success (terminal).
    Delivered,
    /// The orchestrator reported failure (terminal).
    Failed,
}

impl OutboxStatus {
    /// Returns true if `next` is a legal transition from this status.
    pub fn can_transition_to(&self, next: OutboxStatus) -> bool {
        matches!(
            (self, next),
            (OutboxStatus::Ready, OutboxStatus::Processing)
                | (OutboxStatus::Processing, OutboxStatus::Delivered)
                | (OutboxStatus::Processing, OutboxStatus::Failed)
        )
    }

    /// Returns true if this is a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OutboxStatus::Delivered | OutboxStatus::Failed)
    }

    /// Returns the persisted status name.
    pub fn as_str(&self) -> &'static str {
        match self {
            OutboxStatus::Ready => "READY",
            OutboxStatus::Processing => "PROCESSING",
            OutboxStatus::Delivered => "DELIVERED",
            OutboxStatus::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for OutboxStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for OutboxStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "READY" => Ok(OutboxStatus::Ready),
            "PROCESSING" => Ok(OutboxStatus::Processing),
            "DELIVERED" => Ok(OutboxStatus::Delivered),
            "FAILED" => Ok(OutboxStatus::Failed),
            other => Err(StoreError::UnknownStatus(other.to_string())),
        }
    }
}

/// Audit columns carried by every persisted row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Audit {
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: String,
    pub updated_by: String,
}

impl Audit {
    /// Audit fields for a row created by `actor` at `at`.
    pub fn created(actor: impl Into<String>, at: DateTime<Utc>) -> Self {
        let actor = actor.into();
        Self {
            created_at: at,
            updated_at: at,
            created_by: actor.clone(),
            updated_by: actor,
        }
    }

    /// Records an update by `actor` at `at`.
    pub fn touch(&mut self, actor: impl Into<String>, at: DateTime<Utc>) {
        self.updated_at = at;
        self.updated_by = actor.into();
    }
}

/// A durable intent to register an entity in the external identity system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxRecord {
    pub id: EntityId,
    pub status: OutboxStatus,
    /// Serialized entity to register.
    pub payload: serde_json::Value,
    pub audit: Audit,
}

impl OutboxRecord {
    /// Creates a READY record for the given payload.
    pub fn ready(payload: serde_json::Value, audit: Audit) -> Self {
        Self {
            id: EntityId::new(),
            status: OutboxStatus::Ready,
            payload,
            audit,
        }
    }
}
