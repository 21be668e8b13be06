//! Saga journal events.

use chrono::{DateTime, Utc};
use common::{EntityId, Status};
use serde::{Deserialize, Serialize};

/// Events recorded while a saga runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum SagaEvent {
    /// Saga execution started.
    SagaStarted(SagaStartedData),

    /// A step attempt failed. Another attempt may follow.
    StepAttemptFailed(StepAttemptFailedData),

    /// A step completed successfully.
    StepCompleted(StepCompletedData),

    /// The external account is about to be deleted.
    CompensationStarted(CompensationData),

    /// The external account was deleted.
    CompensationCompleted(CompensationData),

    /// Deleting the external account failed. It may be orphaned.
    CompensationFailed(CompensationFailedData),

    /// Saga completed successfully.
    SagaCompleted(SagaFinishedData),

    /// Saga failed.
    SagaFailed(SagaFailedData),
}

impl SagaEvent {
    /// Returns the event type name.
    pub fn event_type(&self) -> &'static str {
        match self {
            SagaEvent::SagaStarted(_) => "SagaStarted",
            SagaEvent::StepAttemptFailed(_) => "StepAttemptFailed",
            SagaEvent::StepCompleted(_) => "StepCompleted",
            SagaEvent::CompensationStarted(_) => "CompensationStarted",
            SagaEvent::CompensationCompleted(_) => "CompensationCompleted",
            SagaEvent::CompensationFailed(_) => "CompensationFailed",
            SagaEvent::SagaCompleted(_) => "SagaCompleted",
            SagaEvent::SagaFailed(_) => "SagaFailed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SagaStartedData {
    pub saga_id: String,
    pub registrant_id: EntityId,
    /// The type of saga (e.g., "RegistrantProvisioning").
    pub saga_type: String,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepAttemptFailedData {
    pub step_name: String,
    /// 1-based attempt number.
    pub attempt: u32,
    pub retryable: bool,
    pub error: Status,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepCompletedData {
    pub step_name: String,
    /// 1-based attempt number that succeeded.
    pub attempt: u32,
    /// Account id assigned by the identity system (set by the first step).
    pub external_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompensationData {
    pub external_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompensationFailedData {
    pub external_id: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SagaFinishedData {
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SagaFailedData {
    pub reason: String,
    pub failed_at: DateTime<Utc>,
}

// Convenience constructors
impl SagaEvent {
    pub fn saga_started(
        saga_id: impl Into<String>,
        registrant_id: EntityId,
        saga_type: impl Into<String>,
        started_at: DateTime<Utc>,
    ) -> Self {
        SagaEvent::SagaStarted(SagaStartedData {
            saga_id: saga_id.into(),
            registrant_id,
            saga_type: saga_type.into(),
            started_at,
        })
    }

    pub fn step_attempt_failed(
        step_name: impl Into<String>,
        attempt: u32,
        retryable: bool,
        error: Status,
    ) -> Self {
        SagaEvent::StepAttemptFailed(StepAttemptFailedData {
            step_name: step_name.into(),
            attempt,
            retryable,
            error,
        })
    }

    pub fn step_completed(
        step_name: impl Into<String>,
        attempt: u32,
        external_id: Option<String>,
    ) -> Self {
        SagaEvent::StepCompleted(StepCompletedData {
            step_name: step_name.into(),
            attempt,
            external_id,
        })
    }

    pub fn compensation_started(external_id: impl Into<String>) -> Self {
        SagaEvent::CompensationStarted(CompensationData {
            external_id: external_id.into(),
        })
    }

    pub fn compensation_completed(external_id: impl Into<String>) -> Self {
        SagaEvent::CompensationCompleted(CompensationData {
            external_id: external_id.into(),
        })
    }

    pub fn compensation_failed(external_id: impl Into<String>, error: impl Into<String>) -> Self {
        SagaEvent::CompensationFailed(CompensationFailedData {
            external_id: external_id.into(),
            error: error.into(),
        })
    }

    pub fn saga_completed(finished_at: DateTime<Utc>) -> Self {
        SagaEvent::SagaCompleted(SagaFinishedData { finished_at })
    }

    pub fn saga_failed(reason: impl Into<String>, failed_at: DateTime<Utc>) -> Self {
        SagaEvent::SagaFailed(SagaFailedData {
            reason: reason.into(),
            failed_at,
        })
    }
}
