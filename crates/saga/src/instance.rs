//! Saga instance rebuilt from its journal.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use common::EntityId;
use serde::{Deserialize, Serialize};

use crate::events::SagaEvent;
use crate::registration::{STEP_CREATE_EXTERNAL_ACCOUNT, STEP_PERSIST_LOCAL_RECORD};
use crate::state::SagaState;

/// Outcome of the compensating delete, if one was attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompensationOutcome {
    Deleted,
    Failed,
}

/// State of one saga execution, plus the events that produced it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SagaInstance {
    saga_id: String,
    saga_type: String,
    registrant_id: Option<EntityId>,
    state: SagaState,
    external_id: Option<String>,
    /// step name -> attempts made so far
    attempts: BTreeMap<String, u32>,
    compensation_calls: u32,
    compensation: Option<CompensationOutcome>,
    failure_reason: Option<String>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    history: Vec<SagaEvent>,
}

impl SagaInstance {
    /// Rebuilds an instance by replaying `events` in order.
    pub fn from_events(events: impl IntoIterator<Item = SagaEvent>) -> Self {
        let mut instance = Self::default();
        for event in events {
            instance.apply(event);
        }
        instance
    }

    /// Applies an event and appends it to the journal.
    pub fn apply(&mut self, event: SagaEvent) {
        match &event {
            SagaEvent::SagaStarted(data) => {
                self.saga_id = data.saga_id.clone();
                self.saga_type = data.saga_type.clone();
                self.registrant_id = Some(data.registrant_id);
                self.started_at = Some(data.started_at);
            }
            SagaEvent::StepAttemptFailed(data) => {
                self.attempts.insert(data.step_name.clone(), data.attempt);
            }
            SagaEvent::StepCompleted(data) => {
                self.attempts.insert(data.step_name.clone(), data.attempt);
                match data.step_name.as_str() {
                    STEP_CREATE_EXTERNAL_ACCOUNT => {
                        self.external_id = data.external_id.clone();
                        self.advance(SagaState::ExternalAccountCreated);
                    }
                    STEP_PERSIST_LOCAL_RECORD => self.advance(SagaState::LocalRecordPersisted),
                    other => tracing::warn!(step = other, "completed step not in saga definition"),
                }
            }
            SagaEvent::CompensationStarted(_) => {
                self.compensation_calls += 1;
            }
            SagaEvent::CompensationCompleted(_) => {
                self.compensation = Some(CompensationOutcome::Deleted);
            }
            SagaEvent::CompensationFailed(_) => {
                self.compensation = Some(CompensationOutcome::Failed);
            }
            SagaEvent::SagaCompleted(data) => {
                self.advance(SagaState::Completed);
                self.finished_at = Some(data.finished_at);
            }
            SagaEvent::SagaFailed(data) => {
                self.advance(SagaState::Failed);
                self.failure_reason = Some(data.reason.clone());
                self.finished_at = Some(data.failed_at);
            }
        }
        self.history.push(event);
    }

    fn advance(&mut self, next: SagaState) {
        if self.state.can_transition_to(next) {
            self.state = next;
        } else {
            tracing::warn!(
                saga_id = %self.saga_id,
                from = %self.state,
                to = %next,
                "ignoring illegal saga transition"
            );
        }
    }
}

// Query methods
impl SagaInstance {
    pub fn saga_id(&self) -> &str {
        &self.saga_id
    }

    pub fn saga_type(&self) -> &str {
        &self.saga_type
    }

    pub fn registrant_id(&self) -> Option<EntityId> {
        self.registrant_id
    }

    pub fn state(&self) -> SagaState {
        self.state
    }

    /// Returns true once the saga has completed or failed.
    pub fn is_finished(&self) -> bool {
        self.state.is_terminal()
    }

    /// Returns the identity-system account id, if one was created.
    pub fn external_id(&self) -> Option<&str> {
        self.external_id.as_deref()
    }

    /// Returns the number of attempts made for a step.
    pub fn attempts(&self, step: &str) -> u32 {
        self.attempts.get(step).copied().unwrap_or(0)
    }

    /// Returns how many compensating deletes were attempted.
    pub fn compensation_calls(&self) -> u32 {
        self.compensation_calls
    }

    pub fn compensation(&self) -> Option<CompensationOutcome> {
        self.compensation
    }

    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    /// Returns the journal of applied events.
    pub fn history(&self) -> &[SagaEvent] {
        &self.history
    }
}
