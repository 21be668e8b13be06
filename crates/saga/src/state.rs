//! Saga state machine.

use serde::{Deserialize, Serialize};

/// The state of a registration saga.
///
/// State transitions:
/// ```text
/// Start ──► ExternalAccountCreated ──► LocalRecordPersisted ──► Completed
///   │                 │                         │
///   └─────────────────┴─────────────────────────┴──► Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SagaState {
    /// Nothing has been created yet.
    #[default]
    Start,

    /// The account exists in the identity system.
    ExternalAccountCreated,

    /// The local account link has been written.
    LocalRecordPersisted,

    /// Every step succeeded (terminal state).
    Completed,

    /// A step failed for good, after compensation if any (terminal state).
    Failed,
}

impl SagaState {
    /// Returns true if the saga may move from this state to `next`.
    pub fn can_transition_to(&self, next: SagaState) -> bool {
        use SagaState::*;
        matches!(
            (self, next),
            (Start, ExternalAccountCreated)
                | (ExternalAccountCreated, LocalRecordPersisted)
                | (LocalRecordPersisted, Completed)
                | (Start | ExternalAccountCreated | LocalRecordPersisted, Failed)
        )
    }

    /// Returns true if an external account may exist and must be deleted
    /// should the saga fail from this state.
    pub fn needs_compensation(&self) -> bool {
        matches!(self, SagaState::ExternalAccountCreated)
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SagaState::Completed | SagaState::Failed)
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaState::Start => "Start",
            SagaState::ExternalAccountCreated => "ExternalAccountCreated",
            SagaState::LocalRecordPersisted => "LocalRecordPersisted",
            SagaState::Completed => "Completed",
            SagaState::Failed => "Failed",
        }
    }
}

impl std::fmt::Display for SagaState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
