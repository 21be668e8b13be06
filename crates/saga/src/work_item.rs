//! Unit of work handed from the relay to the orchestrator.

use common::EntityId;
use domain::Registrant;
use serde::{Deserialize, Serialize};

/// Derives the saga id for a registrant.
///
/// The id is deterministic so at most one saga per registrant can be in
/// flight at a time.
pub fn saga_id_for(registrant_id: EntityId) -> String {
    format!("registrant-{registrant_id}")
}

/// A registrant to provision, keyed by its saga id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SagaWorkItem {
    pub saga_id: String,
    pub registrant: Registrant,
}

impl SagaWorkItem {
    pub fn new(registrant: Registrant) -> Self {
        Self {
            saga_id: saga_id_for(registrant.id),
            registrant,
        }
    }

    /// Builds a work item from an outbox payload.
    pub fn from_payload(payload: &serde_json::Value) -> Result<Self, serde_json::Error> {
        let registrant = Registrant::deserialize(payload)?;
        Ok(Self::new(registrant))
    }
}
