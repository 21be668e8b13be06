//! Registration use case: the outbox writer.

use common::{Clock, EntityId};
use store::{Audit, OutboxRecord, RegistrantRecord, RegistrantStore};

use super::{NewRegistrant, Registrant};
use crate::error::DomainError;

/// Service for registering and administering registrants.
///
/// A successful registration commits the registrant row and a READY outbox
/// record in one local transaction. The outbox payload is the serialized
/// registrant, later picked up by a relay poller.
pub struct RegistrationService<S: RegistrantStore, C: Clock> {
    store: S,
    clock: C,
}

impl<S: RegistrantStore, C: Clock> RegistrationService<S, C> {
    /// Creates a new registration service.
    pub fn new(store: S, clock: C) -> Self {
        Self { store, clock }
    }

    /// Returns a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Validates, persists and enqueues a new registrant.
    ///
    /// Returns the generated registrant ID. Validation failures are returned
    /// before anything touches the store.
    #[tracing::instrument(skip(self, candidate))]
    pub async fn register(
        &self,
        candidate: NewRegistrant,
        actor: &str,
    ) -> Result<EntityId, DomainError> {
        let validated = candidate.validate()?;

        let audit = Audit::created(actor, self.clock.now());
        let registrant = Registrant::from_validated(validated, audit.clone());
        let outbox = OutboxRecord::ready(serde_json::to_value(&registrant)?, audit);
        let outbox_id = outbox.id;

        self.store
            .insert_with_outbox(RegistrantRecord::from(&registrant), outbox)
            .await?;

        metrics::counter!("outbox_records_written_total").increment(1);
        tracing::info!(registrant_id = %registrant.id, %outbox_id, "registrant stored with outbox intent");

        Ok(registrant.id)
    }

    /// Loads a registrant by ID.
    pub async fn get_registrant(&self, id: EntityId) -> Result<Option<Registrant>, DomainError> {
        match self.store.get_registrant(id).await? {
            Some(record) => Ok(Some(Registrant::try_from(record)?)),
            None => Ok(None),
        }
    }

    /// Administrative deletion of the local registrant row.
    ///
    /// The external account, if any, is left untouched.
    #[tracing::instrument(skip(self))]
    pub async fn delete_registrant(&self, id: EntityId) -> Result<(), DomainError> {
        if self.store.delete_registrant(id).await? {
            tracing::info!(registrant_id = %id, "registrant deleted");
            Ok(())
        } else {
            Err(DomainError::NotFound(id))
        }
    }
}
