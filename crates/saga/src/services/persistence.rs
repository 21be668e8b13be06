//! Local persistence step executor.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use common::{Clock, EntityId, Status, SystemClock};
use domain::Registrant;
use store::{AccountLink, RegistrantStore, StoreError};

use crate::StepError;

/// Records locally that a registrant owns an external account.
#[async_trait]
pub trait LocalPersistence: Send + Sync {
    /// Persists the link. A second link for the same registrant is a
    /// non-retryable `AlreadyExists` failure.
    async fn persist(&self, registrant: &Registrant, external_id: &str) -> Result<(), StepError>;
}

/// Writes account links through a [`RegistrantStore`].
#[derive(Debug, Clone)]
pub struct StoreLocalPersistence<S, C = SystemClock> {
    store: S,
    clock: C,
}

impl<S: RegistrantStore> StoreLocalPersistence<S> {
    pub fn new(store: S) -> Self {
        Self::with_clock(store, SystemClock)
    }
}

impl<S: RegistrantStore, C: Clock> StoreLocalPersistence<S, C> {
    pub fn with_clock(store: S, clock: C) -> Self {
        Self { store, clock }
    }
}

fn classify(err: StoreError) -> StepError {
    match err {
        StoreError::AlreadyExists { entity, key } => StepError::non_retryable(
            Status::already_exists(format!("{entity} {key} already exists")),
        ),
        other => StepError::retryable(Status::internal(other.to_string())),
    }
}

#[async_trait]
impl<S: RegistrantStore, C: Clock> LocalPersistence for StoreLocalPersistence<S, C> {
    async fn persist(&self, registrant: &Registrant, external_id: &str) -> Result<(), StepError> {
        let link = AccountLink {
            registrant_id: registrant.id,
            external_id: external_id.to_string(),
            created_at: self.clock.now(),
        };
        self.store.insert_account_link(link).await.map_err(classify)
    }
}

#[derive(Debug, Default)]
struct InMemoryPersistenceState {
    links: HashMap<EntityId, String>,
    failures: VecDeque<StepError>,
    calls: usize,
}

/// In-memory local persistence with scripted failures, for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLocalPersistence {
    state: Arc<Mutex<InMemoryPersistenceState>>,
}

impl InMemoryLocalPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, InMemoryPersistenceState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Makes the next `persist` call fail with `err`. Failures queue up.
    pub fn fail_next(&self, err: StepError) {
        self.state().failures.push_back(err);
    }

    /// Makes the next `count` calls fail with a retryable `Internal` error.
    pub fn fail_next_times(&self, count: usize) {
        let mut state = self.state();
        for _ in 0..count {
            state
                .failures
                .push_back(StepError::retryable(Status::internal("database unavailable")));
        }
    }

    /// Number of `persist` calls so far.
    pub fn calls(&self) -> usize {
        self.state().calls
    }

    /// Returns the external id linked to a registrant.
    pub fn link_for(&self, registrant_id: EntityId) -> Option<String> {
        self.state().links.get(&registrant_id).cloned()
    }
}

#[async_trait]
impl LocalPersistence for InMemoryLocalPersistence {
    async fn persist(&self, registrant: &Registrant, external_id: &str) -> Result<(), StepError> {
        let mut state = self.state();
        state.calls += 1;

        if let Some(err) = state.failures.pop_front() {
            return Err(err);
        }
        if state.links.contains_key(&registrant.id) {
            return Err(StepError::non_retryable(Status::already_exists(format!(
                "account link for {} already exists",
                registrant.id
            ))));
        }

        state.links.insert(registrant.id, external_id.to_string());
        Ok(())
    }
}
