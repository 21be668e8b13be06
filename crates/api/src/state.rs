//! Shared application state.

use common::SystemClock;
use domain::RegistrationService;
use idempotency::IdempotencyInterceptor;
use saga::{InMemoryIdentityProvider, SagaOrchestrator, StoreLocalPersistence};
use store::{OutboxStore, RegistrantStore};

/// A relational store usable by every route and by the relay.
pub trait AppStore: RegistrantStore + OutboxStore + Clone + 'static {}

impl<T> AppStore for T where T: RegistrantStore + OutboxStore + Clone + 'static {}

/// The orchestrator wired by the server.
pub type Orchestrator<S> = SagaOrchestrator<InMemoryIdentityProvider, StoreLocalPersistence<S>>;

/// Shared application state accessible from all handlers.
pub struct AppState<S: AppStore> {
    pub registration: RegistrationService<S, SystemClock>,
    pub idempotency: IdempotencyInterceptor,
    pub orchestrator: Orchestrator<S>,
    pub identity: InMemoryIdentityProvider,
    pub store: S,
}
