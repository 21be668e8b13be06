//! End-to-end relay tests: registration, outbox, poller and orchestrator over
//! the in-memory store.

use std::time::Duration;

use common::{EntityId, ManualClock, Status};
use domain::{NewRegistrant, RegistrationService};
use relay::{RelayConfig, RelayPoller};
use saga::{
    InMemoryIdentityProvider, InMemoryLocalPersistence, LocalPersistence, SagaOrchestrator,
    SagaState, StepError, StoreLocalPersistence, saga_id_for,
};
use store::{InMemoryStore, OutboxStatus, OutboxStore, RegistrantStore};

struct Harness<P> {
    store: InMemoryStore,
    registration: RegistrationService<InMemoryStore, ManualClock>,
    identity: InMemoryIdentityProvider,
    orchestrator: SagaOrchestrator<InMemoryIdentityProvider, P>,
}

impl<P: LocalPersistence + 'static> Harness<P> {
    fn with_persistence(store: InMemoryStore, persistence: P) -> Self {
        let identity = InMemoryIdentityProvider::new();
        Self {
            registration: RegistrationService::new(store.clone(), ManualClock::default()),
            orchestrator: SagaOrchestrator::new(identity.clone(), persistence),
            identity,
            store,
        }
    }

    fn poller(
        &self,
        batch_size: usize,
    ) -> RelayPoller<InMemoryStore, SagaOrchestrator<InMemoryIdentityProvider, P>> {
        RelayPoller::new(
            self.store.clone(),
            self.orchestrator.clone(),
            RelayConfig {
                batch_size,
                ..Default::default()
            },
        )
    }

    async fn register(&self, name: &str, email: &str) -> EntityId {
        self.registration
            .register(NewRegistrant::new(name, email), "tester")
            .await
            .unwrap()
    }

    async fn outbox_status(&self, registrant_id: EntityId) -> OutboxStatus {
        self.store
            .outbox_records()
            .await
            .into_iter()
            .find(|r| r.payload["id"] == serde_json::json!(registrant_id))
            .map(|r| r.status)
            .unwrap()
    }
}

#[tokio::test(start_paused = true)]
async fn test_retried_local_step_ends_delivered() {
    let persistence = InMemoryLocalPersistence::new();
    persistence.fail_next_times(2);
    let h = Harness::with_persistence(InMemoryStore::new(), persistence.clone());
    let id = h.register("Ann", "ann@x.com").await;

    let report = h.poller(1).tick().await.unwrap();

    assert_eq!(report.delivered, 1);
    assert_eq!(h.outbox_status(id).await, OutboxStatus::Delivered);
    assert_eq!(persistence.calls(), 3);
    assert!(persistence.link_for(id).is_some());
    assert_eq!(h.identity.delete_calls(), 0);

    let saga = h.orchestrator.get_saga(&saga_id_for(id)).unwrap();
    assert_eq!(saga.state(), SagaState::Completed);
    assert_eq!(saga.compensation_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_existing_external_account_ends_failed() {
    let h = Harness::with_persistence(InMemoryStore::new(), InMemoryLocalPersistence::new());
    h.identity.seed_account("ann@x.com");
    let id = h.register("Ann", "ann@x.com").await;

    let report = h.poller(1).tick().await.unwrap();

    assert_eq!(report.failed, 1);
    assert_eq!(h.outbox_status(id).await, OutboxStatus::Failed);
    assert_eq!(h.identity.delete_calls(), 0);

    let saga = h.orchestrator.get_saga(&saga_id_for(id)).unwrap();
    assert_eq!(saga.state(), SagaState::Failed);
    assert_eq!(saga.compensation_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_non_retryable_local_failure_compensates_and_fails() {
    let persistence = InMemoryLocalPersistence::new();
    persistence.fail_next(StepError::non_retryable(Status::already_exists("linked")));
    let h = Harness::with_persistence(InMemoryStore::new(), persistence);
    let id = h.register("Ann", "ann@x.com").await;

    h.poller(1).tick().await.unwrap();

    assert_eq!(h.outbox_status(id).await, OutboxStatus::Failed);
    assert_eq!(h.identity.delete_calls(), 1);
    assert_eq!(h.identity.account_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_store_persistence_writes_account_link() {
    let store = InMemoryStore::new();
    let h = Harness::with_persistence(store.clone(), StoreLocalPersistence::new(store.clone()));
    let id = h.register("Ann", "ann@x.com").await;

    h.poller(1).tick().await.unwrap();

    assert_eq!(h.outbox_status(id).await, OutboxStatus::Delivered);
    let link = store.get_account_link(id).await.unwrap().unwrap();
    assert!(h.identity.has_account(&link.external_id));
    assert_eq!(store.count_by_status(OutboxStatus::Ready).await.unwrap(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_competing_pollers_dispatch_each_record_once() {
    let h = Harness::with_persistence(InMemoryStore::new(), InMemoryLocalPersistence::new());
    let mut ids = Vec::new();
    for i in 0..6 {
        ids.push(h.register("Ann", &format!("ann{i}@x.com")).await);
    }

    let first = h.poller(6);
    let second = h.poller(6);
    let (a, b) = tokio::join!(first.tick(), second.tick());
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(a.claimed + b.claimed, 6);
    assert_eq!(a.delivered + b.delivered, 6);
    assert_eq!(h.identity.create_calls(), 6);
    for id in ids {
        assert_eq!(h.outbox_status(id).await, OutboxStatus::Delivered);
    }
}

#[tokio::test(start_paused = true)]
async fn test_running_poller_drains_outbox_and_stops() {
    let h = Harness::with_persistence(InMemoryStore::new(), InMemoryLocalPersistence::new());
    let handle = h.poller(1).start();

    let first = h.register("Ann", "ann@x.com").await;
    let second = h.register("Bob", "bob@x.com").await;
    tokio::time::sleep(Duration::from_secs(3)).await;

    assert_eq!(h.outbox_status(first).await, OutboxStatus::Delivered);
    assert_eq!(h.outbox_status(second).await, OutboxStatus::Delivered);

    handle.stop().await.unwrap();

    let late = h.register("Cid", "cid@x.com").await;
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(h.outbox_status(late).await, OutboxStatus::Ready);
}
