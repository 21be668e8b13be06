//! Integration tests for the registration use case.
//!
//! These tests verify that a registrant and its outbox intent are written
//! together or not at all.

use std::sync::Arc;

use common::{Code, ManualClock, Status};
use domain::{DomainError, NewRegistrant, Registrant, RegistrationService};
use store::{InMemoryStore, OutboxStatus, OutboxStore, RegistrantStore};

fn create_service() -> (RegistrationService<InMemoryStore, ManualClock>, InMemoryStore) {
    let store = InMemoryStore::new();
    (
        RegistrationService::new(store.clone(), ManualClock::default()),
        store,
    )
}

mod outbox_atomicity {
    use super::*;

    #[tokio::test]
    async fn registrant_and_intent_share_payload() {
        let (service, store) = create_service();

        let id = service
            .register(NewRegistrant::new("Ann", "ann@x.com"), "alice")
            .await
            .unwrap();

        let stored = store.get_registrant(id).await.unwrap().unwrap();
        let ready = store.fetch_ready(10).await.unwrap();
        assert_eq!(ready.len(), 1);

        let payload: Registrant = serde_json::from_value(ready[0].payload.clone()).unwrap();
        assert_eq!(payload.id, stored.id);
        assert_eq!(payload.email.as_str(), stored.email);
        assert_eq!(ready[0].audit, stored.audit);
    }

    #[tokio::test]
    async fn simulated_outbox_fault_rolls_back_primary_row() {
        let (service, store) = create_service();
        store.set_fail_on_outbox_insert(true);

        let err = service
            .register(NewRegistrant::new("Ann", "ann@x.com"), "alice")
            .await
            .unwrap_err();

        assert_eq!(Status::from(err).code, Code::Internal);
        assert_eq!(store.count_registrants().await.unwrap(), 0);
        assert_eq!(store.count_by_status(OutboxStatus::Ready).await.unwrap(), 0);

        // The same registration succeeds once the fault clears.
        store.set_fail_on_outbox_insert(false);
        service
            .register(NewRegistrant::new("Ann", "ann@x.com"), "alice")
            .await
            .unwrap();
        assert_eq!(store.count_registrants().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn concurrent_duplicate_emails_create_one_row() {
        let store = InMemoryStore::new();
        let service = Arc::new(RegistrationService::new(
            store.clone(),
            ManualClock::default(),
        ));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let service = Arc::clone(&service);
            handles.push(tokio::spawn(async move {
                service
                    .register(NewRegistrant::new("Ann", "ann@x.com"), "alice")
                    .await
            }));
        }

        let mut ok = 0;
        let mut duplicates = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => ok += 1,
                Err(DomainError::AlreadyExists(_)) => duplicates += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        assert_eq!(ok, 1);
        assert_eq!(duplicates, 7);
        assert_eq!(store.outbox_records().await.len(), 1);
    }
}

mod validation {
    use super::*;

    #[tokio::test]
    async fn rejected_before_any_persistence() {
        let (service, store) = create_service();

        let err = service
            .register(NewRegistrant::new("4nn", "ann@x.com"), "alice")
            .await
            .unwrap_err();

        let status = Status::from(err);
        assert_eq!(status.code, Code::InvalidArgument);
        assert_eq!(status.details[0].field, "name");
        assert_eq!(store.count_registrants().await.unwrap(), 0);
        assert!(store.outbox_records().await.is_empty());
    }

    #[tokio::test]
    async fn missing_fields_report_each_violation() {
        let (service, _) = create_service();

        let err = service
            .register(NewRegistrant::default(), "alice")
            .await
            .unwrap_err();

        let status = Status::from(err);
        assert_eq!(status.details.len(), 2);
    }
}
