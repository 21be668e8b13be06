use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::{
    AccountLink, EntityId, OutboxRecord, OutboxStatus, RegistrantRecord, Result, StoreError,
    store::{OutboxStore, RegistrantStore},
};

#[derive(Default)]
struct Tables {
    registrants: HashMap<EntityId, RegistrantRecord>,
    /// Kept in insertion order.
    outbox: Vec<OutboxRecord>,
    account_links: HashMap<EntityId, AccountLink>,
}

#[derive(Default)]
struct Faults {
    outbox_insert: AtomicBool,
    fetch: AtomicBool,
    transition_to_processing: AtomicBool,
    transition_to_terminal: AtomicBool,
}

/// In-memory store implementation for testing and single-process runs.
///
/// Mirrors the transactional behavior of the PostgreSQL implementation and
/// exposes fault-injection switches for exercising failure paths.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
    faults: Arc<Faults>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the outbox half of `insert_with_outbox` fail after the
    /// registrant half succeeded.
    pub fn set_fail_on_outbox_insert(&self, fail: bool) {
        self.faults.outbox_insert.store(fail, Ordering::SeqCst);
    }

    /// Makes `fetch_ready` and `fetch_expired` fail.
    pub fn set_fail_on_fetch(&self, fail: bool) {
        self.faults.fetch.store(fail, Ordering::SeqCst);
    }

    /// Makes READY -> PROCESSING transitions and reclaims fail.
    pub fn set_fail_on_claim(&self, fail: bool) {
        self.faults
            .transition_to_processing
            .store(fail, Ordering::SeqCst);
    }

    /// Makes transitions into DELIVERED or FAILED fail.
    pub fn set_fail_on_finish(&self, fail: bool) {
        self.faults
            .transition_to_terminal
            .store(fail, Ordering::SeqCst);
    }

    /// Returns all outbox records in insertion order.
    pub async fn outbox_records(&self) -> Vec<OutboxRecord> {
        self.tables.read().await.outbox.clone()
    }

    /// Inserts an outbox record on its own, bypassing the registrant half.
    pub async fn seed_outbox(&self, record: OutboxRecord) {
        self.tables.write().await.outbox.push(record);
    }

    fn injected(what: &str) -> StoreError {
        StoreError::Unavailable(format!("injected fault: {what}"))
    }
}

#[async_trait]
impl RegistrantStore for InMemoryStore {
    async fn insert_with_outbox(
        &self,
        registrant: RegistrantRecord,
        outbox: OutboxRecord,
    ) -> Result<()> {
        let mut tables = self.tables.write().await;

        let duplicate = tables.registrants.contains_key(&registrant.id)
            || tables
                .registrants
                .values()
                .any(|r| r.email == registrant.email);
        if duplicate {
            return Err(StoreError::AlreadyExists {
                entity: "registrant",
                key: registrant.email,
            });
        }

        let registrant_id = registrant.id;
        tables.registrants.insert(registrant_id, registrant);

        // Second statement of the transaction; undo the first on failure.
        let outbox_result = if self.faults.outbox_insert.load(Ordering::SeqCst) {
            Err(Self::injected("outbox insert"))
        } else if tables.outbox.iter().any(|r| r.id == outbox.id) {
            Err(StoreError::AlreadyExists {
                entity: "outbox record",
                key: outbox.id.to_string(),
            })
        } else {
            Ok(())
        };

        match outbox_result {
            Ok(()) => {
                tables.outbox.push(outbox);
                Ok(())
            }
            Err(e) => {
                tables.registrants.remove(&registrant_id);
                Err(e)
            }
        }
    }

    async fn get_registrant(&self, id: EntityId) -> Result<Option<RegistrantRecord>> {
        Ok(self.tables.read().await.registrants.get(&id).cloned())
    }

    async fn delete_registrant(&self, id: EntityId) -> Result<bool> {
        Ok(self.tables.write().await.registrants.remove(&id).is_some())
    }

    async fn count_registrants(&self) -> Result<usize> {
        Ok(self.tables.read().await.registrants.len())
    }

    async fn insert_account_link(&self, link: AccountLink) -> Result<()> {
        let mut tables = self.tables.write().await;
        if tables.account_links.contains_key(&link.registrant_id) {
            return Err(StoreError::AlreadyExists {
                entity: "account link",
                key: link.registrant_id.to_string(),
            });
        }
        tables.account_links.insert(link.registrant_id, link);
        Ok(())
    }

    async fn get_account_link(&self, registrant_id: EntityId) -> Result<Option<AccountLink>> {
        Ok(self
            .tables
            .read()
            .await
            .account_links
            .get(&registrant_id)
            .cloned())
    }
}

#[async_trait]
impl OutboxStore for InMemoryStore {
    async fn fetch_ready(&self, limit: usize) -> Result<Vec<OutboxRecord>> {
        if self.faults.fetch.load(Ordering::SeqCst) {
            return Err(Self::injected("fetch"));
        }

        let tables = self.tables.read().await;
        let mut ready: Vec<_> = tables
            .outbox
            .iter()
            .filter(|r| r.status == OutboxStatus::Ready)
            .cloned()
            .collect();
        ready.sort_by_key(|r| r.audit.created_at);
        ready.truncate(limit);
        Ok(ready)
    }

    async fn fetch_expired(
        &self,
        limit: usize,
        leased_before: DateTime<Utc>,
    ) -> Result<Vec<OutboxRecord>> {
        if self.faults.fetch.load(Ordering::SeqCst) {
            return Err(Self::injected("fetch"));
        }

        let tables = self.tables.read().await;
        let mut expired: Vec<_> = tables
            .outbox
            .iter()
            .filter(|r| r.status == OutboxStatus::Processing && r.audit.updated_at < leased_before)
            .cloned()
            .collect();
        expired.sort_by_key(|r| r.audit.created_at);
        expired.truncate(limit);
        Ok(expired)
    }

    async fn reclaim(
        &self,
        id: EntityId,
        leased_before: DateTime<Utc>,
        actor: &str,
        at: DateTime<Utc>,
    ) -> Result<()> {
        if self.faults.transition_to_processing.load(Ordering::SeqCst) {
            return Err(Self::injected("reclaim"));
        }

        let mut tables = self.tables.write().await;
        let record = tables
            .outbox
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(StoreError::NotFound {
                entity: "outbox record",
                id,
            })?;

        if record.status != OutboxStatus::Processing {
            return Err(StoreError::StatusConflict {
                id,
                expected: OutboxStatus::Processing,
                actual: record.status,
            });
        }
        if record.audit.updated_at >= leased_before {
            return Err(StoreError::LeaseHeld { id, leased_before });
        }

        record.audit.touch(actor, at);
        Ok(())
    }

    async fn transition(
        &self,
        id: EntityId,
        from: OutboxStatus,
        to: OutboxStatus,
        actor: &str,
        at: DateTime<Utc>,
    ) -> Result<()> {
        if !from.can_transition_to(to) {
            return Err(StoreError::InvalidTransition { from, to });
        }
        let fault = if to == OutboxStatus::Processing {
            &self.faults.transition_to_processing
        } else {
            &self.faults.transition_to_terminal
        };
        if fault.load(Ordering::SeqCst) {
            return Err(Self::injected("status update"));
        }

        let mut tables = self.tables.write().await;
        let record = tables
            .outbox
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(StoreError::NotFound {
                entity: "outbox record",
                id,
            })?;

        if record.status != from {
            return Err(StoreError::StatusConflict {
                id,
                expected: from,
                actual: record.status,
            });
        }

        record.status = to;
        record.audit.touch(actor, at);
        Ok(())
    }

    async fn get_outbox_record(&self, id: EntityId) -> Result<Option<OutboxRecord>> {
        Ok(self
            .tables
            .read()
            .await
            .outbox
            .iter()
            .find(|r| r.id == id)
            .cloned())
    }

    async fn count_by_status(&self, status: OutboxStatus) -> Result<usize> {
        Ok(self
            .tables
            .read()
            .await
            .outbox
            .iter()
            .filter(|r| r.status == status)
            .count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Audit;

    fn registrant(email: &str) -> RegistrantRecord {
        RegistrantRecord {
            id: EntityId::new(),
            name: "Ann".to_string(),
            email: email.to_string(),
            audit: Audit::created("tester", Utc::now()),
        }
    }

    fn outbox_for(registrant: &RegistrantRecord) -> OutboxRecord {
        OutboxRecord::ready(
            serde_json::to_value(registrant).unwrap(),
            registrant.audit.clone(),
        )
    }

    #[tokio::test]
    async fn insert_with_outbox_writes_both_rows() {
        let store = InMemoryStore::new();
        let r = registrant("ann@x.com");
        let o = outbox_for(&r);

        store.insert_with_outbox(r.clone(), o.clone()).await.unwrap();

        assert_eq!(store.get_registrant(r.id).await.unwrap(), Some(r));
        assert_eq!(store.get_outbox_record(o.id).await.unwrap(), Some(o));
    }

    #[tokio::test]
    async fn outbox_failure_rolls_back_registrant() {
        let store = InMemoryStore::new();
        store.set_fail_on_outbox_insert(true);
        let r = registrant("ann@x.com");
        let o = outbox_for(&r);

        let result = store.insert_with_outbox(r.clone(), o).await;

        assert!(matches!(result, Err(StoreError::Unavailable(_))));
        assert!(store.get_registrant(r.id).await.unwrap().is_none());
        assert_eq!(store.count_registrants().await.unwrap(), 0);
        assert!(store.outbox_records().await.is_empty());
    }

    #[tokio::test]
    async fn duplicate_email_is_already_exists() {
        let store = InMemoryStore::new();
        let first = registrant("ann@x.com");
        store
            .insert_with_outbox(first.clone(), outbox_for(&first))
            .await
            .unwrap();

        let second = registrant("ann@x.com");
        let result = store
            .insert_with_outbox(second.clone(), outbox_for(&second))
            .await;

        assert!(result.unwrap_err().is_already_exists());
        assert_eq!(store.count_registrants().await.unwrap(), 1);
        assert_eq!(store.outbox_records().await.len(), 1);
    }

    #[tokio::test]
    async fn fetch_ready_returns_oldest_first_up_to_limit() {
        let store = InMemoryStore::new();
        let t0 = Utc::now();
        let newer = OutboxRecord::ready(
            serde_json::json!({"n": 2}),
            Audit::created("t", t0 + chrono::Duration::seconds(10)),
        );
        let older = OutboxRecord::ready(serde_json::json!({"n": 1}), Audit::created("t", t0));
        store.seed_outbox(newer.clone()).await;
        store.seed_outbox(older.clone()).await;

        let fetched = store.fetch_ready(1).await.unwrap();
        assert_eq!(fetched, vec![older]);

        let fetched = store.fetch_ready(10).await.unwrap();
        assert_eq!(fetched.len(), 2);
    }

    #[tokio::test]
    async fn transition_is_compare_and_set() {
        let store = InMemoryStore::new();
        let record = OutboxRecord::ready(serde_json::json!({}), Audit::created("t", Utc::now()));
        store.seed_outbox(record.clone()).await;

        store
            .transition(
                record.id,
                OutboxStatus::Ready,
                OutboxStatus::Processing,
                "poller-a",
                Utc::now(),
            )
            .await
            .unwrap();

        // A second claimer loses.
        let result = store
            .transition(
                record.id,
                OutboxStatus::Ready,
                OutboxStatus::Processing,
                "poller-b",
                Utc::now(),
            )
            .await;
        assert!(matches!(result, Err(StoreError::StatusConflict { .. })));

        let stored = store.get_outbox_record(record.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OutboxStatus::Processing);
        assert_eq!(stored.audit.updated_by, "poller-a");
        assert!(store.fetch_ready(10).await.unwrap().is_empty());
    }

    async fn claimed(store: &InMemoryStore, claimed_at: DateTime<Utc>) -> OutboxRecord {
        let record = OutboxRecord::ready(serde_json::json!({}), Audit::created("t", claimed_at));
        store.seed_outbox(record.clone()).await;
        store
            .transition(
                record.id,
                OutboxStatus::Ready,
                OutboxStatus::Processing,
                "poller-a",
                claimed_at,
            )
            .await
            .unwrap();
        record
    }

    #[tokio::test]
    async fn fetch_expired_skips_live_claims() {
        let store = InMemoryStore::new();
        let t0 = Utc::now();
        let stale = claimed(&store, t0).await;
        let _live = claimed(&store, t0 + chrono::Duration::minutes(10)).await;
        let ready = OutboxRecord::ready(serde_json::json!({}), Audit::created("t", t0));
        store.seed_outbox(ready).await;

        let fetched = store
            .fetch_expired(10, t0 + chrono::Duration::minutes(5))
            .await
            .unwrap();
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched[0].id, stale.id);
    }

    #[tokio::test]
    async fn reclaim_takes_over_expired_claim_once() {
        let store = InMemoryStore::new();
        let t0 = Utc::now();
        let record = claimed(&store, t0).await;
        let cutoff = t0 + chrono::Duration::minutes(5);
        let now = t0 + chrono::Duration::minutes(6);

        store.reclaim(record.id, cutoff, "poller-b", now).await.unwrap();

        // The renewed lease is now held by poller-b.
        let second = store.reclaim(record.id, cutoff, "poller-c", now).await;
        assert!(matches!(second, Err(StoreError::LeaseHeld { .. })));

        let stored = store.get_outbox_record(record.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OutboxStatus::Processing);
        assert_eq!(stored.audit.updated_by, "poller-b");
        assert_eq!(stored.audit.updated_at, now);
        assert!(store.fetch_expired(10, cutoff).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn reclaim_of_finished_record_conflicts() {
        let store = InMemoryStore::new();
        let t0 = Utc::now();
        let record = claimed(&store, t0).await;
        store
            .transition(
                record.id,
                OutboxStatus::Processing,
                OutboxStatus::Delivered,
                "poller-a",
                t0,
            )
            .await
            .unwrap();

        let result = store
            .reclaim(record.id, t0 + chrono::Duration::minutes(5), "poller-b", t0)
            .await;
        assert!(matches!(
            result,
            Err(StoreError::StatusConflict {
                actual: OutboxStatus::Delivered,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn transition_rejects_backwards_moves() {
        let store = InMemoryStore::new();
        let result = store
            .transition(
                EntityId::new(),
                OutboxStatus::Failed,
                OutboxStatus::Ready,
                "t",
                Utc::now(),
            )
            .await;
        assert!(matches!(result, Err(StoreError::InvalidTransition { .. })));
    }

    #[tokio::test]
    async fn transition_unknown_record_is_not_found() {
        let store = InMemoryStore::new();
        let result = store
            .transition(
                EntityId::new(),
                OutboxStatus::Ready,
                OutboxStatus::Processing,
                "t",
                Utc::now(),
            )
            .await;
        assert!(matches!(result, Err(StoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn account_link_is_unique_per_registrant() {
        let store = InMemoryStore::new();
        let registrant_id = EntityId::new();
        let link = AccountLink {
            registrant_id,
            external_id: "ext-1".to_string(),
            created_at: Utc::now(),
        };

        store.insert_account_link(link.clone()).await.unwrap();
        let again = store.insert_account_link(link.clone()).await;

        assert!(again.unwrap_err().is_already_exists());
        assert_eq!(
            store.get_account_link(registrant_id).await.unwrap(),
            Some(link)
        );
    }

    #[tokio::test]
    async fn delete_registrant_keeps_outbox_trail() {
        let store = InMemoryStore::new();
        let r = registrant("ann@x.com");
        store
            .insert_with_outbox(r.clone(), outbox_for(&r))
            .await
            .unwrap();

        assert!(store.delete_registrant(r.id).await.unwrap());
        assert!(!store.delete_registrant(r.id).await.unwrap());
        assert_eq!(store.outbox_records().await.len(), 1);
    }
}
