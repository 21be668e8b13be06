use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{AccountLink, EntityId, OutboxRecord, OutboxStatus, RegistrantRecord, Result};

/// Registrant rows and the account links written by the saga.
///
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait RegistrantStore: Send + Sync {
    /// Inserts a registrant and its companion outbox record in one transaction.
    ///
    /// Either both rows become visible or neither does. A duplicate email
    /// fails with `AlreadyExists` and leaves no trace.
    async fn insert_with_outbox(
        &self,
        registrant: RegistrantRecord,
        outbox: OutboxRecord,
    ) -> Result<()>;

    /// Retrieves a registrant by ID.
    async fn get_registrant(&self, id: EntityId) -> Result<Option<RegistrantRecord>>;

    /// Deletes a registrant row. Returns false if it did not exist.
    ///
    /// Outbox records referencing the registrant are kept as audit trail.
    async fn delete_registrant(&self, id: EntityId) -> Result<bool>;

    /// Returns the number of registrant rows.
    async fn count_registrants(&self) -> Result<usize>;

    /// Inserts an account link. A second link for the same registrant fails
    /// with `AlreadyExists`.
    async fn insert_account_link(&self, link: AccountLink) -> Result<()>;

    /// Retrieves the account link for a registrant.
    async fn get_account_link(&self, registrant_id: EntityId) -> Result<Option<AccountLink>>;
}

/// Outbox records as seen by relay pollers.
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Fetches up to `limit` READY records, oldest first.
    ///
    /// Rows currently locked by another poller are skipped.
    async fn fetch_ready(&self, limit: usize) -> Result<Vec<OutboxRecord>>;

    /// Fetches up to `limit` PROCESSING records whose last update is older
    /// than `leased_before`, oldest first.
    ///
    /// These are claims whose poller stopped before finishing them.
    async fn fetch_expired(
        &self,
        limit: usize,
        leased_before: DateTime<Utc>,
    ) -> Result<Vec<OutboxRecord>>;

    /// Takes over an expired PROCESSING claim, renewing its lease to `at`.
    ///
    /// Fails with `LeaseHeld` while the current claim is younger than
    /// `leased_before` and with `StatusConflict` once the record has left
    /// PROCESSING.
    async fn reclaim(
        &self,
        id: EntityId,
        leased_before: DateTime<Utc>,
        actor: &str,
        at: DateTime<Utc>,
    ) -> Result<()>;

    /// Moves a record from `from` to `to` if it is still in `from`.
    ///
    /// Fails with `InvalidTransition` for non-forward changes and with
    /// `StatusConflict` if another writer moved the record first.
    async fn transition(
        &self,
        id: EntityId,
        from: OutboxStatus,
        to: OutboxStatus,
        actor: &str,
        at: DateTime<Utc>,
    ) -> Result<()>;

    /// Retrieves an outbox record by ID.
    async fn get_outbox_record(&self, id: EntityId) -> Result<Option<OutboxRecord>>;

    /// Counts records in the given status.
    async fn count_by_status(&self, status: OutboxStatus) -> Result<usize>;
}
