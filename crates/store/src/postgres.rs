use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    AccountLink, Audit, EntityId, OutboxRecord, OutboxStatus, RegistrantRecord, Result,
    StoreError,
    store::{OutboxStore, RegistrantStore},
};

/// PostgreSQL-backed store implementation.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_audit(row: &PgRow) -> Result<Audit> {
        Ok(Audit {
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            created_by: row.try_get("created_by")?,
            updated_by: row.try_get("updated_by")?,
        })
    }

    fn row_to_registrant(row: PgRow) -> Result<RegistrantRecord> {
        Ok(RegistrantRecord {
            id: EntityId::from_uuid(row.try_get::<Uuid, _>("id")?),
            name: row.try_get("name")?,
            email: row.try_get("email")?,
            audit: Self::row_to_audit(&row)?,
        })
    }

    fn row_to_outbox(row: PgRow) -> Result<OutboxRecord> {
        let status: String = row.try_get("status")?;
        Ok(OutboxRecord {
            id: EntityId::from_uuid(row.try_get::<Uuid, _>("id")?),
            status: status.parse()?,
            payload: row.try_get("payload")?,
            audit: Self::row_to_audit(&row)?,
        })
    }

    /// Maps unique violations to `AlreadyExists`.
    fn map_insert_error(e: sqlx::Error, entity: &'static str, key: String) -> StoreError {
        if let sqlx::Error::Database(ref db_err) = e
            && db_err.is_unique_violation()
        {
            return StoreError::AlreadyExists { entity, key };
        }
        StoreError::Database(e)
    }
}

#[async_trait]
impl RegistrantStore for PostgresStore {
    async fn insert_with_outbox(
        &self,
        registrant: RegistrantRecord,
        outbox: OutboxRecord,
    ) -> Result<()> {
        // Dropping the transaction without commit rolls both inserts back.
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO registrants (id, name, email, created_at, updated_at, created_by, updated_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(registrant.id.as_uuid())
        .bind(&registrant.name)
        .bind(&registrant.email)
        .bind(registrant.audit.created_at)
        .bind(registrant.audit.updated_at)
        .bind(&registrant.audit.created_by)
        .bind(&registrant.audit.updated_by)
        .execute(&mut *tx)
        .await
        .map_err(|e| Self::map_insert_error(e, "registrant", registrant.email.clone()))?;

        sqlx::query(
            r#"
            INSERT INTO outbox (id, status, payload, created_at, updated_at, created_by, updated_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(outbox.id.as_uuid())
        .bind(outbox.status.as_str())
        .bind(&outbox.payload)
        .bind(outbox.audit.created_at)
        .bind(outbox.audit.updated_at)
        .bind(&outbox.audit.created_by)
        .bind(&outbox.audit.updated_by)
        .execute(&mut *tx)
        .await
        .map_err(|e| Self::map_insert_error(e, "outbox record", outbox.id.to_string()))?;

        tx.commit().await?;
        Ok(())
    }

    async fn get_registrant(&self, id: EntityId) -> Result<Option<RegistrantRecord>> {
        let row = sqlx::query(
            r#"
            SELECT id, name, email, created_at, updated_at, created_by, updated_by
            FROM registrants
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_registrant).transpose()
    }

    async fn delete_registrant(&self, id: EntityId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM registrants WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn count_registrants(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM registrants")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }

    async fn insert_account_link(&self, link: AccountLink) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO registrant_accounts (registrant_id, external_id, created_at)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(link.registrant_id.as_uuid())
        .bind(&link.external_id)
        .bind(link.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| Self::map_insert_error(e, "account link", link.registrant_id.to_string()))?;
        Ok(())
    }

    async fn get_account_link(&self, registrant_id: EntityId) -> Result<Option<AccountLink>> {
        let row = sqlx::query(
            r#"
            SELECT registrant_id, external_id, created_at
            FROM registrant_accounts
            WHERE registrant_id = $1
            "#,
        )
        .bind(registrant_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(AccountLink {
                registrant_id: EntityId::from_uuid(row.try_get::<Uuid, _>("registrant_id")?),
                external_id: row.try_get("external_id")?,
                created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
            })),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl OutboxStore for PostgresStore {
    async fn fetch_ready(&self, limit: usize) -> Result<Vec<OutboxRecord>> {
        let mut tx = self.pool.begin().await?;

        let rows = sqlx::query(
            r#"
            SELECT id, status, payload, created_at, updated_at, created_by, updated_by
            FROM outbox
            WHERE status = 'READY'
            ORDER BY created_at ASC
            LIMIT $1
            FOR UPDATE SKIP LOCKED
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;
        rows.into_iter().map(Self::row_to_outbox).collect()
    }

    async fn fetch_expired(
        &self,
        limit: usize,
        leased_before: DateTime<Utc>,
    ) -> Result<Vec<OutboxRecord>> {
        let mut tx = self.pool.begin().await?;

        let rows = sqlx::query(
            r#"
            SELECT id, status, payload, created_at, updated_at, created_by, updated_by
            FROM outbox
            WHERE status = 'PROCESSING' AND updated_at < $2
            ORDER BY created_at ASC
            LIMIT $1
            FOR UPDATE SKIP LOCKED
            "#,
        )
        .bind(limit as i64)
        .bind(leased_before)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;
        rows.into_iter().map(Self::row_to_outbox).collect()
    }

    async fn reclaim(
        &self,
        id: EntityId,
        leased_before: DateTime<Utc>,
        actor: &str,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE outbox
            SET updated_at = $3, updated_by = $4
            WHERE id = $1 AND status = 'PROCESSING' AND updated_at < $2
            "#,
        )
        .bind(id.as_uuid())
        .bind(leased_before)
        .bind(at)
        .bind(actor)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(());
        }

        let actual: Option<String> = sqlx::query_scalar("SELECT status FROM outbox WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        match actual.map(|s| s.parse::<OutboxStatus>()).transpose()? {
            Some(OutboxStatus::Processing) => Err(StoreError::LeaseHeld { id, leased_before }),
            Some(actual) => Err(StoreError::StatusConflict {
                id,
                expected: OutboxStatus::Processing,
                actual,
            }),
            None => Err(StoreError::NotFound {
                entity: "outbox record",
                id,
            }),
        }
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

        let result = sqlx::query(
            r#"
            UPDATE outbox
            SET status = $3, updated_at = $4, updated_by = $5
            WHERE id = $1 AND status = $2
            "#,
        )
        .bind(id.as_uuid())
        .bind(from.as_str())
        .bind(to.as_str())
        .bind(at)
        .bind(actor)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(());
        }

        let actual: Option<String> = sqlx::query_scalar("SELECT status FROM outbox WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        match actual {
            Some(actual) => Err(StoreError::StatusConflict {
                id,
                expected: from,
                actual: actual.parse()?,
            }),
            None => Err(StoreError::NotFound {
                entity: "outbox record",
                id,
            }),
        }
    }

    async fn get_outbox_record(&self, id: EntityId) -> Result<Option<OutboxRecord>> {
        let row = sqlx::query(
            r#"
            SELECT id, status, payload, created_at, updated_at, created_by, updated_by
            FROM outbox
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_outbox).transpose()
    }

    async fn count_by_status(&self, status: OutboxStatus) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM outbox WHERE status = $1")
            .bind(status.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }
}
