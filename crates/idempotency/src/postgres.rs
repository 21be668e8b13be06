use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::{Clock, SystemClock};
use sqlx::PgPool;

use crate::{CacheError, Result, store::CacheStore};

/// PostgreSQL-backed cache store using the `idempotency_cache` table.
///
/// Expired rows read as misses and are replaced by the next `set`. Expiry is
/// evaluated against the injected clock, not the database server's.
#[derive(Clone)]
pub struct PostgresCacheStore {
    pool: PgPool,
    clock: Arc<dyn Clock>,
}

impl PostgresCacheStore {
    /// Creates a new PostgreSQL cache store reading the system clock.
    pub fn new(pool: PgPool) -> Self {
        Self::with_clock(pool, Arc::new(SystemClock))
    }

    /// Creates a store that stamps and checks expiry against `clock`.
    pub fn with_clock(pool: PgPool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }
}

#[async_trait]
impl CacheStore for PostgresCacheStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let payload: Option<Vec<u8>> = sqlx::query_scalar(
            r#"
            SELECT payload
            FROM idempotency_cache
            WHERE lookup_key = $1 AND expires_at > $2
            "#,
        )
        .bind(key)
        .bind(self.clock.now())
        .fetch_optional(&self.pool)
        .await?;

        Ok(payload)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| CacheError::Unavailable(format!("ttl out of range: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO idempotency_cache (lookup_key, payload, expires_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (lookup_key) DO UPDATE SET
                payload = EXCLUDED.payload,
                expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(self.clock.now() + ttl)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn purge_expired(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM idempotency_cache WHERE expires_at <= $1")
            .bind(self.clock.now())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
