use std::time::Duration;

use async_trait::async_trait;

use crate::Result;

/// Key/value store with per-key expiry.
///
/// `set` overwrites any existing value for the key; values are never merged.
/// Only store-level atomic get/set is assumed, no locking across calls.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Returns the value for `key` if present and not expired.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Stores `value` under `key` for `ttl`.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()>;

    /// Deletes every expired entry. Returns the number removed.
    async fn purge_expired(&self) -> Result<u64>;
}
