use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{Clock, SystemClock};
use tokio::sync::RwLock;

use crate::{CacheError, Result, store::CacheStore};

#[derive(Debug, Clone)]
struct Entry {
    value: Vec<u8>,
    expires_at: DateTime<Utc>,
}

#[derive(Default)]
struct Counters {
    gets: AtomicUsize,
    sets: AtomicUsize,
    fail_on_get: AtomicBool,
    fail_on_set: AtomicBool,
    fail_on_purge: AtomicBool,
}

/// In-memory cache store for testing and single-process runs.
#[derive(Clone)]
pub struct InMemoryCacheStore {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
    clock: Arc<dyn Clock>,
    counters: Arc<Counters>,
}

impl InMemoryCacheStore {
    /// Creates an empty store reading the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Creates an empty store that evaluates expiry against `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            clock,
            counters: Arc::new(Counters::default()),
        }
    }

    /// Makes every `get` fail.
    pub fn set_fail_on_get(&self, fail: bool) {
        self.counters.fail_on_get.store(fail, Ordering::SeqCst);
    }

    /// Makes every `set` fail.
    pub fn set_fail_on_set(&self, fail: bool) {
        self.counters.fail_on_set.store(fail, Ordering::SeqCst);
    }

    /// Makes every `purge_expired` fail.
    pub fn set_fail_on_purge(&self, fail: bool) {
        self.counters.fail_on_purge.store(fail, Ordering::SeqCst);
    }

    /// Number of `get` calls so far.
    pub fn get_count(&self) -> usize {
        self.counters.gets.load(Ordering::SeqCst)
    }

    /// Number of `set` calls so far.
    pub fn set_count(&self) -> usize {
        self.counters.sets.load(Ordering::SeqCst)
    }

    /// Number of stored entries, expired ones included.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Returns true if nothing is stored.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

impl Default for InMemoryCacheStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.counters.gets.fetch_add(1, Ordering::SeqCst);
        if self.counters.fail_on_get.load(Ordering::SeqCst) {
            return Err(CacheError::Unavailable("injected fault: get".to_string()));
        }

        let now = self.clock.now();
        let mut entries = self.entries.write().await;
        match entries.get(key) {
            Some(entry) if entry.expires_at > now => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
        self.counters.sets.fetch_add(1, Ordering::SeqCst);
        if self.counters.fail_on_set.load(Ordering::SeqCst) {
            return Err(CacheError::Unavailable("injected fault: set".to_string()));
        }

        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| CacheError::Unavailable(format!("ttl out of range: {e}")))?;
        let expires_at = self.clock.now() + ttl;

        self.entries
            .write()
            .await
            .insert(key.to_string(), Entry { value, expires_at });
        Ok(())
    }

    async fn purge_expired(&self) -> Result<u64> {
        if self.counters.fail_on_purge.load(Ordering::SeqCst) {
            return Err(CacheError::Unavailable("injected fault: purge".to_string()));
        }

        let now = self.clock.now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        Ok((before - entries.len()) as u64)
    }
}
