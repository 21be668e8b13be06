//! Idempotency interceptor wrapping mutating handlers.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use common::Status;

use crate::{CacheableResponse, CachedPayload, ResponseRegistry, store::CacheStore};

/// Call-metadata field carrying the client-supplied idempotency key.
pub const IDEMPOTENCY_KEY_HEADER: &str = "x-idempotency-key";

/// Default time-to-live for cached outcomes (1 hour).
pub const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60);

/// Configuration for the idempotency interceptor.
#[derive(Debug, Clone)]
pub struct IdempotencyConfig {
    /// Time-to-live for cached outcomes.
    pub ttl: Duration,
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        Self { ttl: DEFAULT_TTL }
    }
}

/// Builds the cache key scoping a client key to one method.
pub fn lookup_key(method: &str, key: &str) -> String {
    format!("{method}:{key}")
}

/// Replays the first outcome of a keyed call for every retry within the TTL.
///
/// Cache faults never fail a call: a read fault is treated as a miss and a
/// write fault is logged. Two calls racing with the same key before either
/// has written its outcome both run the handler.
#[derive(Clone)]
pub struct IdempotencyInterceptor {
    store: Arc<dyn CacheStore>,
    registry: Arc<ResponseRegistry>,
    config: IdempotencyConfig,
}

impl IdempotencyInterceptor {
    /// Creates an interceptor with the default configuration.
    pub fn new(store: Arc<dyn CacheStore>, registry: Arc<ResponseRegistry>) -> Self {
        Self::with_config(store, registry, IdempotencyConfig::default())
    }

    /// Creates an interceptor with a custom configuration.
    pub fn with_config(
        store: Arc<dyn CacheStore>,
        registry: Arc<ResponseRegistry>,
        config: IdempotencyConfig,
    ) -> Self {
        Self {
            store,
            registry,
            config,
        }
    }

    /// Returns the interceptor configuration.
    pub fn config(&self) -> &IdempotencyConfig {
        &self.config
    }

    /// Runs `handler` for `method`, deduplicating by `key` when present.
    ///
    /// An absent or blank key runs the handler with no caching.
    pub async fn intercept<T, F, Fut>(
        &self,
        method: &str,
        key: Option<&str>,
        handler: F,
    ) -> Result<T, Status>
    where
        T: CacheableResponse,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, Status>>,
    {
        let Some(key) = key.map(str::trim).filter(|k| !k.is_empty()) else {
            return handler().await;
        };
        let lookup_key = lookup_key(method, key);

        if let Some(replayed) = self.replay::<T>(&lookup_key).await {
            metrics::counter!("idempotency_cache_hits_total").increment(1);
            tracing::debug!(%lookup_key, "replaying cached outcome");
            return replayed;
        }
        metrics::counter!("idempotency_cache_misses_total").increment(1);

        let outcome = handler().await;
        self.remember(&lookup_key, &outcome).await;
        outcome
    }

    /// Looks up a cached outcome. Any fault along the way is a miss.
    #[tracing::instrument(skip(self))]
    async fn replay<T: CacheableResponse>(&self, lookup_key: &str) -> Option<Result<T, Status>> {
        let bytes = match self.store.get(lookup_key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                metrics::counter!("idempotency_cache_errors_total", "op" => "read").increment(1);
                tracing::warn!(error = %e, "cache read failed, treating as miss");
                return None;
            }
        };

        let payload = match CachedPayload::decode(&bytes) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(error = %e, "undecodable cache entry, treating as miss");
                return None;
            }
        };

        match payload {
            CachedPayload::Error(status) => Some(Err(status)),
            CachedPayload::Response { type_url, bytes } => {
                match self.registry.decode::<T>(&type_url, &bytes) {
                    Ok(response) => Some(Ok(response)),
                    Err(e) => {
                        tracing::warn!(error = %e, "cached response not replayable, treating as miss");
                        None
                    }
                }
            }
        }
    }

    /// Stores the outcome of a fresh handler run. Faults are logged only.
    #[tracing::instrument(skip(self, outcome))]
    async fn remember<T: CacheableResponse>(&self, lookup_key: &str, outcome: &Result<T, Status>) {
        let payload = match outcome {
            Ok(response) => match self.registry.encode(response) {
                Ok(payload) => payload,
                Err(e) => {
                    tracing::warn!(error = %e, "response not cacheable, skipping");
                    return;
                }
            },
            Err(status) => CachedPayload::Error(status.clone()),
        };

        let written = match payload.encode() {
            Ok(bytes) => self.store.set(lookup_key, bytes, self.config.ttl).await,
            Err(e) => Err(e),
        };

        if let Err(e) = written {
            metrics::counter!("idempotency_cache_errors_total", "op" => "write").increment(1);
            tracing::error!(error = %e, "failed to cache outcome");
        }
    }
}
