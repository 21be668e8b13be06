//! Idempotent-response cache for mutating calls.
//!
//! A call carrying a client-supplied idempotency key is executed at most once
//! per TTL window from the caller's point of view: the first outcome (success
//! payload or classified error) is cached and replayed unchanged for every
//! retry with the same method and key.
//!
//! Calls without a key pass straight through. Expired entries are swept by a
//! [`CachePurger`] running beside the service.

pub mod envelope;
pub mod error;
pub mod interceptor;
pub mod memory;
pub mod postgres;
pub mod purger;
pub mod registry;
pub mod store;

pub use envelope::CachedPayload;
pub use error::{CacheError, Result};
pub use interceptor::{
    DEFAULT_TTL, IDEMPOTENCY_KEY_HEADER, IdempotencyConfig, IdempotencyInterceptor, lookup_key,
};
pub use memory::InMemoryCacheStore;
pub use postgres::PostgresCacheStore;
pub use purger::{CachePurger, DEFAULT_PURGE_INTERVAL, PurgeHandle};
pub use registry::{CacheableResponse, ResponseRegistry, ResponseRegistryBuilder};
pub use store::CacheStore;
