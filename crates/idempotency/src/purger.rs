//! Background sweep deleting expired cache entries.
//!
//! Expired entries already read as misses; the sweep only bounds how long
//! they keep occupying the store.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::Instrument;

use crate::{CacheError, Result, store::CacheStore};

/// Default period between sweeps (5 minutes).
pub const DEFAULT_PURGE_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Periodically calls [`CacheStore::purge_expired`].
pub struct CachePurger {
    store: Arc<dyn CacheStore>,
    interval: Duration,
}

impl CachePurger {
    pub fn new(store: Arc<dyn CacheStore>, interval: Duration) -> Self {
        Self { store, interval }
    }

    /// Runs one sweep. Returns the number of entries removed.
    pub async fn purge_once(&self) -> Result<u64> {
        let removed = self.store.purge_expired().await?;
        metrics::counter!("idempotency_cache_purged_total").increment(removed);
        if removed > 0 {
            tracing::debug!(removed, "purged expired cache entries");
        }
        Ok(removed)
    }

    /// Sweeps until `shutdown` turns true or its sender is dropped.
    ///
    /// The first sweep runs immediately. A failed sweep is logged and the
    /// next one runs on schedule.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            "cache purger started"
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        while !*shutdown.borrow() {
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                _ = ticker.tick() => {}
            }

            if let Err(e) = self.purge_once().await {
                metrics::counter!("idempotency_cache_purge_errors_total").increment(1);
                tracing::warn!(error = %e, "cache purge failed");
            }
        }

        tracing::info!("cache purger stopped");
    }

    /// Spawns the sweep loop and returns a handle to stop it.
    pub fn start(self) -> PurgeHandle {
        let (shutdown, rx) = watch::channel(false);
        let span = tracing::info_span!("cache_purger");
        let join = tokio::spawn(self.run(rx).instrument(span));
        PurgeHandle { shutdown, join }
    }
}

/// Handle to a running purger.
#[derive(Debug)]
pub struct PurgeHandle {
    shutdown: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl PurgeHandle {
    /// Signals the purger to stop and waits for it to finish.
    pub async fn stop(self) -> Result<()> {
        let _ = self.shutdown.send(true);
        self.join
            .await
            .map_err(|e| CacheError::Task(e.to_string()))
    }
}
