//! Relay poller with a start/stop lifecycle.

use common::{Clock, EntityId, SystemClock};
use chrono::{DateTime, Utc};
use saga::{SagaDispatch, SagaError, SagaState, SagaWorkItem};
use store::{OutboxRecord, OutboxStatus, OutboxStore};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{Instrument, Span};

use crate::{RelayConfig, RelayError, Result};

/// What one tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Records this poller took ownership of, READY or expired PROCESSING.
    pub claimed: usize,
    /// The part of `claimed` taken over from a poller whose lease ran out.
    pub reclaimed: usize,
    /// Fetched records this poller could not claim. They keep their status.
    pub skipped: usize,
    pub delivered: usize,
    pub failed: usize,
    /// Claimed records left PROCESSING because their saga is already running.
    pub deferred: usize,
    /// Claimed records whose final status could not be written.
    pub finish_errors: usize,
}

impl TickReport {
    /// Returns true if the tick touched no record.
    pub fn is_idle(&self) -> bool {
        self.claimed == 0 && self.skipped == 0
    }
}

/// How a fetched record is taken over.
#[derive(Debug, Clone, Copy)]
enum Claim {
    /// READY -> PROCESSING.
    Fresh,
    /// PROCESSING -> PROCESSING for a claim last renewed before the cutoff.
    Expired { leased_before: DateTime<Utc> },
}

/// Drains READY outbox records into a saga dispatcher.
///
/// A claimed record carries a lease: if it is still PROCESSING
/// `visibility_timeout` after its last update, the poller that claimed it is
/// presumed dead and any poller may take it over and dispatch it again.
///
/// Every poller owns a span carrying its `poller_id`; all of its log output is
/// recorded inside that span.
pub struct RelayPoller<S, D, C = SystemClock> {
    store: S,
    dispatcher: D,
    clock: C,
    config: RelayConfig,
    poller_id: String,
    span: Span,
}

impl<S, D> RelayPoller<S, D>
where
    S: OutboxStore,
    D: SagaDispatch,
{
    pub fn new(store: S, dispatcher: D, config: RelayConfig) -> Self {
        Self::with_clock(store, dispatcher, SystemClock, config)
    }
}

impl<S, D, C> RelayPoller<S, D, C>
where
    S: OutboxStore,
    D: SagaDispatch,
    C: Clock,
{
    /// Creates a poller that stamps status changes with `clock`.
    pub fn with_clock(store: S, dispatcher: D, clock: C, config: RelayConfig) -> Self {
        let poller_id = format!("poller-{}", uuid::Uuid::new_v4().simple());
        let span = tracing::info_span!("relay_poller", poller_id = %poller_id);
        Self {
            store,
            dispatcher,
            clock,
            config,
            poller_id,
            span,
        }
    }

    pub fn poller_id(&self) -> &str {
        &self.poller_id
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Runs one poll cycle.
    ///
    /// Only a failed fetch is returned as an error. Per-record faults are
    /// logged and counted in the report.
    #[tracing::instrument(parent = &self.span, skip(self))]
    pub async fn tick(&self) -> Result<TickReport> {
        let leased_before = self.lease_cutoff();
        let mut batch: Vec<_> = self
            .store
            .fetch_expired(self.config.batch_size, leased_before)
            .await?
            .into_iter()
            .map(|record| (record, Claim::Expired { leased_before }))
            .collect();
        let room = self.config.batch_size.saturating_sub(batch.len());
        if room > 0 {
            let ready = self.store.fetch_ready(room).await?;
            batch.extend(ready.into_iter().map(|record| (record, Claim::Fresh)));
        }

        let mut report = TickReport::default();
        for (record, claim) in batch {
            self.relay(record, claim, &mut report).await;
        }

        if !report.is_idle() {
            tracing::debug!(?report, "tick finished");
        }
        Ok(report)
    }

    /// Claims older than this have outlived their lease.
    fn lease_cutoff(&self) -> DateTime<Utc> {
        let now = self.clock.now();
        chrono::Duration::from_std(self.config.visibility_timeout)
            .ok()
            .and_then(|lease| now.checked_sub_signed(lease))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    async fn claim(&self, id: EntityId, claim: Claim) -> Result<()> {
        match claim {
            Claim::Fresh => {
                self.move_to(id, OutboxStatus::Ready, OutboxStatus::Processing)
                    .await
            }
            Claim::Expired { leased_before } => {
                self.store
                    .reclaim(id, leased_before, &self.config.actor, self.clock.now())
                    .await?;
                Ok(())
            }
        }
    }

    async fn relay(&self, record: OutboxRecord, claim: Claim, report: &mut TickReport) {
        let record_id = record.id;
        if let Err(e) = self.claim(record_id, claim).await {
            metrics::counter!("relay_claim_skipped_total").increment(1);
            tracing::warn!(
                %record_id,
                status = %record.status,
                error = %e,
                "could not claim outbox record, leaving it as is"
            );
            report.skipped += 1;
            return;
        }
        metrics::counter!("relay_records_claimed_total").increment(1);
        report.claimed += 1;
        if let Claim::Expired { .. } = claim {
            metrics::counter!("relay_records_reclaimed_total").increment(1);
            tracing::warn!(
                %record_id,
                previous_owner = %record.audit.updated_by,
                claimed_at = %record.audit.updated_at,
                "outbox record lease expired, dispatching it again"
            );
            report.reclaimed += 1;
        }

        let outcome = self.dispatch(&record).await;
        let to = match outcome {
            Ok(()) => OutboxStatus::Delivered,
            Err(DispatchFailure::Relay(RelayError::Dispatch(SagaError::AlreadyRunning(
                saga_id,
            )))) => {
                // The running saga belongs to whoever claimed the record before us.
                tracing::info!(
                    %record_id,
                    %saga_id,
                    "saga already running, leaving outbox record PROCESSING"
                );
                report.deferred += 1;
                return;
            }
            Err(e) => {
                tracing::warn!(%record_id, error = %e, "outbox record not delivered");
                OutboxStatus::Failed
            }
        };

        match self.move_to(record_id, OutboxStatus::Processing, to).await {
            Ok(()) if to == OutboxStatus::Delivered => {
                metrics::counter!("relay_records_delivered_total").increment(1);
                report.delivered += 1;
            }
            Ok(()) => {
                metrics::counter!("relay_records_failed_total").increment(1);
                report.failed += 1;
            }
            Err(e) => {
                tracing::error!(%record_id, status = %to, error = %e, "failed to record outbox outcome");
                report.finish_errors += 1;
            }
        }
    }

    /// Hands the record to the dispatcher. Ok only if the saga completed.
    async fn dispatch(&self, record: &OutboxRecord) -> std::result::Result<(), DispatchFailure> {
        let item = SagaWorkItem::from_payload(&record.payload).map_err(RelayError::from)?;
        let saga_id = item.saga_id.clone();
        let saga = self
            .dispatcher
            .dispatch(item)
            .await
            .map_err(RelayError::from)?;

        match saga.state() {
            SagaState::Completed => {
                tracing::info!(record_id = %record.id, %saga_id, "outbox record delivered");
                Ok(())
            }
            state => Err(DispatchFailure::Saga {
                saga_id,
                state,
                reason: saga.failure_reason().unwrap_or("unknown").to_string(),
            }),
        }
    }

    async fn move_to(&self, id: EntityId, from: OutboxStatus, to: OutboxStatus) -> Result<()> {
        self.store
            .transition(id, from, to, &self.config.actor, self.clock.now())
            .await?;
        Ok(())
    }
}

/// Reasons a claimed record ends FAILED.
#[derive(Debug, thiserror::Error)]
enum DispatchFailure {
    #[error(transparent)]
    Relay(#[from] RelayError),

    #[error("saga {saga_id} ended {state}: {reason}")]
    Saga {
        saga_id: String,
        state: SagaState,
        reason: String,
    },
}

impl<S, D, C> RelayPoller<S, D, C>
where
    S: OutboxStore + 'static,
    D: SagaDispatch + 'static,
    C: Clock + 'static,
{
    /// Polls until `shutdown` turns true or its sender is dropped.
    ///
    /// A tick in progress always runs to completion before the loop exits.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let span = self.span.clone();
        async move {
            tracing::info!(
                poll_interval_ms = self.config.poll_interval.as_millis() as u64,
                batch_size = self.config.batch_size,
                "relay poller started"
            );

            let mut ticker = tokio::time::interval(self.config.poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

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

                if let Err(e) = self.tick().await {
                    tracing::error!(error = %e, "relay tick failed");
                }
            }

            tracing::info!("relay poller stopped");
        }
        .instrument(span)
        .await
    }

    /// Spawns the poll loop and returns a handle to stop it.
    pub fn start(self) -> RelayHandle {
        let (shutdown, rx) = watch::channel(false);
        let poller_id = self.poller_id.clone();
        let join = tokio::spawn(self.run(rx));
        RelayHandle {
            poller_id,
            shutdown,
            join,
        }
    }
}

/// Handle to a running poller. Dropping it also stops the poller.
#[derive(Debug)]
pub struct RelayHandle {
    poller_id: String,
    shutdown: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl RelayHandle {
    pub fn poller_id(&self) -> &str {
        &self.poller_id
    }

    /// Signals the poller to stop and waits for it to finish.
    pub async fn stop(self) -> Result<()> {
        // The receiver is gone only if the task already ended.
        let _ = self.shutdown.send(true);
        self.join
            .await
            .map_err(|e| RelayError::Task(e.to_string()))
    }
}
