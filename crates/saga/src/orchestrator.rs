//! Saga orchestrator for registrant provisioning.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use common::{Clock, SystemClock};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::Instrument;

use crate::events::SagaEvent;
use crate::instance::SagaInstance;
use crate::registration::{
    CreateExternalAccount, DeleteExternalAccount, PersistLocalRecord, SAGA_TYPE,
    STEP_CREATE_EXTERNAL_ACCOUNT, STEP_PERSIST_LOCAL_RECORD,
};
use crate::runner::{RetryingStepRunner, StepRunner};
use crate::services::{IdentityProvider, LocalPersistence};
use crate::{Result, SagaConfig, SagaError, SagaWorkItem, StepError};

/// Accepts work items and reports how their sagas ended.
#[async_trait]
pub trait SagaDispatch: Send + Sync {
    /// Runs the saga for `item` and returns its final instance.
    ///
    /// A saga that ends `Failed` is still `Ok`; errors mean the saga could
    /// not run at all.
    async fn dispatch(&self, item: SagaWorkItem) -> Result<SagaInstance>;
}

struct Inner<I, P, C, R> {
    identity: I,
    persistence: P,
    clock: C,
    runner: R,
    config: SagaConfig,
    in_flight: Mutex<HashSet<String>>,
    journal: RwLock<Journal>,
}

/// Latest instance per saga id.
///
/// Running sagas are always kept. Finished ones are kept up to a capacity,
/// oldest finish evicted first.
#[derive(Default)]
struct Journal {
    sagas: HashMap<String, SagaInstance>,
    finished: VecDeque<String>,
    capacity: usize,
}

impl Journal {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            ..Default::default()
        }
    }

    fn publish(&mut self, saga: &SagaInstance) {
        let saga_id = saga.saga_id();
        self.sagas.insert(saga_id.to_string(), saga.clone());
        if !saga.is_finished() {
            return;
        }

        self.finished.retain(|id| id != saga_id);
        self.finished.push_back(saga_id.to_string());
        while self.finished.len() > self.capacity {
            let Some(oldest) = self.finished.pop_front() else {
                break;
            };
            if self.sagas.get(&oldest).is_some_and(SagaInstance::is_finished) {
                self.sagas.remove(&oldest);
            }
        }
    }
}

/// Drives registrant provisioning sagas.
///
/// The orchestrator runs the fixed step sequence:
/// create external account, then persist the local link. Retrying is left to
/// the step runner. When the second step fails for good the external account
/// is deleted exactly once; a failing delete is logged and the saga still
/// ends `Failed`.
///
/// Each saga runs on its own task. At most one saga per saga id is in flight.
pub struct SagaOrchestrator<I, P, C = SystemClock, R = RetryingStepRunner> {
    inner: Arc<Inner<I, P, C, R>>,
}

impl<I, P, C, R> Clone for SagaOrchestrator<I, P, C, R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<I, P> SagaOrchestrator<I, P>
where
    I: IdentityProvider + 'static,
    P: LocalPersistence + 'static,
{
    /// Creates an orchestrator with the default configuration.
    pub fn new(identity: I, persistence: P) -> Self {
        Self::with_config(identity, persistence, SagaConfig::default())
    }

    /// Creates an orchestrator running steps in-process under `config`.
    pub fn with_config(identity: I, persistence: P, config: SagaConfig) -> Self {
        let runner = RetryingStepRunner::new(config.retry.clone());
        Self::with_parts(identity, persistence, SystemClock, runner, config)
    }
}

impl<I, P, C, R> SagaOrchestrator<I, P, C, R>
where
    I: IdentityProvider + 'static,
    P: LocalPersistence + 'static,
    C: Clock + 'static,
    R: StepRunner + 'static,
{
    /// Creates an orchestrator from explicit parts.
    pub fn with_parts(
        identity: I,
        persistence: P,
        clock: C,
        runner: R,
        config: SagaConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                journal: RwLock::new(Journal::with_capacity(config.journal_capacity)),
                identity,
                persistence,
                clock,
                runner,
                config,
                in_flight: Mutex::new(HashSet::new()),
            }),
        }
    }

    pub fn config(&self) -> &SagaConfig {
        &self.inner.config
    }

    /// Starts the saga for `item` on a new task.
    ///
    /// Fails with `AlreadyRunning` if a saga with the same id is in flight.
    pub fn submit(&self, item: SagaWorkItem) -> Result<SagaHandle> {
        let saga_id = item.saga_id.clone();
        if !self.inner.claim(&saga_id) {
            return Err(SagaError::AlreadyRunning(saga_id));
        }

        let guard = InFlightGuard {
            inner: Arc::clone(&self.inner),
            saga_id: saga_id.clone(),
        };
        let inner = Arc::clone(&self.inner);
        let span = tracing::info_span!("saga", saga_id = %saga_id);
        let join = tokio::spawn(
            async move {
                let _guard = guard;
                inner.run(item).await
            }
            .instrument(span),
        );

        Ok(SagaHandle { saga_id, join })
    }

    /// Runs the saga for `item` and waits for it to finish.
    pub async fn execute(&self, item: SagaWorkItem) -> Result<SagaInstance> {
        self.submit(item)?.wait().await
    }
}

impl<I, P, C, R> SagaOrchestrator<I, P, C, R> {
    /// Returns the latest known instance of a saga.
    pub fn get_saga(&self, saga_id: &str) -> Option<SagaInstance> {
        self.inner
            .journal
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .sagas
            .get(saga_id)
            .cloned()
    }

    /// Returns the number of sagas held in the journal, running ones included.
    pub fn retained(&self) -> usize {
        self.inner
            .journal
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .sagas
            .len()
    }

    /// Returns the number of sagas currently running.
    pub fn in_flight(&self) -> usize {
        self.inner
            .in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }
}

#[async_trait]
impl<I, P, C, R> SagaDispatch for SagaOrchestrator<I, P, C, R>
where
    I: IdentityProvider + 'static,
    P: LocalPersistence + 'static,
    C: Clock + 'static,
    R: StepRunner + 'static,
{
    async fn dispatch(&self, item: SagaWorkItem) -> Result<SagaInstance> {
        self.execute(item).await
    }
}

/// Handle to a submitted saga.
#[derive(Debug)]
pub struct SagaHandle {
    saga_id: String,
    join: JoinHandle<SagaInstance>,
}

impl SagaHandle {
    pub fn saga_id(&self) -> &str {
        &self.saga_id
    }

    /// Waits for the saga to reach a terminal state.
    pub async fn wait(self) -> Result<SagaInstance> {
        let SagaHandle { saga_id, join } = self;
        join.await.map_err(|e| SagaError::Aborted {
            saga_id,
            reason: e.to_string(),
        })
    }
}

/// Releases the single-flight slot when the saga task ends, panics included.
struct InFlightGuard<I, P, C, R> {
    inner: Arc<Inner<I, P, C, R>>,
    saga_id: String,
}

impl<I, P, C, R> Drop for InFlightGuard<I, P, C, R> {
    fn drop(&mut self) {
        self.inner
            .in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.saga_id);
    }
}

impl<I, P, C, R> Inner<I, P, C, R> {
    fn claim(&self, saga_id: &str) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(saga_id.to_string())
    }

    /// Applies an event and publishes the updated instance.
    fn record(&self, saga: &mut SagaInstance, event: SagaEvent) {
        saga.apply(event);
        self.journal
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .publish(saga);
    }

    fn record_failures(&self, saga: &mut SagaInstance, step: &str, failures: &[StepError]) {
        for (attempt, err) in (1u32..).zip(failures) {
            self.record(
                saga,
                SagaEvent::step_attempt_failed(
                    step,
                    attempt,
                    err.is_retryable(),
                    err.status().clone(),
                ),
            );
        }
    }
}

impl<I, P, C, R> Inner<I, P, C, R>
where
    I: IdentityProvider,
    P: LocalPersistence,
    C: Clock,
    R: StepRunner,
{
    async fn run(&self, item: SagaWorkItem) -> SagaInstance {
        metrics::counter!("saga_executions_total").increment(1);
        let started = Instant::now();
        let deadline = started + self.config.saga_timeout;
        let SagaWorkItem {
            saga_id,
            registrant,
        } = item;

        let mut saga = SagaInstance::default();
        self.record(
            &mut saga,
            SagaEvent::saga_started(saga_id, registrant.id, SAGA_TYPE, self.clock.now()),
        );
        tracing::info!(registrant_id = %registrant.id, "saga started");

        let create = CreateExternalAccount {
            provider: &self.identity,
            registrant: &registrant,
        };
        let report = self.runner.run_step(&create, deadline).await;
        self.record_failures(&mut saga, STEP_CREATE_EXTERNAL_ACCOUNT, &report.failures);
        let attempts = report.attempts();
        let external_id = match report.outcome {
            Ok(external_id) => {
                self.record(
                    &mut saga,
                    SagaEvent::step_completed(
                        STEP_CREATE_EXTERNAL_ACCOUNT,
                        attempts,
                        Some(external_id.clone()),
                    ),
                );
                external_id
            }
            // Nothing was created, so there is nothing to undo.
            Err(err) => return self.fail(saga, STEP_CREATE_EXTERNAL_ACCOUNT, &err, started),
        };

        let persist = PersistLocalRecord {
            persistence: &self.persistence,
            registrant: &registrant,
            external_id: &external_id,
        };
        let report = self.runner.run_step(&persist, deadline).await;
        self.record_failures(&mut saga, STEP_PERSIST_LOCAL_RECORD, &report.failures);
        let attempts = report.attempts();
        match report.outcome {
            Ok(()) => {
                self.record(
                    &mut saga,
                    SagaEvent::step_completed(STEP_PERSIST_LOCAL_RECORD, attempts, None),
                );
                self.record(&mut saga, SagaEvent::saga_completed(self.clock.now()));

                let duration = started.elapsed().as_secs_f64();
                metrics::histogram!("saga_duration_seconds").record(duration);
                metrics::counter!("saga_completed_total").increment(1);
                tracing::info!(%external_id, duration, "saga completed");
                saga
            }
            Err(err) => {
                self.compensate(&mut saga, &external_id).await;
                self.fail(saga, STEP_PERSIST_LOCAL_RECORD, &err, started)
            }
        }
    }

    /// Deletes the external account. Attempted once; failures are logged.
    async fn compensate(&self, saga: &mut SagaInstance, external_id: &str) {
        metrics::counter!("saga_compensations_total").increment(1);
        self.record(saga, SagaEvent::compensation_started(external_id));

        let delete = DeleteExternalAccount {
            provider: &self.identity,
            external_id,
        };
        let deadline = Instant::now() + self.config.retry.step_timeout;
        let report = self.runner.run_once(&delete, deadline).await;

        match report.outcome {
            Ok(()) => {
                self.record(saga, SagaEvent::compensation_completed(external_id));
                tracing::info!(external_id, "external account deleted");
            }
            Err(err) => {
                self.record(
                    saga,
                    SagaEvent::compensation_failed(external_id, err.to_string()),
                );
                tracing::error!(
                    external_id,
                    error = %err,
                    "compensation failed, external account may be orphaned"
                );
            }
        }
    }

    fn fail(
        &self,
        mut saga: SagaInstance,
        step: &str,
        err: &StepError,
        started: Instant,
    ) -> SagaInstance {
        let reason = format!("{step} failed: {}", err.status());
        self.record(&mut saga, SagaEvent::saga_failed(&reason, self.clock.now()));

        metrics::histogram!("saga_duration_seconds").record(started.elapsed().as_secs_f64());
        metrics::counter!("saga_failed_total").increment(1);
        tracing::warn!(%reason, "saga failed");
        saga
    }
}
