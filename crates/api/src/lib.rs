//! HTTP API server for the registration service.
//!
//! Provides REST endpoints for registrants, outbox records and sagas, with
//! structured logging (tracing) and Prometheus metrics. The same wiring builds
//! the relay poller that drains the outbox into the orchestrator and the
//! sweep that purges expired idempotency entries.

pub mod config;
pub mod error;
pub mod routes;
pub mod state;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use common::SystemClock;
use domain::RegistrationService;
use idempotency::{CachePurger, CacheStore, IdempotencyInterceptor, ResponseRegistry};
use metrics_exporter_prometheus::PrometheusHandle;
use relay::RelayPoller;
use saga::{InMemoryIdentityProvider, SagaOrchestrator, StoreLocalPersistence};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use routes::registrants::RegisterResponse;
pub use state::{AppState, AppStore, Orchestrator};

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: AppStore>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check::<S>))
        .route("/registrants", post(routes::registrants::create::<S>))
        .route(
            "/registrants/{id}",
            get(routes::registrants::get::<S>).delete(routes::registrants::delete::<S>),
        )
        .route("/outbox/{id}", get(routes::outbox::get::<S>))
        .route("/sagas/{id}", get(routes::sagas::get::<S>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// The response types whose outcomes may be cached and replayed.
pub fn response_registry() -> ResponseRegistry {
    ResponseRegistry::builder()
        .register::<RegisterResponse>()
        .build()
}

/// Creates the application state over `store` and `cache`.
pub fn create_default_state<S: AppStore>(
    store: S,
    cache: Arc<dyn CacheStore>,
    config: &Config,
) -> Arc<AppState<S>> {
    let identity = InMemoryIdentityProvider::new();
    let orchestrator = SagaOrchestrator::with_config(
        identity.clone(),
        StoreLocalPersistence::new(store.clone()),
        config.saga(),
    );
    let idempotency = IdempotencyInterceptor::with_config(
        cache,
        Arc::new(response_registry()),
        config.idempotency(),
    );

    Arc::new(AppState {
        registration: RegistrationService::new(store.clone(), SystemClock),
        idempotency,
        orchestrator,
        identity,
        store,
    })
}

/// Creates a relay poller feeding the state's orchestrator.
pub fn create_relay<S: AppStore>(
    state: &AppState<S>,
    config: &Config,
) -> RelayPoller<S, Orchestrator<S>> {
    RelayPoller::new(
        state.store.clone(),
        state.orchestrator.clone(),
        config.relay(),
    )
}

/// Creates the sweep that deletes expired entries from `cache`.
pub fn create_cache_purger(cache: Arc<dyn CacheStore>, config: &Config) -> CachePurger {
    CachePurger::new(cache, config.idempotency_purge_interval)
}
