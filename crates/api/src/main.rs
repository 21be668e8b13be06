//! API server entry point.

use std::sync::Arc;

use api::config::{Config, LogFormat};
use api::{AppStore, create_app, create_cache_purger, create_default_state, create_relay};
use idempotency::{CacheStore, InMemoryCacheStore, PostgresCacheStore};
use metrics_exporter_prometheus::PrometheusHandle;
use sqlx::postgres::PgPoolOptions;
use store::{InMemoryStore, PostgresStore};
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match config.log_format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(true))
            .init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

/// Serves HTTP and runs the background tasks until a shutdown signal arrives.
async fn serve<S: AppStore>(
    config: Config,
    store: S,
    cache: Arc<dyn CacheStore>,
    metrics_handle: PrometheusHandle,
) {
    let purger = create_cache_purger(cache.clone(), &config).start();
    let state = create_default_state(store, cache, &config);
    let relay = create_relay(&state, &config).start();
    tracing::info!(poller_id = relay.poller_id(), "relay poller running");

    let app = create_app(state, metrics_handle);

    let addr = config.addr();
    tracing::info!(%addr, "starting API server");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    if let Err(e) = relay.stop().await {
        tracing::error!(error = %e, "relay poller did not stop cleanly");
    }
    if let Err(e) = purger.stop().await {
        tracing::error!(error = %e, "cache purger did not stop cleanly");
    }
}

#[tokio::main]
async fn main() {
    // 1. Load configuration and initialize tracing
    let config = Config::from_env();
    init_tracing(&config);

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Build adapters and serve
    match config.database_url.clone() {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .connect(&url)
                .await
                .expect("failed to connect to PostgreSQL");
            let store = PostgresStore::new(pool.clone());
            store
                .run_migrations()
                .await
                .expect("failed to run migrations");
            tracing::info!("using PostgreSQL adapters");
            let cache: Arc<dyn CacheStore> = Arc::new(PostgresCacheStore::new(pool));
            serve(config, store, cache, metrics_handle).await;
        }
        None => {
            tracing::info!("DATABASE_URL not set, using in-memory adapters");
            let cache: Arc<dyn CacheStore> = Arc::new(InMemoryCacheStore::new());
            serve(config, InMemoryStore::new(), cache, metrics_handle).await;
        }
    }

    tracing::info!("server shut down gracefully");
}
