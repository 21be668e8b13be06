//! Application configuration loaded from environment variables.

use std::time::Duration;

use idempotency::{DEFAULT_PURGE_INTERVAL, IdempotencyConfig};
use relay::RelayConfig;
use saga::{RetryPolicy, SagaConfig};

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl LogFormat {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "text" => Some(LogFormat::Text),
            "json" => Some(LogFormat::Json),
            _ => None,
        }
    }
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`, `PORT`: bind address (default: `0.0.0.0:3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `text` or `json` (default: `text`)
/// - `DATABASE_URL`: PostgreSQL connection string; in-memory adapters when unset
/// - `IDEMPOTENCY_TTL_SECS`: cache entry lifetime (default: `3600`)
/// - `IDEMPOTENCY_PURGE_INTERVAL_SECS`: period of the expired-entry sweep (default: `300`)
/// - `RELAY_POLL_INTERVAL_MS`, `RELAY_BATCH_SIZE`: poller cadence (default: `1000`, `1`)
/// - `RELAY_VISIBILITY_TIMEOUT_MS`: lease on a PROCESSING record (default: `300000`),
///   never shorter than `SAGA_TIMEOUT_MS + SAGA_STEP_TIMEOUT_MS`
/// - `SAGA_MAX_ATTEMPTS`, `SAGA_INITIAL_BACKOFF_MS`, `SAGA_STEP_TIMEOUT_MS`,
///   `SAGA_TIMEOUT_MS`: step retry policy and saga budget
/// - `SAGA_JOURNAL_CAPACITY`: finished sagas kept for lookup (default: `1024`)
///
/// Unparseable values fall back to the default.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub idempotency_ttl: Duration,
    pub idempotency_purge_interval: Duration,
    pub relay_poll_interval: Duration,
    pub relay_batch_size: usize,
    pub relay_visibility_timeout: Duration,
    pub saga_max_attempts: u32,
    pub saga_initial_backoff: Duration,
    pub saga_step_timeout: Duration,
    pub saga_timeout: Duration,
    pub saga_journal_capacity: usize,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Loads configuration through `lookup`, falling back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let parse = |name: &str| lookup(name).and_then(|v| v.trim().parse::<u64>().ok());
        let millis = |name: &str, default: Duration| {
            parse(name).map(Duration::from_millis).unwrap_or(default)
        };

        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: lookup("PORT")
                .and_then(|p| p.trim().parse().ok())
                .unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: lookup("LOG_FORMAT")
                .and_then(|f| LogFormat::parse(&f))
                .unwrap_or(defaults.log_format),
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            idempotency_ttl: parse("IDEMPOTENCY_TTL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.idempotency_ttl),
            idempotency_purge_interval: parse("IDEMPOTENCY_PURGE_INTERVAL_SECS")
                .filter(|n| *n > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.idempotency_purge_interval),
            relay_poll_interval: millis("RELAY_POLL_INTERVAL_MS", defaults.relay_poll_interval),
            relay_batch_size: parse("RELAY_BATCH_SIZE")
                .and_then(|n| usize::try_from(n).ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.relay_batch_size),
            relay_visibility_timeout: millis(
                "RELAY_VISIBILITY_TIMEOUT_MS",
                defaults.relay_visibility_timeout,
            ),
            saga_max_attempts: parse("SAGA_MAX_ATTEMPTS")
                .and_then(|n| u32::try_from(n).ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.saga_max_attempts),
            saga_initial_backoff: millis("SAGA_INITIAL_BACKOFF_MS", defaults.saga_initial_backoff),
            saga_step_timeout: millis("SAGA_STEP_TIMEOUT_MS", defaults.saga_step_timeout),
            saga_timeout: millis("SAGA_TIMEOUT_MS", defaults.saga_timeout),
            saga_journal_capacity: parse("SAGA_JOURNAL_CAPACITY")
                .and_then(|n| usize::try_from(n).ok())
                .unwrap_or(defaults.saga_journal_capacity),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn idempotency(&self) -> IdempotencyConfig {
        IdempotencyConfig {
            ttl: self.idempotency_ttl,
        }
    }

    /// The relay lease is stretched to cover a full saga run plus its
    /// compensation, so a live claim is never taken over.
    pub fn relay(&self) -> RelayConfig {
        let longest_saga = self.saga_timeout + self.saga_step_timeout;
        RelayConfig {
            poll_interval: self.relay_poll_interval,
            batch_size: self.relay_batch_size,
            visibility_timeout: self.relay_visibility_timeout.max(longest_saga),
            ..Default::default()
        }
    }

    pub fn saga(&self) -> SagaConfig {
        SagaConfig {
            retry: RetryPolicy {
                max_attempts: self.saga_max_attempts,
                initial_backoff: self.saga_initial_backoff,
                step_timeout: self.saga_step_timeout,
                ..Default::default()
            },
            saga_timeout: self.saga_timeout,
            journal_capacity: self.saga_journal_capacity,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let relay = RelayConfig::default();
        let saga = SagaConfig::default();
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            database_url: None,
            idempotency_ttl: IdempotencyConfig::default().ttl,
            idempotency_purge_interval: DEFAULT_PURGE_INTERVAL,
            relay_poll_interval: relay.poll_interval,
            relay_batch_size: relay.batch_size,
            relay_visibility_timeout: relay.visibility_timeout,
            saga_max_attempts: saga.retry.max_attempts,
            saga_initial_backoff: saga.retry.initial_backoff,
            saga_step_timeout: saga.retry.step_timeout,
            saga_timeout: saga.saga_timeout,
            saga_journal_capacity: saga.journal_capacity,
        }
    }
}
