use std::time::Duration;

/// Relay poller configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Period between the start of consecutive ticks.
    pub poll_interval: Duration,
    /// READY records claimed per tick.
    pub batch_size: usize,
    /// Recorded as `updated_by` on every status change.
    pub actor: String,
    /// How long a PROCESSING claim is honored before another poller may take
    /// the record over. Must exceed the longest saga run.
    pub visibility_timeout: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            batch_size: 1,
            actor: "relay-poller".to_string(),
            visibility_timeout: Duration::from_secs(300),
        }
    }
}
