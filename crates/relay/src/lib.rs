//! Relay poller for the transactional outbox.
//!
//! A poller repeatedly claims READY outbox records, hands each payload to the
//! saga dispatcher and records the outcome as DELIVERED or FAILED. Several
//! pollers may share one store: a record is claimed by at most one of them.

pub mod config;
pub mod error;
pub mod poller;

pub use config::RelayConfig;
pub use error::{RelayError, Result};
pub use poller::{RelayHandle, RelayPoller, TickReport};
