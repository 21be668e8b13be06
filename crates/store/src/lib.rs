//! Relational store adapters.
//!
//! The store owns three tables: registrants (the primary entity), the
//! transactional outbox, and the account links written by the registration
//! saga. Both an in-memory and a PostgreSQL implementation are provided.

pub mod error;
pub mod memory;
pub mod outbox;
pub mod postgres;
pub mod records;
pub mod store;

pub use common::EntityId;
pub use error::{Result, StoreError};
pub use memory::InMemoryStore;
pub use outbox::{Audit, OutboxRecord, OutboxStatus};
pub use postgres::PostgresStore;
pub use records::{AccountLink, RegistrantRecord};
pub use store::{OutboxStore, RegistrantStore};
