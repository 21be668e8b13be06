//! External collaborators invoked by saga steps, with in-memory implementations.

pub mod identity;
pub mod persistence;

pub use identity::{IdentityProvider, InMemoryIdentityProvider};
pub use persistence::{InMemoryLocalPersistence, LocalPersistence, StoreLocalPersistence};
