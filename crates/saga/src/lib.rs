//! Saga orchestration for registrant provisioning.
//!
//! A registered person must end up with an account in the external identity
//! system and a local link to that account. The saga runs these steps:
//! 1. Create the external account
//! 2. Persist the local account link
//!
//! Each step is retried on transient failures. If the second step cannot
//! complete, the external account is deleted once as compensation.

pub mod error;
pub mod events;
pub mod instance;
pub mod orchestrator;
pub mod registration;
pub mod retry;
pub mod runner;
pub mod services;
pub mod state;
pub mod work_item;

pub use error::{Result, SagaError, StepError};
pub use events::SagaEvent;
pub use instance::{CompensationOutcome, SagaInstance};
pub use orchestrator::{SagaDispatch, SagaHandle, SagaOrchestrator};
pub use retry::{RetryPolicy, SagaConfig};
pub use runner::{RetryingStepRunner, Step, StepReport, StepRunner};
pub use services::{
    IdentityProvider, InMemoryIdentityProvider, InMemoryLocalPersistence, LocalPersistence,
    StoreLocalPersistence,
};
pub use state::SagaState;
pub use work_item::{SagaWorkItem, saga_id_for};
