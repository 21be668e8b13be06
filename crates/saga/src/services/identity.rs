//! Identity provider trait and in-memory implementation.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use common::Status;
use domain::Registrant;

use crate::StepError;

/// The external identity system holding user accounts.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Creates an account for the registrant and returns its external id.
    ///
    /// An existing account for the same email is a non-retryable
    /// `AlreadyExists` failure.
    async fn create_account(&self, registrant: &Registrant) -> Result<String, StepError>;

    /// Deletes an account. Deleting an unknown account succeeds.
    async fn delete_account(&self, external_id: &str) -> Result<(), StepError>;
}

/// Scripted behaviour for the next `create_account` call.
#[derive(Debug, Clone)]
enum Scripted {
    Fail(StepError),
    Delay(Duration),
}

#[derive(Debug, Default)]
struct InMemoryIdentityState {
    /// external id -> email
    accounts: HashMap<String, String>,
    next_id: u32,
    script: VecDeque<Scripted>,
    fail_on_delete: bool,
    create_calls: usize,
    delete_calls: usize,
}

/// In-memory identity provider for testing and local runs.
#[derive(Debug, Clone, Default)]
pub struct InMemoryIdentityProvider {
    state: Arc<Mutex<InMemoryIdentityState>>,
}

impl InMemoryIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, InMemoryIdentityState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Makes the next `create_account` call fail with `err`.
    ///
    /// Calls queue up: each scripted failure or delay is used once.
    pub fn fail_next_create(&self, err: StepError) {
        self.state().script.push_back(Scripted::Fail(err));
    }

    /// Makes the next `create_account` call take `delay` before answering.
    pub fn delay_next_create(&self, delay: Duration) {
        self.state().script.push_back(Scripted::Delay(delay));
    }

    /// Makes every `delete_account` call fail with a retryable error.
    pub fn set_fail_on_delete(&self, fail: bool) {
        self.state().fail_on_delete = fail;
    }

    /// Adds an account directly, as if created by an earlier run.
    pub fn seed_account(&self, email: &str) -> String {
        let mut state = self.state();
        state.next_id += 1;
        let external_id = format!("EXT-{:04}", state.next_id);
        state.accounts.insert(external_id.clone(), email.to_string());
        external_id
    }

    pub fn account_count(&self) -> usize {
        self.state().accounts.len()
    }

    pub fn has_account(&self, external_id: &str) -> bool {
        self.state().accounts.contains_key(external_id)
    }

    /// Number of `create_account` calls so far.
    pub fn create_calls(&self) -> usize {
        self.state().create_calls
    }

    /// Number of `delete_account` calls so far.
    pub fn delete_calls(&self) -> usize {
        self.state().delete_calls
    }
}

#[async_trait]
impl IdentityProvider for InMemoryIdentityProvider {
    async fn create_account(&self, registrant: &Registrant) -> Result<String, StepError> {
        let scripted = {
            let mut state = self.state();
            state.create_calls += 1;
            state.script.pop_front()
        };

        match scripted {
            Some(Scripted::Fail(err)) => return Err(err),
            Some(Scripted::Delay(delay)) => tokio::time::sleep(delay).await,
            None => {}
        }

        let email = registrant.email.as_str();
        let mut state = self.state();
        if state.accounts.values().any(|existing| existing == email) {
            return Err(StepError::non_retryable(Status::already_exists(format!(
                "account for {email} already exists"
            ))));
        }

        state.next_id += 1;
        let external_id = format!("EXT-{:04}", state.next_id);
        state
            .accounts
            .insert(external_id.clone(), email.to_string());
        Ok(external_id)
    }

    async fn delete_account(&self, external_id: &str) -> Result<(), StepError> {
        let mut state = self.state();
        state.delete_calls += 1;

        if state.fail_on_delete {
            return Err(StepError::retryable(Status::internal(
                "identity provider unavailable",
            )));
        }

        state.accounts.remove(external_id);
        Ok(())
    }
}
