//! Registrant provisioning saga definition.

use async_trait::async_trait;
use domain::Registrant;

use crate::StepError;
use crate::runner::Step;
use crate::services::{IdentityProvider, LocalPersistence};

pub const SAGA_TYPE: &str = "RegistrantProvisioning";
pub const STEP_CREATE_EXTERNAL_ACCOUNT: &str = "create_external_account";
pub const STEP_PERSIST_LOCAL_RECORD: &str = "persist_local_record";
pub const STEP_DELETE_EXTERNAL_ACCOUNT: &str = "delete_external_account";

/// Step 1: create the account in the identity system.
pub struct CreateExternalAccount<'a, I> {
    pub provider: &'a I,
    pub registrant: &'a Registrant,
}

#[async_trait]
impl<'a, I: IdentityProvider> Step for CreateExternalAccount<'a, I> {
    type Output = String;

    fn name(&self) -> &'static str {
        STEP_CREATE_EXTERNAL_ACCOUNT
    }

    async fn execute(&self) -> Result<String, StepError> {
        self.provider.create_account(self.registrant).await
    }
}

/// Step 2: link the registrant to the new account locally.
pub struct PersistLocalRecord<'a, P> {
    pub persistence: &'a P,
    pub registrant: &'a Registrant,
    pub external_id: &'a str,
}

#[async_trait]
impl<'a, P: LocalPersistence> Step for PersistLocalRecord<'a, P> {
    type Output = ();

    fn name(&self) -> &'static str {
        STEP_PERSIST_LOCAL_RECORD
    }

    async fn execute(&self) -> Result<(), StepError> {
        self.persistence
            .persist(self.registrant, self.external_id)
            .await
    }
}

/// Compensation for step 1: remove the account created in the identity system.
pub struct DeleteExternalAccount<'a, I> {
    pub provider: &'a I,
    pub external_id: &'a str,
}

#[async_trait]
impl<'a, I: IdentityProvider> Step for DeleteExternalAccount<'a, I> {
    type Output = ();

    fn name(&self) -> &'static str {
        STEP_DELETE_EXTERNAL_ACCOUNT
    }

    async fn execute(&self) -> Result<(), StepError> {
        self.provider.delete_account(self.external_id).await
    }
}
