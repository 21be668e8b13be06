//! The registrant entity and its unvalidated candidate.

use common::{EntityId, FieldViolation};
use serde::{Deserialize, Serialize};
use store::{Audit, RegistrantRecord};

use super::{EmailAddress, RegistrantName};
use crate::error::DomainError;

/// A registration request as received from a caller.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewRegistrant {
    pub name: String,
    pub email: String,
}

impl NewRegistrant {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }

    /// Sanitizes and validates every field, collecting all violations.
    pub fn validate(&self) -> Result<ValidatedRegistrant, DomainError> {
        let name = RegistrantName::parse(&self.name);
        let email = EmailAddress::parse(&self.email);

        match (name, email) {
            (Ok(name), Ok(email)) => Ok(ValidatedRegistrant { name, email }),
            (name, email) => {
                let violations: Vec<FieldViolation> =
                    [name.err(), email.err()].into_iter().flatten().collect();
                Err(DomainError::Validation(violations))
            }
        }
    }
}

/// A candidate that passed validation but has no identity yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedRegistrant {
    pub name: RegistrantName,
    pub email: EmailAddress,
}

/// A registered person.
///
/// This is also the payload carried by the outbox record and the saga work
/// item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Registrant {
    pub id: EntityId,
    pub name: RegistrantName,
    pub email: EmailAddress,
    pub audit: Audit,
}

impl Registrant {
    /// Assigns an identity and audit fields to a validated candidate.
    pub fn from_validated(candidate: ValidatedRegistrant, audit: Audit) -> Self {
        Self {
            id: EntityId::new(),
            name: candidate.name,
            email: candidate.email,
            audit,
        }
    }
}

impl From<&Registrant> for RegistrantRecord {
    fn from(r: &Registrant) -> Self {
        RegistrantRecord {
            id: r.id,
            name: r.name.as_str().to_string(),
            email: r.email.as_str().to_string(),
            audit: r.audit.clone(),
        }
    }
}

impl TryFrom<RegistrantRecord> for Registrant {
    type Error = DomainError;

    fn try_from(record: RegistrantRecord) -> Result<Self, Self::Error> {
        let name = RegistrantName::parse(&record.name);
        let email = EmailAddress::parse(&record.email);
        match (name, email) {
            (Ok(name), Ok(email)) => Ok(Registrant {
                id: record.id,
                name,
                email,
                audit: record.audit,
            }),
            (name, email) => Err(DomainError::Validation(
                [name.err(), email.err()].into_iter().flatten().collect(),
            )),
        }
    }
}
