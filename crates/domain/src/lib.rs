//! Domain layer for the registration services.
//!
//! This crate provides:
//! - The `Registrant` entity and the validation/sanitization of candidates
//! - `RegistrationService`, which writes a registrant and its outbox intent
//!   in one local transaction

pub mod error;
pub mod registrant;

pub use error::DomainError;
pub use registrant::{
    EmailAddress, NewRegistrant, Registrant, RegistrantName, RegistrationService,
    ValidatedRegistrant,
};
