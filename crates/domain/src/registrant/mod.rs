//! Registrant entity, value objects and the registration service.

mod entity;
mod service;
mod value_objects;

pub use entity::{NewRegistrant, Registrant, ValidatedRegistrant};
pub use service::RegistrationService;
pub use value_objects::{EmailAddress, RegistrantName};
