//! Shared types used across the registration workspace.

pub mod clock;
pub mod status;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use status::{Code, FieldViolation, Status};
pub use types::EntityId;
