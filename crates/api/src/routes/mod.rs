pub mod health;
pub mod metrics;
pub mod outbox;
pub mod registrants;
pub mod sagas;

use common::EntityId;

use crate::error::ApiError;

fn parse_entity_id(id: &str) -> Result<EntityId, ApiError> {
    EntityId::parse(id).map_err(|e| ApiError::BadRequest(format!("Invalid ID format: {e}")))
}
