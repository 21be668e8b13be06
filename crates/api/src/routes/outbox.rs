//! Outbox inspection endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use store::OutboxRecord;

use super::parse_entity_id;
use crate::error::ApiError;
use crate::state::{AppState, AppStore};

/// GET /outbox/{id}: current status and payload of an outbox record.
#[tracing::instrument(skip(state))]
pub async fn get<S: AppStore>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<OutboxRecord>, ApiError> {
    let id = parse_entity_id(&id)?;
    let record = state
        .store
        .get_outbox_record(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Outbox record {id} not found")))?;
    Ok(Json(record))
}
