//! Saga status endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use chrono::{DateTime, Utc};
use saga::{CompensationOutcome, SagaEvent};
use serde::Serialize;

use crate::error::ApiError;
use crate::state::{AppState, AppStore};

#[derive(Serialize)]
pub struct SagaStatusResponse {
    pub saga_id: String,
    pub saga_type: String,
    pub registrant_id: Option<String>,
    pub state: String,
    pub external_id: Option<String>,
    pub compensation: Option<CompensationOutcome>,
    pub failure_reason: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub history: Vec<SagaEvent>,
}

/// GET /sagas/{id}: last known state of a saga, e.g. `registrant-<id>`.
#[tracing::instrument(skip(state))]
pub async fn get<S: AppStore>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<SagaStatusResponse>, ApiError> {
    let saga = state
        .orchestrator
        .get_saga(&id)
        .ok_or_else(|| ApiError::NotFound(format!("Saga {id} not found")))?;

    Ok(Json(SagaStatusResponse {
        saga_id: saga.saga_id().to_string(),
        saga_type: saga.saga_type().to_string(),
        registrant_id: saga.registrant_id().map(|id| id.to_string()),
        state: saga.state().to_string(),
        external_id: saga.external_id().map(String::from),
        compensation: saga.compensation(),
        failure_reason: saga.failure_reason().map(String::from),
        started_at: saga.started_at(),
        finished_at: saga.finished_at(),
        history: saga.history().to_vec(),
    }))
}
