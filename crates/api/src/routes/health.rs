//! Health check endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use crate::state::{AppState, AppStore};

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    /// Sagas currently executing in this process.
    pub sagas_in_flight: usize,
}

/// GET /health
pub async fn check<S: AppStore>(State(state): State<Arc<AppState<S>>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        sagas_in_flight: state.orchestrator.in_flight(),
    })
}
