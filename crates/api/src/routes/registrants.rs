//! Registrant endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use common::{EntityId, Status};
use domain::{NewRegistrant, Registrant};
use idempotency::{CacheableResponse, IDEMPOTENCY_KEY_HEADER};
use serde::{Deserialize, Serialize};

use super::parse_entity_id;
use crate::error::ApiError;
use crate::state::{AppState, AppStore};

/// Method name scoping idempotency keys of registration calls.
pub const REGISTER_METHOD: &str = "registration.Register";

/// Header naming the caller recorded in audit fields.
pub const ACTOR_HEADER: &str = "x-actor";

pub const DEFAULT_ACTOR: &str = "anonymous";

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub id: EntityId,
}

impl CacheableResponse for RegisterResponse {
    const TYPE_URL: &'static str = "registration.v1.RegisterResponse";
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// POST /registrants: register a person.
///
/// With an `x-idempotency-key` header the first outcome is replayed for every
/// retry carrying the same key.
#[tracing::instrument(skip(state, headers, req))]
pub async fn create<S: AppStore>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), ApiError> {
    let key = header(&headers, IDEMPOTENCY_KEY_HEADER);
    let actor = header(&headers, ACTOR_HEADER)
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .unwrap_or(DEFAULT_ACTOR);
    let candidate = NewRegistrant::new(req.name, req.email);
    let registration = &state.registration;

    let response = state
        .idempotency
        .intercept(REGISTER_METHOD, key, || async move {
            let id = registration.register(candidate, actor).await?;
            Ok::<_, Status>(RegisterResponse { id })
        })
        .await
        .inspect_err(|status| {
            metrics::counter!("registration_requests_total", "outcome" => status.code.as_str())
                .increment(1);
        })?;

    metrics::counter!("registration_requests_total", "outcome" => "OK").increment(1);
    Ok((StatusCode::CREATED, Json(response)))
}

/// GET /registrants/{id}
#[tracing::instrument(skip(state))]
pub async fn get<S: AppStore>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<Registrant>, ApiError> {
    let id = parse_entity_id(&id)?;
    let registrant = state
        .registration
        .get_registrant(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Registrant {id} not found")))?;
    Ok(Json(registrant))
}

/// DELETE /registrants/{id}: administrative removal of the local row.
#[tracing::instrument(skip(state))]
pub async fn delete<S: AppStore>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_entity_id(&id)?;
    state.registration.delete_registrant(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
