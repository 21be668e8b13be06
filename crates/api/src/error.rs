//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use common::{Code, Status};
use domain::DomainError;
use store::StoreError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// A classified failure from a lower layer, possibly replayed from cache.
    Status(Status),
    /// Internal server error.
    Internal(String),
}

impl ApiError {
    fn into_status(self) -> Status {
        match self {
            ApiError::NotFound(msg) => Status::not_found(msg),
            ApiError::BadRequest(msg) => Status::invalid_argument(msg),
            ApiError::Status(status) => status,
            ApiError::Internal(msg) => Status::internal(msg),
        }
    }
}

/// Maps a status code onto its HTTP equivalent.
pub fn http_status(code: Code) -> StatusCode {
    match code {
        Code::InvalidArgument => StatusCode::BAD_REQUEST,
        Code::AlreadyExists => StatusCode::CONFLICT,
        Code::NotFound => StatusCode::NOT_FOUND,
        Code::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.into_status();
        let http = http_status(status.code);
        if http.is_server_error() {
            tracing::error!(error = %status, "internal server error");
        }

        let body = serde_json::json!({
            "code": status.code.as_str(),
            "message": status.message,
            "details": status.details,
        });
        (http, axum::Json(body)).into_response()
    }
}

impl From<Status> for ApiError {
    fn from(status: Status) -> Self {
        ApiError::Status(status)
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        ApiError::Status(err.into())
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { .. } => ApiError::NotFound(err.to_string()),
            StoreError::AlreadyExists { .. } => {
                ApiError::Status(Status::already_exists(err.to_string()))
            }
            other => ApiError::Internal(other.to_string()),
        }
    }
}
