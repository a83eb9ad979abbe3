//! Application error handling

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use discharge_core::{GenerationError, StoreError};

/// Application error type
#[derive(Debug)]
pub enum AppError {
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    /// The inference endpoint is unreachable or exhausted its retries.
    UpstreamUnavailable(String),
    /// The coordinator wait bound elapsed; retrying is safe.
    GenerationTimeout(String),
    /// A required capability (e.g. inference credentials) is not configured.
    ServiceUnavailable(String),
    Internal(String),
}

/// JSON body returned for every error response.
#[derive(Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub detail: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, detail) = match self {
            AppError::NotFound(detail) => (StatusCode::NOT_FOUND, "not_found", detail),
            AppError::BadRequest(detail) => (StatusCode::BAD_REQUEST, "bad_request", detail),
            AppError::Conflict(detail) => (StatusCode::CONFLICT, "conflict", detail),
            AppError::UpstreamUnavailable(detail) => {
                (StatusCode::BAD_GATEWAY, "upstream_unavailable", detail)
            }
            AppError::GenerationTimeout(detail) => {
                (StatusCode::GATEWAY_TIMEOUT, "generation_timeout", detail)
            }
            AppError::ServiceUnavailable(detail) => {
                (StatusCode::SERVICE_UNAVAILABLE, "service_unavailable", detail)
            }
            AppError::Internal(detail) => (StatusCode::INTERNAL_SERVER_ERROR, "internal", detail),
        };

        (status, Json(ErrorBody { error, detail })).into_response()
    }
}

impl From<deadpool_postgres::PoolError> for AppError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        AppError::Internal(format!("Database pool error: {}", err))
    }
}

impl From<tokio_postgres::Error> for AppError {
    fn from(err: tokio_postgres::Error) -> Self {
        AppError::Internal(format!("Database error: {}", err))
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate(detail) => AppError::Conflict(detail),
            StoreError::Database(detail) => AppError::Internal(detail),
        }
    }
}

impl From<GenerationError> for AppError {
    fn from(err: GenerationError) -> Self {
        match err {
            GenerationError::InvalidInput(detail) => AppError::BadRequest(detail),
            GenerationError::Inference { .. } => AppError::UpstreamUnavailable(err.to_string()),
            GenerationError::Timeout => AppError::GenerationTimeout(err.to_string()),
            GenerationError::Store(detail) => AppError::Internal(detail),
        }
    }
}
