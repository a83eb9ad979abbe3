//! Health check endpoints

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;

use crate::AppState;

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
}

/// AI readiness response
#[derive(Serialize)]
pub struct AiHealthResponse {
    status: &'static str,
    model: String,
}

/// GET /health - Check database connectivity and return server health status
pub async fn check(State(state): State<AppState>) -> impl IntoResponse {
    match state.pool.get().await {
        Ok(client) => match client.query_one("SELECT 1", &[]).await {
            Ok(_) => (
                StatusCode::OK,
                Json(HealthResponse {
                    status: "healthy".to_string(),
                    reason: None,
                }),
            ),
            Err(e) => {
                tracing::error!(error = %e, "Health check query failed");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    Json(HealthResponse {
                        status: "unhealthy".to_string(),
                        reason: Some(format!("Database query failed: {}", e)),
                    }),
                )
            }
        },
        Err(e) => {
            tracing::error!(error = %e, "Health check pool error");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "unhealthy".to_string(),
                    reason: Some(format!("Database connection failed: {}", e)),
                }),
            )
        }
    }
}

/// GET /health/ai - Report whether summarization is configured
pub async fn ai_status(State(state): State<AppState>) -> impl IntoResponse {
    let status = if state.coordinator.is_some() {
        "ready"
    } else {
        "unconfigured"
    };
    Json(AiHealthResponse {
        status,
        model: state.model.clone(),
    })
}
