//! Summary generation and retrieval HTTP handlers

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::AppState;
use crate::ai::ParamOverrides;
use crate::error::AppError;

const DEFAULT_PAGE_SIZE: u32 = 20;
const MAX_PAGE_SIZE: u32 = 100;

/// Request body for POST /ai/summarize
#[derive(Debug, Deserialize)]
pub struct SummarizeRequest {
    pub hadm_id: i64,
    /// Bypass the cache and generate a fresh summary. Concurrent refreshes
    /// for the same admission still share one model call.
    #[serde(default)]
    pub force_refresh: bool,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub temperature: Option<f32>,
}

/// Pagination query parameters
#[derive(Debug, Deserialize, Default)]
pub struct PageParams {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

impl PageParams {
    fn resolve(&self) -> (u32, u32) {
        (
            self.page.unwrap_or(1).max(1),
            self.page_size
                .unwrap_or(DEFAULT_PAGE_SIZE)
                .clamp(1, MAX_PAGE_SIZE),
        )
    }
}

#[derive(Serialize)]
pub struct DeletedCount {
    pub deleted_count: u64,
}

/// POST /ai/summarize - Return a cached summary or generate a fresh one
pub async fn summarize(
    State(state): State<AppState>,
    Json(body): Json<SummarizeRequest>,
) -> Result<impl IntoResponse, AppError> {
    let coordinator = state.coordinator.as_ref().ok_or_else(|| {
        AppError::ServiceUnavailable("summarization is not configured (HF_TOKEN unset)".to_string())
    })?;

    let patient = state
        .patients
        .get(body.hadm_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Admission {} not found", body.hadm_id)))?;

    let overrides = ParamOverrides {
        max_tokens: body.max_tokens,
        temperature: body.temperature,
    };
    let request = state.prompt.build(&patient, Some(overrides))?;

    tracing::info!(
        hadm_id = body.hadm_id,
        force_refresh = body.force_refresh,
        "Summarize request"
    );

    let summary = coordinator
        .get_or_create(request, body.force_refresh)
        .await?;
    Ok(Json(summary))
}

/// GET /ai/summaries - Recent summaries, newest first
pub async fn list_recent(
    State(state): State<AppState>,
    Query(params): Query<PageParams>,
) -> Result<impl IntoResponse, AppError> {
    let (page, page_size) = params.resolve();
    let summaries = state.summaries.list_recent(page, page_size).await?;
    Ok(Json(summaries))
}

/// GET /ai/summaries/{id} - Read one summary
pub async fn read(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    match state.summaries.get(id).await? {
        Some(summary) => Ok(Json(summary)),
        None => Err(AppError::NotFound(format!("Summary {} not found", id))),
    }
}

/// GET /ai/summaries/patient/{hadm_id} - Summaries for one admission
pub async fn list_by_patient(
    State(state): State<AppState>,
    Path(hadm_id): Path<i64>,
    Query(params): Query<PageParams>,
) -> Result<impl IntoResponse, AppError> {
    let (page, page_size) = params.resolve();
    let summaries = state
        .summaries
        .list_by_patient(hadm_id, page, page_size)
        .await?;
    Ok(Json(summaries))
}

/// DELETE /ai/summaries/{id} - Delete one summary
pub async fn remove(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    if state.summaries.delete(id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!("Summary {} not found", id)))
    }
}

/// DELETE /ai/summaries/patient/{hadm_id} - Delete all summaries for an
/// admission; responds with the removed count, which may be zero.
pub async fn remove_by_patient(
    State(state): State<AppState>,
    Path(hadm_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let deleted_count = state.summaries.delete_by_patient(hadm_id).await?;
    tracing::info!(hadm_id, deleted_count, "Deleted summaries for admission");
    Ok(Json(DeletedCount { deleted_count }))
}
