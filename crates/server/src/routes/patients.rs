//! Admission record HTTP handlers

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};

use discharge_core::{NewPatient, PatientRecord};

use crate::AppState;
use crate::db::PatientFilter;
use crate::error::AppError;

const PREVIEW_CHARS: usize = 200;
const DEFAULT_LIMIT: i64 = 100;
const MAX_LIMIT: i64 = 1000;

/// Query parameters for the admission listing
#[derive(Debug, Deserialize, Default)]
pub struct ListParams {
    /// Search term matched against diagnosis, admission type and gender.
    pub q: Option<String>,
    pub gender: Option<String>,
    pub admission_type: Option<String>,
    pub age_min: Option<i32>,
    pub age_max: Option<i32>,
    pub limit: Option<i64>,
}

/// Listing entry: the record without its full discharge text.
#[derive(Serialize)]
pub struct PatientListItem {
    pub hadm_id: i64,
    pub subject_id: i64,
    pub gender: String,
    pub age: Option<i32>,
    pub admission_type: String,
    pub diagnosis: String,
    pub hospital_expire_flag: bool,
    pub ed_los_hours: Option<f64>,
    pub total_los_hours: Option<f64>,
    pub text_preview: String,
}

#[derive(Serialize)]
pub struct PatientList {
    pub patients: Vec<PatientListItem>,
    pub total: u64,
    pub shown: usize,
}

#[derive(Serialize)]
pub struct PatientDeleted {
    pub hadm_id: i64,
    pub deleted_summaries: u64,
}

impl From<PatientRecord> for PatientListItem {
    fn from(record: PatientRecord) -> Self {
        let mut text_preview: String = record.text.chars().take(PREVIEW_CHARS).collect();
        if record.text.chars().count() > PREVIEW_CHARS {
            text_preview.push_str("...");
        }
        Self {
            hadm_id: record.hadm_id,
            subject_id: record.subject_id,
            gender: record.gender,
            age: record.age,
            admission_type: record.admission_type,
            diagnosis: record.diagnosis,
            hospital_expire_flag: record.hospital_expire_flag,
            ed_los_hours: record.ed_los_hours,
            total_los_hours: record.total_los_hours,
            text_preview,
        }
    }
}

/// POST /patients - Insert a new admission record
pub async fn create(
    State(state): State<AppState>,
    Json(body): Json<NewPatient>,
) -> Result<impl IntoResponse, AppError> {
    let record = state.patients.create(body).await?;
    tracing::info!(hadm_id = record.hadm_id, "Admission record created");
    Ok((StatusCode::CREATED, Json(record)))
}

/// GET /patients/{hadm_id} - Read one admission record
pub async fn read(
    State(state): State<AppState>,
    Path(hadm_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    match state.patients.get(hadm_id).await? {
        Some(record) => Ok(Json(record)),
        None => Err(AppError::NotFound(format!(
            "Admission {} not found",
            hadm_id
        ))),
    }
}

/// GET /patients - List admissions with optional search and filters
pub async fn list(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<impl IntoResponse, AppError> {
    let filter = PatientFilter {
        q: params.q,
        gender: params.gender,
        admission_type: params.admission_type,
        age_min: params.age_min,
        age_max: params.age_max,
        limit: params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT),
    };

    let (records, total) = state.patients.list(&filter).await?;
    let patients: Vec<PatientListItem> = records.into_iter().map(Into::into).collect();

    Ok(Json(PatientList {
        shown: patients.len(),
        total,
        patients,
    }))
}

/// DELETE /patients/{hadm_id} - Delete an admission and its summaries
pub async fn remove(
    State(state): State<AppState>,
    Path(hadm_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    match state.patients.delete(hadm_id).await? {
        Some(deleted_summaries) => {
            tracing::info!(hadm_id, deleted_summaries, "Admission record deleted");
            Ok(Json(PatientDeleted {
                hadm_id,
                deleted_summaries,
            }))
        }
        None => Err(AppError::NotFound(format!(
            "Admission {} not found",
            hadm_id
        ))),
    }
}
