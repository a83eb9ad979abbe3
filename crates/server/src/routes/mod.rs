pub mod health;
pub mod metrics;
mod patients;
mod summaries;

use axum::{
    Router,
    routing::{get, post},
};

use crate::AppState;

/// Build the /patients and /ai API routes
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/patients", get(patients::list).post(patients::create))
        .route(
            "/patients/{hadm_id}",
            get(patients::read).delete(patients::remove),
        )
        .route("/ai/summarize", post(summaries::summarize))
        .route("/ai/summaries", get(summaries::list_recent))
        .route(
            "/ai/summaries/{id}",
            get(summaries::read).delete(summaries::remove),
        )
        .route(
            "/ai/summaries/patient/{hadm_id}",
            get(summaries::list_by_patient).delete(summaries::remove_by_patient),
        )
}
