use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::request::{CacheKey, GenerationRequest};

/// Outcome of the generation run that produced a summary row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryStatus {
    Completed,
    Failed,
}

impl SummaryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SummaryStatus::Completed => "completed",
            SummaryStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "completed" => Some(SummaryStatus::Completed),
            "failed" => Some(SummaryStatus::Failed),
            _ => None,
        }
    }
}

/// A persisted AI-generated summary of one discharge record.
///
/// Rows are append-only: a regeneration produces a new row rather than
/// mutating the old one, and older completed rows are retained as history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Summary {
    pub id: Uuid,
    pub hadm_id: i64,
    pub cache_key: CacheKey,
    pub status: SummaryStatus,
    /// Generated text; present iff status is `completed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Upstream failure detail; present iff status is `failed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
    pub model: String,
    /// Length of the discharge text before prompt truncation.
    pub original_length: i64,
    /// Wall-clock seconds spent on the model call (including retries).
    pub processing_time: f64,
    pub created_at: DateTime<Utc>,
}

impl Summary {
    /// Build a `completed` row for a finished generation.
    pub fn completed(request: &GenerationRequest, text: String, processing_time: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            hadm_id: request.hadm_id,
            cache_key: request.cache_key(),
            status: SummaryStatus::Completed,
            text: Some(text),
            error_detail: None,
            model: request.model.clone(),
            original_length: request.original_length,
            processing_time,
            created_at: Utc::now(),
        }
    }

    /// Build a `failed` row recording why generation did not produce text.
    pub fn failed(request: &GenerationRequest, error_detail: String, processing_time: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            hadm_id: request.hadm_id,
            cache_key: request.cache_key(),
            status: SummaryStatus::Failed,
            text: None,
            error_detail: Some(error_detail),
            model: request.model.clone(),
            original_length: request.original_length,
            processing_time,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::GenerationParams;

    fn request() -> GenerationRequest {
        GenerationRequest {
            hadm_id: 170490,
            source_text: "Patient presented with chest pain".to_string(),
            original_length: 33,
            model: "m42-health/Llama3-Med42-8B".to_string(),
            params: GenerationParams::default(),
        }
    }

    #[test]
    fn completed_row_carries_text_and_key() {
        let req = request();
        let summary = Summary::completed(&req, "Short stay for chest pain.".to_string(), 1.2);
        assert_eq!(summary.status, SummaryStatus::Completed);
        assert_eq!(summary.hadm_id, req.hadm_id);
        assert_eq!(summary.cache_key, req.cache_key());
        assert!(summary.text.is_some());
        assert!(summary.error_detail.is_none());
    }

    #[test]
    fn failed_row_carries_error_detail() {
        let req = request();
        let summary = Summary::failed(&req, "upstream 503".to_string(), 0.4);
        assert_eq!(summary.status, SummaryStatus::Failed);
        assert!(summary.text.is_none());
        assert_eq!(summary.error_detail.as_deref(), Some("upstream 503"));
    }

    #[test]
    fn status_round_trips_through_strings() {
        assert_eq!(SummaryStatus::parse("completed"), Some(SummaryStatus::Completed));
        assert_eq!(SummaryStatus::parse("failed"), Some(SummaryStatus::Failed));
        assert_eq!(SummaryStatus::parse("pending"), None);
        assert_eq!(SummaryStatus::Completed.as_str(), "completed");
    }
}
