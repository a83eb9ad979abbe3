use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A hospital admission record with its discharge summary text.
///
/// Field set follows the MIMIC-III discharge summary extract the service
/// was built around. `text` is the full discharge note and is the source
/// for AI summarization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientRecord {
    pub hadm_id: i64,
    pub subject_id: i64,
    pub gender: String,
    pub age: Option<i32>,
    pub admission_type: String,
    pub diagnosis: String,
    pub hospital_expire_flag: bool,
    pub ed_los_hours: Option<f64>,
    pub total_los_hours: Option<f64>,
    pub charttime: Option<DateTime<Utc>>,
    pub category: String,
    pub description: String,
    pub text: String,
}

/// Payload for inserting a new admission record.
#[derive(Debug, Clone, Deserialize)]
pub struct NewPatient {
    pub hadm_id: i64,
    pub subject_id: i64,
    pub gender: String,
    #[serde(default)]
    pub age: Option<i32>,
    pub admission_type: String,
    pub diagnosis: String,
    #[serde(default)]
    pub hospital_expire_flag: bool,
    #[serde(default)]
    pub ed_los_hours: Option<f64>,
    #[serde(default)]
    pub total_los_hours: Option<f64>,
    #[serde(default)]
    pub charttime: Option<DateTime<Utc>>,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default = "default_category")]
    pub description: String,
    pub text: String,
}

fn default_category() -> String {
    "Discharge summary".to_string()
}
