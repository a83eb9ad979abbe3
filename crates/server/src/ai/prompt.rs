//! Deterministic generation request construction

use serde::Deserialize;

use discharge_core::{GenerationError, GenerationParams, GenerationRequest, PatientRecord};

use crate::config::Config;

/// Caller-supplied overrides for generation parameters.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct ParamOverrides {
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

/// Builds generation requests from discharge records.
///
/// Pure and deterministic: the same record and overrides always produce the
/// same request, and therefore the same cache key. This determinism is what
/// makes caching correct.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    model: String,
    defaults: GenerationParams,
    max_input_chars: usize,
}

impl PromptBuilder {
    pub fn new(config: &Config) -> Self {
        Self {
            model: config.model.clone(),
            defaults: GenerationParams {
                max_tokens: config.default_max_tokens,
                temperature: config.default_temperature,
            },
            max_input_chars: config.max_input_chars,
        }
    }

    /// Derive a generation request from an admission record.
    ///
    /// Fails with `InvalidInput` if the record has no discharge text. The
    /// prompt input is the trimmed text truncated to the configured limit;
    /// the untruncated length is kept for reporting.
    pub fn build(
        &self,
        patient: &PatientRecord,
        overrides: Option<ParamOverrides>,
    ) -> Result<GenerationRequest, GenerationError> {
        let text = patient.text.trim();
        if text.is_empty() {
            return Err(GenerationError::InvalidInput(format!(
                "admission {} has no discharge text to summarize",
                patient.hadm_id
            )));
        }

        let overrides = overrides.unwrap_or_default();
        let params = GenerationParams {
            max_tokens: overrides.max_tokens.unwrap_or(self.defaults.max_tokens),
            temperature: overrides.temperature.unwrap_or(self.defaults.temperature),
        };

        Ok(GenerationRequest {
            hadm_id: patient.hadm_id,
            source_text: truncate_chars(text, self.max_input_chars),
            original_length: patient.text.chars().count() as i64,
            model: self.model.clone(),
            params,
        })
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn test_config() -> Config {
        Config {
            database_url: String::new(),
            bind_address: String::new(),
            cors_origins: vec!["*".to_string()],
            rate_limit_rps: 50,
            hf_token: None,
            model: "m42-health/Llama3-Med42-8B".to_string(),
            inference_url: String::new(),
            inference_timeout: Duration::from_secs(30),
            max_retries: 3,
            backoff_base: Duration::from_millis(500),
            coordinator_wait: Duration::from_secs(120),
            max_input_chars: 4000,
            default_max_tokens: 400,
            default_temperature: 0.5,
        }
    }

    fn patient(text: &str) -> PatientRecord {
        PatientRecord {
            hadm_id: 170490,
            subject_id: 12345,
            gender: "M".to_string(),
            age: Some(65),
            admission_type: "EMERGENCY".to_string(),
            diagnosis: "Chest pain".to_string(),
            hospital_expire_flag: false,
            ed_los_hours: Some(4.5),
            total_los_hours: Some(72.0),
            charttime: None,
            category: "Discharge summary".to_string(),
            description: "Discharge summary".to_string(),
            text: text.to_string(),
        }
    }

    #[test]
    fn empty_text_is_rejected() {
        let builder = PromptBuilder::new(&test_config());
        assert!(matches!(
            builder.build(&patient(""), None),
            Err(GenerationError::InvalidInput(_))
        ));
        assert!(matches!(
            builder.build(&patient("   \n  "), None),
            Err(GenerationError::InvalidInput(_))
        ));
    }

    #[test]
    fn same_inputs_same_request_and_key() {
        let builder = PromptBuilder::new(&test_config());
        let record = patient("Patient presented with chest pain, discharged stable.");

        let a = builder.build(&record, None).unwrap();
        let b = builder.build(&record, None).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.cache_key(), b.cache_key());
    }

    #[test]
    fn overrides_change_the_key() {
        let builder = PromptBuilder::new(&test_config());
        let record = patient("Patient presented with chest pain.");

        let default = builder.build(&record, None).unwrap();
        let tweaked = builder
            .build(
                &record,
                Some(ParamOverrides {
                    max_tokens: Some(800),
                    temperature: None,
                }),
            )
            .unwrap();

        assert_eq!(tweaked.params.max_tokens, 800);
        assert_ne!(default.cache_key(), tweaked.cache_key());
    }

    #[test]
    fn long_text_is_truncated_but_length_preserved() {
        let mut config = test_config();
        config.max_input_chars = 10;
        let builder = PromptBuilder::new(&config);

        let record = patient("0123456789abcdef");
        let request = builder.build(&record, None).unwrap();

        assert_eq!(request.source_text, "0123456789");
        assert_eq!(request.original_length, 16);
    }
}
