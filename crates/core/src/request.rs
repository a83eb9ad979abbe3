use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Parameters for a model call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            max_tokens: 400,
            temperature: 0.5,
        }
    }
}

/// Immutable description of one summary generation.
///
/// Built once by the prompt builder; everything the inference client needs
/// is in here, and the cache key is derived from it deterministically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Hospital admission id of the discharge record being summarized.
    pub hadm_id: i64,
    /// Prompt input text (already truncated to the configured maximum).
    pub source_text: String,
    /// Length of the full discharge text before truncation, kept for
    /// reporting alongside the stored summary.
    pub original_length: i64,
    pub model: String,
    pub params: GenerationParams,
}

impl GenerationRequest {
    /// Derive the deterministic cache key for this request.
    ///
    /// The key covers admission id, model, normalized source text and
    /// normalized parameters. Temperature is rendered with fixed precision
    /// so float formatting can never split equal requests across keys.
    pub fn cache_key(&self) -> CacheKey {
        let mut hasher = Sha256::new();
        hasher.update(self.hadm_id.to_le_bytes());
        hasher.update([0u8]);
        hasher.update(self.model.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.source_text.trim().as_bytes());
        hasher.update([0u8]);
        hasher.update(self.params.max_tokens.to_le_bytes());
        hasher.update([0u8]);
        hasher.update(format!("{:.4}", self.params.temperature).as_bytes());
        CacheKey(format!("{:x}", hasher.finalize()))
    }
}

/// Deterministic fingerprint of a generation request, used for
/// de-duplication and cache lookup. Lowercase hex SHA-256.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for CacheKey {
    fn from(value: String) -> Self {
        CacheKey(value)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(hadm_id: i64, text: &str, model: &str, params: GenerationParams) -> GenerationRequest {
        GenerationRequest {
            hadm_id,
            source_text: text.to_string(),
            original_length: text.len() as i64,
            model: model.to_string(),
            params,
        }
    }

    #[test]
    fn identical_requests_share_a_key() {
        let a = request(170490, "chest pain, discharged stable", "med42", GenerationParams::default());
        let b = request(170490, "chest pain, discharged stable", "med42", GenerationParams::default());
        assert_eq!(a.cache_key(), b.cache_key());
    }

    #[test]
    fn surrounding_whitespace_is_normalized() {
        let a = request(1, "note text", "med42", GenerationParams::default());
        let b = request(1, "  note text \n", "med42", GenerationParams::default());
        assert_eq!(a.cache_key(), b.cache_key());
    }

    #[test]
    fn different_inputs_yield_different_keys() {
        let base = request(1, "note", "med42", GenerationParams::default());

        let other_patient = request(2, "note", "med42", GenerationParams::default());
        assert_ne!(base.cache_key(), other_patient.cache_key());

        let other_model = request(1, "note", "med42-v2", GenerationParams::default());
        assert_ne!(base.cache_key(), other_model.cache_key());

        let other_text = request(1, "different note", "med42", GenerationParams::default());
        assert_ne!(base.cache_key(), other_text.cache_key());

        let other_params = request(
            1,
            "note",
            "med42",
            GenerationParams {
                max_tokens: 512,
                temperature: 0.5,
            },
        );
        assert_ne!(base.cache_key(), other_params.cache_key());

        let other_temperature = request(
            1,
            "note",
            "med42",
            GenerationParams {
                max_tokens: 400,
                temperature: 0.7,
            },
        );
        assert_ne!(base.cache_key(), other_temperature.cache_key());
    }

    #[test]
    fn key_is_hex_sha256() {
        let key = request(1, "note", "med42", GenerationParams::default()).cache_key();
        assert_eq!(key.as_str().len(), 64);
        assert!(key.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }
}
