//! Server configuration

use std::time::Duration;

/// Runtime configuration, loaded once from environment variables at startup
/// and passed explicitly into the components that need it. Core logic never
/// reads the environment on its own.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_address: String,
    pub cors_origins: Vec<String>,
    pub rate_limit_rps: u32,

    /// Hugging Face API token. Summarization is disabled when unset.
    pub hf_token: Option<String>,
    /// Model identifier sent with every generation request.
    pub model: String,
    /// Chat-completions endpoint URL.
    pub inference_url: String,
    /// Per-attempt timeout for a model call.
    pub inference_timeout: Duration,
    /// Attempt budget for transient inference failures.
    pub max_retries: u32,
    /// Base delay for exponential backoff between attempts.
    pub backoff_base: Duration,
    /// Longest a caller waits on an in-flight generation before receiving a
    /// timeout. Should cover the client's full retry budget so waiters only
    /// give up on a genuinely stuck leader.
    pub coordinator_wait: Duration,

    /// Discharge text is truncated to this many characters for the prompt.
    pub max_input_chars: usize,
    pub default_max_tokens: u32,
    pub default_temperature: f32,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "host=localhost user=postgres dbname=discharge".into()),
            bind_address: std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8080".into()),
            cors_origins: std::env::var("CORS_ORIGINS")
                .map(|v| v.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or_else(|_| vec!["*".to_string()]),
            rate_limit_rps: parse_env("RATE_LIMIT_RPS", 50),
            hf_token: std::env::var("HF_TOKEN").ok(),
            model: std::env::var("MODEL_ID")
                .unwrap_or_else(|_| "m42-health/Llama3-Med42-8B".into()),
            inference_url: std::env::var("INFERENCE_URL")
                .unwrap_or_else(|_| "https://router.huggingface.co/v1/chat/completions".into()),
            inference_timeout: Duration::from_secs(parse_env("INFERENCE_TIMEOUT_SECS", 30)),
            max_retries: parse_env("INFERENCE_MAX_RETRIES", 3),
            backoff_base: Duration::from_millis(parse_env("INFERENCE_BACKOFF_BASE_MS", 500)),
            coordinator_wait: Duration::from_secs(parse_env("COORDINATOR_WAIT_SECS", 120)),
            max_input_chars: parse_env("MAX_INPUT_CHARS", 4000),
            default_max_tokens: parse_env("DEFAULT_MAX_TOKENS", 400),
            default_temperature: parse_env("DEFAULT_TEMPERATURE", 0.5),
        }
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
