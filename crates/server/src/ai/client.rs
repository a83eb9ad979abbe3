//! Inference client for the Hugging Face chat-completions API

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use discharge_core::GenerationRequest;

use super::retry::RetryPolicy;
use crate::config::Config;

const SYSTEM_PROMPT: &str = "You are a helpful, respectful and honest medical assistant. \
Always answer as helpfully as possible, while being safe. Your answers should not include \
any harmful, unethical, racist, sexist, toxic, dangerous, or illegal content. If you don't \
know the answer to a question, don't share false information.";

/// Seam between the coordinator and the model transport, so generation can
/// be exercised against a scripted backend in tests.
pub trait InferenceBackend: Send + Sync + 'static {
    fn generate(
        &self,
        request: &GenerationRequest,
    ) -> impl Future<Output = Result<InferenceOutput, InferenceError>> + Send;
}

/// Successful model call.
#[derive(Debug, Clone)]
pub struct InferenceOutput {
    pub text: String,
    /// Attempts spent, counting the successful one.
    pub attempts: u32,
}

/// Classified transport failure.
///
/// Transient failures (timeouts, rate limiting, server errors) are retried
/// by the client up to its budget; terminal ones (bad credentials,
/// malformed requests) surface immediately.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct InferenceError {
    pub kind: InferenceErrorKind,
    pub status: Option<u16>,
    pub message: String,
    pub attempts: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InferenceErrorKind {
    Transient,
    Terminal,
}

impl InferenceError {
    pub fn transient(message: impl Into<String>, status: Option<u16>) -> Self {
        Self {
            kind: InferenceErrorKind::Transient,
            status,
            message: message.into(),
            attempts: 0,
        }
    }

    pub fn terminal(message: impl Into<String>, status: Option<u16>) -> Self {
        Self {
            kind: InferenceErrorKind::Terminal,
            status,
            message: message.into(),
            attempts: 0,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind == InferenceErrorKind::Transient
    }

    pub(crate) fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }
}

/// Classify an HTTP status for the retry policy.
fn classify_status(status: u16) -> InferenceErrorKind {
    match status {
        408 | 429 => InferenceErrorKind::Transient,
        s if s >= 500 => InferenceErrorKind::Transient,
        _ => InferenceErrorKind::Terminal,
    }
}

/// Client for the chat-completions inference endpoint.
///
/// Owns the timeout/retry policy and classification of transport failures;
/// it never touches the summary store.
#[derive(Clone)]
pub struct InferenceClient {
    http: reqwest::Client,
    url: String,
    token: String,
    retry: RetryPolicy,
    attempt_timeout: Duration,
}

/// Request body for the chat-completions API
#[derive(Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

/// Response from the chat-completions API
#[derive(Deserialize)]
struct ApiResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: String,
}

/// Error detail from the chat-completions API
#[derive(Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
}

impl InferenceClient {
    pub fn new(config: &Config, token: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            url: config.inference_url.clone(),
            token,
            retry: RetryPolicy::new(config.max_retries, config.backoff_base),
            attempt_timeout: config.inference_timeout,
        }
    }

    /// One bounded attempt against the endpoint.
    async fn attempt(&self, request: &GenerationRequest) -> Result<String, InferenceError> {
        let body = ApiRequest {
            model: &request.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: format!(
                        "Summarize this discharge summary concisely:\n\n{}",
                        request.source_text
                    ),
                },
            ],
            max_tokens: request.params.max_tokens,
            temperature: request.params.temperature,
        };

        let response = self
            .http
            .post(&self.url)
            .bearer_auth(&self.token)
            .timeout(self.attempt_timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() || e.is_connect() {
                    InferenceError::transient(format!("request failed: {}", e), None)
                } else {
                    InferenceError::terminal(format!("request failed: {}", e), None)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiError>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(InferenceError {
                kind: classify_status(status.as_u16()),
                status: Some(status.as_u16()),
                message: format!("inference endpoint returned {}: {}", status, message),
                attempts: 0,
            });
        }

        let parsed: ApiResponse = response.json().await.map_err(|e| {
            InferenceError::terminal(
                format!("failed to parse response: {}", e),
                Some(status.as_u16()),
            )
        })?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| {
                InferenceError::terminal("no choices in response", Some(status.as_u16()))
            })
    }
}

impl InferenceBackend for InferenceClient {
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<InferenceOutput, InferenceError> {
        self.retry
            .run(|attempt| async move {
                let text = self.attempt(request).await?;
                Ok(InferenceOutput { text, attempts: attempt })
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limits_and_server_errors_are_transient() {
        assert_eq!(classify_status(408), InferenceErrorKind::Transient);
        assert_eq!(classify_status(429), InferenceErrorKind::Transient);
        assert_eq!(classify_status(500), InferenceErrorKind::Transient);
        assert_eq!(classify_status(502), InferenceErrorKind::Transient);
        assert_eq!(classify_status(503), InferenceErrorKind::Transient);
    }

    #[test]
    fn client_errors_are_terminal() {
        assert_eq!(classify_status(400), InferenceErrorKind::Terminal);
        assert_eq!(classify_status(401), InferenceErrorKind::Terminal);
        assert_eq!(classify_status(403), InferenceErrorKind::Terminal);
        assert_eq!(classify_status(404), InferenceErrorKind::Terminal);
        assert_eq!(classify_status(422), InferenceErrorKind::Terminal);
    }
}
