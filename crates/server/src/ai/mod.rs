//! AI summary generation
//!
//! Prompt building, the inference transport with its retry policy, and the
//! single-flight generation coordinator.

pub mod client;
pub mod coordinator;
pub mod prompt;
pub mod retry;

pub use client::{InferenceBackend, InferenceClient};
pub use coordinator::Coordinator;
pub use prompt::{ParamOverrides, PromptBuilder};
