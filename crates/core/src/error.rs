use thiserror::Error;

/// Failure taxonomy for the summary generation pipeline.
///
/// Errors are `Clone` because a single generation outcome is fanned out to
/// every concurrent waiter attached to the same in-flight handle.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum GenerationError {
    /// Bad or missing source text. Never retried.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The inference client exhausted its retry budget or hit a
    /// non-retryable failure. `transient` records the classification of
    /// the last cause so callers can tell "try again" from "give up".
    #[error("inference failed after {attempts} attempt(s): {message}")]
    Inference {
        message: String,
        attempts: u32,
        transient: bool,
    },

    /// The coordinator wait bound elapsed before the leader published a
    /// result. The in-flight handle has been cleared, so retrying is safe.
    #[error("timed out waiting for summary generation")]
    Timeout,

    /// Persistence failure while reading or writing summaries.
    #[error("storage error: {0}")]
    Store(String),
}

/// Persistence-layer failures for the summary store.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StoreError {
    /// Constraint violation, e.g. inserting a summary with an existing id.
    #[error("duplicate record: {0}")]
    Duplicate(String),

    #[error("database error: {0}")]
    Database(String),
}

impl From<StoreError> for GenerationError {
    fn from(err: StoreError) -> Self {
        GenerationError::Store(err.to_string())
    }
}
