//! discharge-core: Shared domain types for the discharge summary service
//!
//! This crate provides the types used across the server: generation
//! requests and cache keys, stored summaries, patient records, pagination,
//! and the error taxonomy.

pub mod error;
pub mod page;
pub mod patient;
pub mod request;
pub mod summary;

pub use error::{GenerationError, StoreError};
pub use page::Page;
pub use patient::{NewPatient, PatientRecord};
pub use request::{CacheKey, GenerationParams, GenerationRequest};
pub use summary::{Summary, SummaryStatus};
