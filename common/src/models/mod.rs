//! Shared data models for the batch job.

pub mod result;
pub mod secret;

// Re-export commonly used types
pub use result::{ResultPayload, ResultRecord, RunStatus};
pub use secret::SecretPayload;
