//! Error types for the batch job.
//!
//! Every variant is fatal for the invocation: it is logged once and then
//! propagated to the hosting runtime unchanged.

use thiserror::Error;

/// Result alias used across the workspace.
pub type AppResult<T> = Result<T, AppError>;

/// Upstream failures raised by the batch job.
#[derive(Debug, Error)]
pub enum AppError {
    /// Secret identifier missing, secrets store unreachable, or payload invalid.
    #[error("Secret retrieval failed: {0}")]
    SecretRetrieval(String),

    /// Bad host, credentials or network when opening the database session.
    #[error("Database connection failed: {0}")]
    DatabaseConnection(String),

    /// A diagnostic statement failed.
    #[error("Database query failed: {0}")]
    DatabaseQuery(String),

    /// The result record could not be written to object storage.
    #[error("Storage write failed: {0}")]
    StorageWrite(String),
}

impl AppError {
    /// Returns a stable error code for log correlation.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::SecretRetrieval(_) => "SECRET_RETRIEVAL_ERROR",
            AppError::DatabaseConnection(_) => "DATABASE_CONNECTION_ERROR",
            AppError::DatabaseQuery(_) => "DATABASE_QUERY_ERROR",
            AppError::StorageWrite(_) => "STORAGE_WRITE_ERROR",
        }
    }
}
