//! Unique ID generator.
//!
//! Provides identifiers for correlating a batch run across log lines.

use uuid::Uuid;

/// Generates unique identifiers for batch runs.
pub struct IdGenerator;

impl IdGenerator {
    /// Generates a unique run ID.
    ///
    /// # Returns
    /// A unique UUID string.
    pub fn run_id() -> String {
        Uuid::new_v4().to_string()
    }
}
