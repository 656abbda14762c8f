//! Utility functions and helpers.

pub mod id_generator;
pub mod storage_key;

// Re-export commonly used types
pub use id_generator::IdGenerator;
pub use storage_key::StorageKey;
