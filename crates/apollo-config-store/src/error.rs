//! Error types for the store module.

use thiserror::Error;

/// Errors that can occur during snapshot operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No snapshot has been written for this namespace.
    #[error("no snapshot for app {app_id} namespace {namespace}")]
    NotFound { app_id: String, namespace: String },

    /// The snapshot exists but does not hold a JSON string map.
    #[error("corrupt snapshot {location}: {message}")]
    Corrupt { location: String, message: String },

    /// Snapshot serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A blocking storage task failed to complete.
    #[error("storage task failed: {0}")]
    Task(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// True for the "nothing usable on disk" cases the engine treats as an
    /// empty configuration.
    pub fn is_unreadable(&self) -> bool {
        matches!(self, StoreError::NotFound { .. } | StoreError::Corrupt { .. })
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
