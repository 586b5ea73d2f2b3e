//! Error types for the client.

use apollo_config_store::StoreError;
use apollo_config_sync::{SyncError, TransportError};
use thiserror::Error;

/// Errors that can occur while building or using a client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The configuration is unusable.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Sync error (service discovery, subscriber validation).
    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    /// The snapshot directory could not be opened.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// The HTTP transport could not be built.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

impl ClientError {
    /// Whether service discovery failed.
    pub fn is_directory(&self) -> bool {
        matches!(self, ClientError::Sync(SyncError::Directory(_)))
    }
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
