//! Error types for the sync module.

use thiserror::Error;

use apollo_config_core::FormatError;
use apollo_config_store::StoreError;

/// Errors raised at the transport boundary.
///
/// These never escape a sync pass: the engine recovers from them with the
/// local snapshot and a server failover.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// The request URL could not be built.
    #[error("invalid url {url}: {message}")]
    InvalidUrl { url: String, message: String },

    /// The request did not complete within its timeout.
    #[error("request timed out: {0}")]
    Timeout(String),

    /// Connection or protocol failure.
    #[error("request failed: {0}")]
    Request(String),

    /// The request could not be encoded or signed.
    #[error("request encoding failed: {0}")]
    Encode(String),

    /// The response body is not what the endpoint promises.
    #[error("malformed response body: {0}")]
    Decode(String),
}

/// Errors that can occur during sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Service discovery failed or returned an empty or malformed list.
    #[error("service discovery failed: {0}")]
    Directory(String),

    /// No config server has been selected yet.
    #[error("no active config server")]
    NoActiveServer,

    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The server answered with a status the operation does not accept.
    #[error("unexpected status {status} from {path}")]
    UnexpectedStatus { status: u16, path: String },

    /// A subscriber was registered for a namespace this client does not serve.
    #[error("subscriber namespace {subscriber} does not match client namespace {client}")]
    NamespaceMismatch { subscriber: String, client: String },

    /// Namespace content could not be parsed.
    #[error("format error: {0}")]
    Format(#[from] FormatError),

    /// Snapshot store operation failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl SyncError {
    /// Whether this failure means the current config server is unusable
    /// (network failure, timeout, malformed response) and a failover
    /// should be attempted.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            SyncError::Transport(_) | SyncError::Format(_) | SyncError::NoActiveServer
        )
    }
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
