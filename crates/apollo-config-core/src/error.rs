//! Error types for the Apollo Config Core.

use thiserror::Error;

/// Errors raised while turning a raw `configurations` map into an
/// effective key/value map.
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("namespace {namespace} has no `content` entry")]
    MissingContent { namespace: String },

    #[error("invalid YAML in namespace {namespace}: {message}")]
    Yaml { namespace: String, message: String },

    #[error("invalid JSON in namespace {namespace}: {message}")]
    Json { namespace: String, message: String },
}

/// Result type for format operations.
pub type Result<T> = std::result::Result<T, FormatError>;
