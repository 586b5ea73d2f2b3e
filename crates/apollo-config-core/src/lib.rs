//! # Apollo Config Core
//!
//! Pure primitives for the Apollo config client: versioned configuration
//! values, namespace maps, and namespace content formats.
//!
//! This crate contains no I/O, no storage, no networking.
//!
//! ## Key Types
//!
//! - [`ConfigValue`] - A value plus its "changed in the last update" flag
//! - [`NamespaceConfig`] - The in-memory view of one namespace
//! - [`RawConfig`] - The `configurations` map exactly as the server sent it
//! - [`EffectiveConfig`] - The flat key/value map after content parsing
//! - [`RemoteConfigResponse`] - One authoritative snapshot from the server
//!
//! ## Formats
//!
//! Namespaces ending in `.yaml`/`.yml` or `.json` carry their data in a
//! single `content` entry. See the [`format`] module.

pub mod error;
pub mod format;
pub mod types;

pub use error::{FormatError, Result};
pub use format::{parse_configurations, NamespaceFormat, CONTENT_KEY};
pub use types::{
    ConfigValue, EffectiveConfig, NamespaceConfig, RawConfig, RemoteConfigResponse,
    NEVER_POLLED,
};
