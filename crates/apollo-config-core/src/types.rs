//! Data model shared by the store, sync engine, and client facade.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

/// The `configurations` object of a fetch response, before any content
/// parsing. This is what the snapshot store persists.
pub type RawConfig = BTreeMap<String, String>;

/// The flat key/value map a namespace resolves to after content parsing.
pub type EffectiveConfig = BTreeMap<String, String>;

/// The in-memory view of one namespace: key to versioned value.
pub type NamespaceConfig = HashMap<String, ConfigValue>;

/// Notification id recorded for a namespace that has never been polled.
pub const NEVER_POLLED: i64 = -1;

/// A configuration value together with its change marker.
///
/// `changed` is transient: it describes the most recent update pass only
/// and is recomputed every time the namespace is updated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigValue {
    /// The current string value.
    pub value: String,
    /// True if `value` differs from the value known before the last update.
    pub changed: bool,
}

impl ConfigValue {
    /// A value that moved (or appeared) in the last update.
    pub fn changed(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            changed: true,
        }
    }

    /// A value that was confirmed unchanged by the last update.
    pub fn unchanged(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            changed: false,
        }
    }
}

/// One authoritative snapshot returned by a remote fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteConfigResponse {
    /// Opaque version token identifying this snapshot.
    pub release_key: String,
    /// The effective key/value map for the namespace.
    pub config: EffectiveConfig,
    /// The `configurations` map as received, kept for the snapshot store.
    pub raw: RawConfig,
}
