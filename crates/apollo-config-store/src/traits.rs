//! SnapshotStore trait: the abstract interface for snapshot persistence.
//!
//! This trait allows the sync engine to be storage-agnostic. Implementations
//! include the file store (primary) and in-memory (for tests).

use async_trait::async_trait;

use apollo_config_core::RawConfig;

use crate::error::Result;

/// The SnapshotStore trait: async interface for snapshot persistence.
///
/// Snapshots are keyed by `(app_id, namespace)` and hold the raw
/// `configurations` map of the last successful fetch, before any content
/// parsing.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Persist the raw configuration for a namespace, replacing any
    /// previous snapshot.
    async fn save(&self, app_id: &str, namespace: &str, config: &RawConfig) -> Result<()>;

    /// Read back the snapshot for a namespace.
    ///
    /// # Returns
    /// - The raw configuration exactly as it was saved.
    /// - `StoreError::NotFound` if nothing was ever saved.
    /// - `StoreError::Corrupt` if the stored data cannot be decoded.
    async fn load(&self, app_id: &str, namespace: &str) -> Result<RawConfig>;

    /// List the namespaces that have a snapshot for this app, sorted.
    async fn namespaces(&self, app_id: &str) -> Result<Vec<String>>;
}
