//! In-memory implementation of the SnapshotStore trait.
//!
//! This is primarily for testing. It has the same semantics as the file
//! store but keeps everything in memory with no persistence.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;

use apollo_config_core::RawConfig;

use crate::error::{Result, StoreError};
use crate::traits::SnapshotStore;

/// In-memory snapshot store.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock.
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    snapshots: RwLock<HashMap<(String, String), RawConfig>>,
    /// Number of `save` calls that reached the store.
    saves: AtomicUsize,
}

impl MemorySnapshotStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a snapshot without counting it as a save.
    pub fn with_snapshot(self, app_id: &str, namespace: &str, config: RawConfig) -> Self {
        self.snapshots
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((app_id.to_string(), namespace.to_string()), config);
        self
    }

    /// How many times `save` has been called.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn save(&self, app_id: &str, namespace: &str, config: &RawConfig) -> Result<()> {
        let mut snapshots = self.snapshots.write().unwrap_or_else(PoisonError::into_inner);
        snapshots.insert((app_id.to_string(), namespace.to_string()), config.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn load(&self, app_id: &str, namespace: &str) -> Result<RawConfig> {
        let snapshots = self.snapshots.read().unwrap_or_else(PoisonError::into_inner);
        snapshots
            .get(&(app_id.to_string(), namespace.to_string()))
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                app_id: app_id.to_string(),
                namespace: namespace.to_string(),
            })
    }

    async fn namespaces(&self, app_id: &str) -> Result<Vec<String>> {
        let snapshots = self.snapshots.read().unwrap_or_else(PoisonError::into_inner);
        let mut namespaces: Vec<String> = snapshots
            .keys()
            .filter(|(app, _)| app == app_id)
            .map(|(_, ns)| ns.clone())
            .collect();
        namespaces.sort();
        Ok(namespaces)
    }
}
