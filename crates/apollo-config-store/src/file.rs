//! File-backed implementation of the SnapshotStore trait.
//!
//! This is the primary storage backend. Each `(app_id, namespace)` maps to
//! one file holding the JSON-encoded raw configuration. Blocking file I/O
//! runs on tokio's blocking pool.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use apollo_config_core::RawConfig;

use crate::error::{Result, StoreError};
use crate::traits::SnapshotStore;

/// Serializes snapshot writes across every store in the process.
static WRITE_LOCK: Mutex<()> = Mutex::new(());

const FILE_MARKER: &str = "_configuration_";
const FILE_SUFFIX: &str = ".txt";

/// File name of the snapshot for `(app_id, namespace)`.
pub fn snapshot_file_name(app_id: &str, namespace: &str) -> String {
    format!("{}{}{}{}", app_id, FILE_MARKER, namespace, FILE_SUFFIX)
}

/// Recover the namespace from a snapshot file name belonging to `app_id`.
///
/// Returns `None` for other apps' files, editor swap files, temp files, and
/// anything else that is not a snapshot.
pub fn parse_snapshot_file_name(app_id: &str, file_name: &str) -> Option<String> {
    let namespace = file_name
        .strip_prefix(app_id)?
        .strip_prefix(FILE_MARKER)?
        .strip_suffix(FILE_SUFFIX)?;
    if namespace.is_empty() {
        None
    } else {
        Some(namespace.to_string())
    }
}

/// Snapshot store writing one file per namespace under a directory.
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    dir: PathBuf,
}

impl FileSnapshotStore {
    /// Open a store rooted at `dir`, creating the directory if needed.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// The directory snapshots are written to.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Full path of the snapshot for `(app_id, namespace)`.
    pub fn path_for(&self, app_id: &str, namespace: &str) -> PathBuf {
        self.dir.join(snapshot_file_name(app_id, namespace))
    }
}

#[async_trait]
impl SnapshotStore for FileSnapshotStore {
    async fn save(&self, app_id: &str, namespace: &str, config: &RawConfig) -> Result<()> {
        let path = self.path_for(app_id, namespace);
        let encoded =
            serde_json::to_string(config).map_err(|e| StoreError::Serialization(e.to_string()))?;

        // The blocking pool does not inherit the caller's dispatcher.
        let dispatch = tracing::dispatcher::get_default(|current| current.clone());

        tokio::task::spawn_blocking(move || {
            let _guard = WRITE_LOCK.lock().unwrap_or_else(PoisonError::into_inner);

            let mut tmp = path.clone().into_os_string();
            tmp.push(".tmp");
            let tmp = PathBuf::from(tmp);

            fs::write(&tmp, encoded)?;
            fs::rename(&tmp, &path)?;
            tracing::dispatcher::with_default(&dispatch, || {
                tracing::debug!(path = %path.display(), "snapshot written");
            });
            Ok(())
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }

    async fn load(&self, app_id: &str, namespace: &str) -> Result<RawConfig> {
        let path = self.path_for(app_id, namespace);
        let app_id = app_id.to_string();
        let namespace = namespace.to_string();

        tokio::task::spawn_blocking(move || {
            let contents = match fs::read_to_string(&path) {
                Ok(contents) => contents,
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    return Err(StoreError::NotFound { app_id, namespace });
                }
                Err(e) => return Err(e.into()),
            };

            serde_json::from_str(&contents).map_err(|e| StoreError::Corrupt {
                location: path.display().to_string(),
                message: e.to_string(),
            })
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }

    async fn namespaces(&self, app_id: &str) -> Result<Vec<String>> {
        let dir = self.dir.clone();
        let app_id = app_id.to_string();

        tokio::task::spawn_blocking(move || {
            let mut namespaces = Vec::new();
            for entry in fs::read_dir(&dir)? {
                let entry = entry?;
                if !entry.file_type()?.is_file() {
                    continue;
                }
                let file_name = entry.file_name();
                if let Some(ns) = file_name
                    .to_str()
                    .and_then(|name| parse_snapshot_file_name(&app_id, name))
                {
                    namespaces.push(ns);
                }
            }
            namespaces.sort();
            Ok(namespaces)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}
