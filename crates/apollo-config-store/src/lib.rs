//! # Apollo Config Store
//!
//! Local snapshot storage for the Apollo config client. Provides a
//! trait-based interface for persisting the last successfully fetched
//! configuration of each namespace, with file-backed and in-memory
//! implementations.
//!
//! ## Overview
//!
//! The sync engine writes a namespace's raw `configurations` map here
//! after a successful fetch, and reads it back when the config server is
//! unreachable or answers with an error. The primary implementation is
//! [`FileSnapshotStore`], with [`MemorySnapshotStore`] for testing.
//!
//! ## Key Types
//!
//! - [`SnapshotStore`] - The async trait for all snapshot operations
//! - [`FileSnapshotStore`] - One JSON file per `(app_id, namespace)`
//! - [`MemorySnapshotStore`] - In-memory storage for tests
//!
//! ## Usage
//!
//! ```rust,no_run
//! use apollo_config_store::{FileSnapshotStore, SnapshotStore};
//! use apollo_config_core::RawConfig;
//!
//! async fn example() {
//!     let store = FileSnapshotStore::open("/var/cache/apollo").unwrap();
//!
//!     let mut raw = RawConfig::new();
//!     raw.insert("timeout".into(), "30".into());
//!     store.save("my-app", "application", &raw).await.unwrap();
//!
//!     let restored = store.load("my-app", "application").await.unwrap();
//!     assert_eq!(restored, raw);
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **File layout**: `{app_id}_configuration_{namespace}.txt` holding the
//!   JSON-encoded raw map.
//! - **Single writer**: file writes are serialized process-wide and land via
//!   write-to-temp then rename, so readers never observe a partial file.
//! - **Missing vs corrupt**: both surface as errors; the engine recovers
//!   either one as an empty configuration.

pub mod error;
pub mod file;
pub mod memory;
pub mod traits;

pub use error::{Result, StoreError};
pub use file::{parse_snapshot_file_name, snapshot_file_name, FileSnapshotStore};
pub use memory::MemorySnapshotStore;
pub use traits::SnapshotStore;
