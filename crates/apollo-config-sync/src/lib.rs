//! # Apollo Config Sync
//!
//! Keeps a client's configuration in sync with Apollo config servers.
//!
//! ## Overview
//!
//! The [`SyncEngine`] owns everything that changes at runtime: the active
//! config server, the in-memory cache, the subscriber registry, and the
//! last notification id per namespace. It fetches namespaces from the
//! active server, falls back to the local snapshot when that fails, diffs
//! every update into the cache, and notifies subscribers in priority order.
//! A background task long-polls for changes.
//!
//! ## Key Properties
//!
//! - **Never fails after discovery**: a sync pass ends with either the
//!   remote configuration or the local snapshot installed
//! - **Failover**: a transport failure switches to another config server
//! - **Write avoidance**: snapshots are written only when the release key moves
//! - **Isolated subscribers**: one failing callback does not stop the rest
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use apollo_config_store::FileSnapshotStore;
//! use apollo_config_sync::{HttpTransport, Subscriber, SyncConfig, SyncEngine};
//!
//! async fn example() -> apollo_config_sync::Result<()> {
//!     let transport = Arc::new(HttpTransport::new("my-app", None, Duration::from_secs(10))?);
//!     let store = Arc::new(FileSnapshotStore::open("/tmp/apollo-config")?);
//!     let engine = Arc::new(SyncEngine::new(
//!         SyncConfig::new("my-app"),
//!         "http://apollo-meta:8080",
//!         transport,
//!         store,
//!     ));
//!
//!     engine.bootstrap().await?;
//!     engine.add_subscriber(Subscriber::from_fn("application", |config| {
//!         println!("updated: {:?}", config.map(|c| c.len()));
//!         Ok(())
//!     }))?;
//!     engine.start_polling();
//!     Ok(())
//! }
//! ```
//!
//! ## Message Flow
//!
//! ```text
//! Client                    Meta server            Config server
//!   |-- services/config ------->|                        |
//!   |<-- [instances] -----------|                        |
//!   |-- configs/{app}/{cluster}/{ns} ------------------->|
//!   |<-- {configurations, releaseKey} -------------------|
//!   |-- notifications/v2 (held) ------------------------>|
//!   |<-- 304 | [{namespaceName, notificationId}] --------|
//! ```

pub mod cache;
pub mod directory;
pub mod engine;
pub mod error;
pub mod messages;
pub mod signing;
pub mod subscriber;
pub mod transport;

pub use cache::{ConfigCache, UpdateReport};
pub use directory::ServerDirectory;
pub use engine::{PollOutcome, SyncConfig, SyncEngine, SyncSource};
pub use error::{Result, SyncError, TransportError};
pub use messages::{
    config_path, ConfigResponse, NotificationEntry, ServiceInstance, NOTIFICATIONS_PATH,
    SERVER_HOLD_TIME, SERVICES_PATH,
};
pub use subscriber::{NotificationSink, NotifyReport, SinkResult, Subscriber, SubscriberRegistry};
pub use transport::{
    memory::MemoryTransport, memory::RecordedRequest, HttpTransport, Method, Request, Response,
    Transport,
};
