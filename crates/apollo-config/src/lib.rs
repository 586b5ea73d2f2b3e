//! # Apollo Config
//!
//! A client for Apollo-style configuration centers.
//!
//! ## Overview
//!
//! The client fetches namespaced key/value configuration over HTTP, keeps
//! it in memory for reads, persists the last good copy to disk, notifies
//! subscribers of every update, and long-polls the config server for
//! changes:
//!
//! - **Fetch or fall back**: when the config server cannot serve a
//!   namespace, the last local snapshot is used instead
//! - **Failover**: transport failures switch to another config server
//! - **Change tracking**: every value carries a `changed` marker for the
//!   most recent update
//! - **Subscribers**: callbacks run in priority order after each update
//!
//! ## Usage
//!
//! ```rust,no_run
//! use apollo_config::{ApolloClient, ClientConfig, Subscriber};
//!
//! async fn example() -> apollo_config::Result<()> {
//!     let config = ClientConfig::new("http://apollo-meta:8080", "my-app")
//!         .namespace("application")
//!         .cache_dir("/var/cache/apollo");
//!
//!     let client = ApolloClient::builder(config)
//!         .subscriber(
//!             Subscriber::from_fn("application", |config| {
//!                 let changed = config.map_or(0, |c| c.values().filter(|v| v.changed).count());
//!                 println!("{} keys changed", changed);
//!                 Ok(())
//!             })
//!             .with_priority(10),
//!         )
//!         .connect()
//!         .await?;
//!
//!     client.start_polling();
//!     let timeout = client.get_value("timeout", Some("30"), None);
//!     println!("timeout = {:?}", timeout);
//!     Ok(())
//! }
//! ```
//!
//! ## Shared Clients
//!
//! [`ClientRegistry::global`] hands out one client per
//! `(app_id, cluster, namespace, meta_url, secret)`:
//!
//! ```rust,no_run
//! use apollo_config::{ClientConfig, ClientRegistry};
//!
//! async fn example() -> apollo_config::Result<()> {
//!     let config = ClientConfig::from_env()?;
//!     let a = ClientRegistry::global().get_or_connect(config.clone()).await?;
//!     let b = ClientRegistry::global().get_or_connect(config).await?;
//!     assert!(std::sync::Arc::ptr_eq(&a, &b));
//!     Ok(())
//! }
//! ```
//!
//! ## Re-exports
//!
//! This crate re-exports the component crates for convenience:
//!
//! - `apollo_config::core` - Data model and namespace formats
//! - `apollo_config::store` - Local snapshot storage
//! - `apollo_config::sync` - Transport, signing, and the sync engine

pub mod client;
pub mod config;
pub mod error;
pub mod registry;

// Re-export component crates
pub use apollo_config_core as core;
pub use apollo_config_store as store;
pub use apollo_config_sync as sync;

// Re-export main types for convenience
pub use client::{ApolloClient, ClientBuilder};
pub use config::{ClientConfig, ClientKey};
pub use error::{ClientError, Result};
pub use registry::ClientRegistry;

// Re-export commonly used component types
pub use apollo_config_core::{ConfigValue, NamespaceConfig};
pub use apollo_config_sync::{
    NotificationSink, PollOutcome, SinkResult, Subscriber, SyncError, SyncSource,
};
