//! Client configuration.
//!
//! A [`ClientConfig`] can be built in code, deserialized (durations are
//! written in milliseconds as `*_ms` fields), or read from the environment:
//!
//! | Variable           | Field       |
//! |--------------------|-------------|
//! | `APOLLO_META`      | `meta_url`  |
//! | `APOLLO_APP_ID`    | `app_id`    |
//! | `APOLLO_CLUSTER`   | `cluster`   |
//! | `APOLLO_NAMESPACE` | `namespace` |
//! | `APOLLO_SECRET`    | `secret`    |
//! | `APOLLO_CACHE_DIR` | `cache_dir` |

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use apollo_config_sync::{SyncConfig, SERVER_HOLD_TIME};

use crate::error::{ClientError, Result};

/// Everything needed to build an [`crate::ApolloClient`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the meta server used for service discovery.
    pub meta_url: String,
    pub app_id: String,
    pub cluster: String,
    /// The namespace this client serves and long-polls.
    pub namespace: String,
    /// Access-key secret. Requests are signed when set.
    pub secret: Option<String>,
    /// Directory for local snapshots.
    pub cache_dir: PathBuf,
    #[serde(rename = "poll_interval_ms", with = "duration_ms")]
    pub poll_interval: Duration,
    #[serde(rename = "hold_timeout_ms", with = "duration_ms")]
    pub hold_timeout: Duration,
    #[serde(rename = "request_timeout_ms", with = "duration_ms")]
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        let sync = SyncConfig::default();
        Self {
            meta_url: String::new(),
            app_id: String::new(),
            cluster: sync.cluster,
            namespace: sync.namespace,
            secret: None,
            cache_dir: std::env::temp_dir().join("apollo-config"),
            poll_interval: sync.poll_interval,
            hold_timeout: sync.hold_timeout,
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl ClientConfig {
    pub fn new(meta_url: impl Into<String>, app_id: impl Into<String>) -> Self {
        Self {
            meta_url: meta_url.into(),
            app_id: app_id.into(),
            ..Self::default()
        }
    }

    pub fn cluster(mut self, cluster: impl Into<String>) -> Self {
        self.cluster = cluster.into();
        self
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(secret.into());
        self
    }

    pub fn cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = dir.into();
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn hold_timeout(mut self, timeout: Duration) -> Self {
        self.hold_timeout = timeout;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Read the configuration from `APOLLO_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Like [`ClientConfig::from_env`], reading variables through `lookup`.
    /// Unset and empty variables keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(meta_url) = var("APOLLO_META") {
            config.meta_url = meta_url;
        }
        if let Some(app_id) = var("APOLLO_APP_ID") {
            config.app_id = app_id;
        }
        if let Some(cluster) = var("APOLLO_CLUSTER") {
            config.cluster = cluster;
        }
        if let Some(namespace) = var("APOLLO_NAMESPACE") {
            config.namespace = namespace;
        }
        config.secret = var("APOLLO_SECRET");
        if let Some(dir) = var("APOLLO_CACHE_DIR") {
            config.cache_dir = PathBuf::from(dir);
        }

        config.validate()?;
        Ok(config)
    }

    /// Check that the configuration can identify an app on a meta server.
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("meta_url", &self.meta_url),
            ("app_id", &self.app_id),
            ("cluster", &self.cluster),
            ("namespace", &self.namespace),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(ClientError::Config(format!("{} must not be empty", field)));
            }
        }
        if self.hold_timeout.is_zero() || self.request_timeout.is_zero() {
            return Err(ClientError::Config("timeouts must be positive".into()));
        }
        if self.hold_timeout <= SERVER_HOLD_TIME {
            return Err(ClientError::Config(format!(
                "hold_timeout must exceed the server hold time of {}s",
                SERVER_HOLD_TIME.as_secs()
            )));
        }
        Ok(())
    }

    /// The registry key identifying clients with this configuration.
    pub fn key(&self) -> ClientKey {
        ClientKey {
            app_id: self.app_id.clone(),
            cluster: self.cluster.clone(),
            namespace: self.namespace.clone(),
            meta_url: self.meta_url.clone(),
            secret: self.secret.clone(),
        }
    }

    /// The subset of this configuration the sync engine runs on.
    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            app_id: self.app_id.clone(),
            cluster: self.cluster.clone(),
            namespace: self.namespace.clone(),
            poll_interval: self.poll_interval,
            hold_timeout: self.hold_timeout,
        }
    }
}

/// Construction parameters that make two clients the same client.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientKey {
    pub app_id: String,
    pub cluster: String,
    pub namespace: String,
    pub meta_url: String,
    pub secret: Option<String>,
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
