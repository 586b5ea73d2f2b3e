//! Test fixtures for common scenarios.

use std::sync::{Arc, Mutex, PoisonError};

use serde_json::{json, Value};
use tempfile::TempDir;
use tracing::Dispatch;

use apollo_config_core::{NamespaceConfig, RawConfig};
use apollo_config_store::FileSnapshotStore;
use apollo_config_sync::{
    config_path, MemoryTransport, NotificationSink, Response, SinkResult, SyncConfig, SyncEngine,
    TransportError, NOTIFICATIONS_PATH, SERVICES_PATH,
};

/// Build a raw configuration map from pairs.
pub fn raw_map(pairs: &[(&str, &str)]) -> RawConfig {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Body of a successful namespace fetch.
pub fn config_json(pairs: &[(&str, &str)], release_key: Option<&str>) -> Value {
    let mut body = json!({ "configurations": raw_map(pairs) });
    if let Some(release_key) = release_key {
        body["releaseKey"] = json!(release_key);
    }
    body
}

/// Body of a service-discovery response listing `urls` in order.
pub fn services_json(urls: &[&str]) -> Value {
    Value::Array(
        urls.iter()
            .enumerate()
            .map(|(i, url)| {
                json!({
                    "appName": "APOLLO-CONFIGSERVICE",
                    "instanceId": format!("config-{}", i),
                    "homepageUrl": url,
                })
            })
            .collect(),
    )
}

/// Body of a long-poll response announcing changed namespaces.
pub fn notifications_json(changes: &[(&str, i64)]) -> Value {
    Value::Array(
        changes
            .iter()
            .map(|(ns, id)| json!({ "namespaceName": ns, "notificationId": id }))
            .collect(),
    )
}

/// A response carrying `body` as JSON.
pub fn json_response(status: u16, body: &Value) -> Response {
    Response::new(status, body.to_string())
}

/// A subscriber that remembers every delivery.
///
/// Clones share the same log.
#[derive(Clone, Default)]
pub struct RecordingSink {
    deliveries: Arc<Mutex<Vec<Option<NamespaceConfig>>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.deliveries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// The most recent delivery. `Some(None)` means the subscriber was
    /// notified without a configuration.
    pub fn last(&self) -> Option<Option<NamespaceConfig>> {
        self.deliveries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
    }

    pub fn deliveries(&self) -> Vec<Option<NamespaceConfig>> {
        self.deliveries.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl NotificationSink for RecordingSink {
    fn on_update(&self, config: Option<&NamespaceConfig>) -> SinkResult {
        self.deliveries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(config.cloned());
        Ok(())
    }
}

/// A meta server plus `n` config servers on the in-memory transport, and a
/// file snapshot store in a temp directory.
///
/// Config servers are `http://config-{i}:8080`, listed by discovery in
/// index order.
pub struct TestFixture {
    pub app_id: String,
    pub meta_url: String,
    pub servers: Vec<String>,
    pub transport: Arc<MemoryTransport>,
    pub store: Arc<FileSnapshotStore>,
    dir: TempDir,
}

impl TestFixture {
    pub fn new(app_id: &str, servers: usize) -> Self {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let store = FileSnapshotStore::open(dir.path()).expect("failed to open snapshot store");
        let servers: Vec<String> = (0..servers)
            .map(|i| format!("http://config-{}:8080", i))
            .collect();
        let meta_url = "http://meta:8080".to_string();

        let transport = Arc::new(MemoryTransport::new());
        let urls: Vec<&str> = servers.iter().map(String::as_str).collect();
        transport.respond(&meta_url, SERVICES_PATH, json_response(200, &services_json(&urls)));

        Self {
            app_id: app_id.to_string(),
            meta_url,
            servers,
            transport,
            store: Arc::new(store),
            dir,
        }
    }

    /// The snapshot directory.
    pub fn dir(&self) -> &std::path::Path {
        self.dir.path()
    }

    fn config_path(&self, namespace: &str) -> String {
        config_path(&self.app_id, "default", namespace)
    }

    /// Serve `pairs` for `namespace` from server `server`, replacing any
    /// earlier script for that route.
    pub fn serve_config(&self, server: usize, namespace: &str, pairs: &[(&str, &str)], release_key: &str) {
        let path = self.config_path(namespace);
        self.transport.clear(&self.servers[server], &path);
        self.transport.respond(
            &self.servers[server],
            &path,
            json_response(200, &config_json(pairs, Some(release_key))),
        );
    }

    /// Answer every fetch of `namespace` on server `server` with `status`.
    pub fn serve_status(&self, server: usize, namespace: &str, status: u16) {
        let path = self.config_path(namespace);
        self.transport.clear(&self.servers[server], &path);
        self.transport
            .respond(&self.servers[server], &path, Response::empty(status));
    }

    /// Make every fetch of `namespace` on server `server` fail at the
    /// transport level.
    pub fn break_server(&self, server: usize, namespace: &str) {
        let path = self.config_path(namespace);
        self.transport.clear(&self.servers[server], &path);
        self.transport.fail(
            &self.servers[server],
            &path,
            TransportError::Request("connection refused".into()),
        );
        self.transport.clear(&self.servers[server], NOTIFICATIONS_PATH);
        self.transport.fail(
            &self.servers[server],
            NOTIFICATIONS_PATH,
            TransportError::Request("connection refused".into()),
        );
    }

    /// Queue one long-poll answer announcing `changes`, followed by 304s.
    pub fn notify_change(&self, server: usize, changes: &[(&str, i64)]) {
        self.transport.clear(&self.servers[server], NOTIFICATIONS_PATH);
        self.transport.respond(
            &self.servers[server],
            NOTIFICATIONS_PATH,
            json_response(200, &notifications_json(changes)),
        );
        self.transport
            .respond(&self.servers[server], NOTIFICATIONS_PATH, Response::empty(304));
    }

    /// A silenced engine for `namespace` wired to this fixture.
    pub fn engine(&self, namespace: &str) -> Arc<SyncEngine> {
        let mut config = SyncConfig::new(self.app_id.as_str());
        config.namespace = namespace.to_string();
        self.engine_with(config)
    }

    pub fn engine_with(&self, config: SyncConfig) -> Arc<SyncEngine> {
        Arc::new(
            SyncEngine::new(
                config,
                self.meta_url.as_str(),
                self.transport.clone(),
                self.store.clone(),
            )
            .with_dispatch(Dispatch::none()),
        )
    }
}
