//! The client: a sync engine plus the read and subscription API.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use tracing::Dispatch;

use apollo_config_core::{NamespaceConfig, RemoteConfigResponse};
use apollo_config_store::{FileSnapshotStore, SnapshotStore};
use apollo_config_sync::{
    HttpTransport, NotifyReport, PollOutcome, Subscriber, SyncEngine, SyncSource, Transport,
};

use crate::config::ClientConfig;
use crate::error::Result;

/// Builds an [`ApolloClient`].
///
/// Transport and store default to HTTP and the file store under
/// `cache_dir`; tests swap in the in-memory ones.
pub struct ClientBuilder {
    config: ClientConfig,
    transport: Option<Arc<dyn Transport>>,
    store: Option<Arc<dyn SnapshotStore>>,
    subscribers: Vec<Subscriber>,
    dispatch: Option<Dispatch>,
}

impl ClientBuilder {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            transport: None,
            store: None,
            subscribers: Vec::new(),
            dispatch: None,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn store(mut self, store: Arc<dyn SnapshotStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Register a subscriber before the first fetch, so it sees the
    /// initial configuration.
    pub fn subscriber(mut self, subscriber: Subscriber) -> Self {
        self.subscribers.push(subscriber);
        self
    }

    pub fn subscribers(mut self, subscribers: impl IntoIterator<Item = Subscriber>) -> Self {
        self.subscribers.extend(subscribers);
        self
    }

    /// Log to `dispatch` instead of the current default dispatcher.
    pub fn dispatch(mut self, dispatch: Dispatch) -> Self {
        self.dispatch = Some(dispatch);
        self
    }

    /// Validate, discover a config server, and run the first sync.
    ///
    /// Fails on invalid configuration, a subscriber bound to another
    /// namespace, or failed service discovery. An unreachable config server
    /// is not an error: the client starts from its local snapshot.
    pub async fn connect(self) -> Result<ApolloClient> {
        let config = self.config;
        config.validate()?;

        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::new(
                config.app_id.clone(),
                config.secret.clone(),
                config.request_timeout,
            )?),
        };
        let store: Arc<dyn SnapshotStore> = match self.store {
            Some(store) => store,
            None => Arc::new(FileSnapshotStore::open(&config.cache_dir)?),
        };

        let mut engine =
            SyncEngine::new(config.sync_config(), config.meta_url.clone(), transport, store);
        if let Some(dispatch) = self.dispatch {
            engine = engine.with_dispatch(dispatch);
        }

        for subscriber in &self.subscribers {
            engine.check_subscriber(subscriber)?;
        }
        for subscriber in self.subscribers {
            engine.add_subscriber(subscriber)?;
        }

        let engine = Arc::new(engine);
        let source = engine.bootstrap().await?;
        tracing::dispatcher::with_default(engine.dispatch(), || {
            tracing::info!(
                app_id = %config.app_id,
                namespace = %config.namespace,
                source = ?source,
                "apollo client ready"
            );
        });

        Ok(ApolloClient { config, engine })
    }
}

/// A client for one `(app, cluster, namespace)` on one meta server.
///
/// Reads are served from memory. Call [`ApolloClient::start_polling`] to
/// keep the namespace fresh in the background; polling stops when the
/// client is dropped.
pub struct ApolloClient {
    config: ClientConfig,
    engine: Arc<SyncEngine>,
}

impl ApolloClient {
    pub fn builder(config: ClientConfig) -> ClientBuilder {
        ClientBuilder::new(config)
    }

    /// Connect with the HTTP transport and the file snapshot store.
    pub async fn connect(config: ClientConfig) -> Result<Self> {
        ClientBuilder::new(config).connect().await
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The underlying sync engine.
    pub fn engine(&self) -> &Arc<SyncEngine> {
        &self.engine
    }

    fn resolve<'a>(&'a self, namespace: Option<&'a str>) -> &'a str {
        namespace.unwrap_or(&self.config.namespace)
    }

    // ────────────────────────────────────────────────────────────────────────
    // Reads
    // ────────────────────────────────────────────────────────────────────────

    /// Value of `key`, or `default` when the namespace or key is absent.
    /// `namespace = None` reads the client namespace.
    pub fn get_value(
        &self,
        key: &str,
        default: Option<&str>,
        namespace: Option<&str>,
    ) -> Option<String> {
        self.engine
            .value(self.resolve(namespace), key)
            .or_else(|| default.map(str::to_string))
    }

    /// Value of `key` in the client namespace.
    pub fn value(&self, key: &str) -> Option<String> {
        self.get_value(key, None, None)
    }

    /// Decode the value of `key` as JSON. Returns `default` when the key is
    /// absent or its value does not decode as `T`.
    pub fn get_json_value<T: DeserializeOwned>(
        &self,
        key: &str,
        default: T,
        namespace: Option<&str>,
    ) -> T {
        let namespace = self.resolve(namespace);
        let Some(raw) = self.engine.value(namespace, key) else {
            self.log_error(|| tracing::error!(namespace, key, "key not found"));
            return default;
        };
        match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(e) => {
                self.log_error(|| tracing::error!(namespace, key, "value is not valid JSON: {}", e));
                default
            }
        }
    }

    fn log_error(&self, log: impl FnOnce()) {
        tracing::dispatcher::with_default(self.engine.dispatch(), log);
    }

    /// A copy of the namespace's values with their change markers.
    pub fn namespace_config(&self, namespace: Option<&str>) -> Option<NamespaceConfig> {
        self.engine.namespace_config(self.resolve(namespace))
    }

    /// Names of all namespaces currently cached.
    pub fn namespaces(&self) -> Vec<String> {
        self.engine.cached_namespaces()
    }

    // ────────────────────────────────────────────────────────────────────────
    // Sync
    // ────────────────────────────────────────────────────────────────────────

    /// Re-sync the client namespace now.
    pub async fn sync(&self) -> SyncSource {
        self.engine.sync_namespace(&self.config.namespace).await
    }

    /// Re-sync any namespace of this app.
    pub async fn sync_namespace(&self, namespace: &str) -> SyncSource {
        self.engine.sync_namespace(namespace).await
    }

    /// Fetch the client namespace without touching the cache.
    pub async fn fetch_remote(
        &self,
        release_key: Option<&str>,
        messages: Option<&str>,
    ) -> apollo_config_sync::Result<RemoteConfigResponse> {
        self.engine
            .fetch_remote(&self.config.namespace, release_key, messages)
            .await
    }

    /// Load every local snapshot of this app into the cache.
    pub async fn restore_snapshots(&self) -> apollo_config_sync::Result<Vec<String>> {
        self.engine.restore_snapshots().await
    }

    // ────────────────────────────────────────────────────────────────────────
    // Subscribers
    // ────────────────────────────────────────────────────────────────────────

    /// Register a subscriber for the client namespace.
    pub fn add_subscriber(&self, subscriber: Subscriber) -> Result<()> {
        Ok(self.engine.add_subscriber(subscriber)?)
    }

    /// Notify every subscriber with the current configuration.
    pub fn notify(&self) -> NotifyReport {
        self.engine.notify()
    }

    // ────────────────────────────────────────────────────────────────────────
    // Polling
    // ────────────────────────────────────────────────────────────────────────

    /// Start long polling on the current tokio runtime. Returns false if it
    /// is already running or no runtime is available.
    pub fn start_polling(&self) -> bool {
        self.engine.start_polling()
    }

    pub fn stop_polling(&self) {
        self.engine.stop_polling();
    }

    pub fn is_polling(&self) -> bool {
        self.engine.is_polling()
    }

    /// Run one long-poll round in the foreground.
    pub async fn poll_once(&self) -> apollo_config_sync::Result<PollOutcome> {
        self.engine.poll_once().await
    }

    /// Base URL of the config server currently in use.
    pub fn active_endpoint(&self) -> Option<String> {
        self.engine.active_endpoint()
    }

    /// Last notification id seen for the namespace.
    pub fn notification_id(&self, namespace: Option<&str>) -> i64 {
        self.engine.notification_id(self.resolve(namespace))
    }
}

impl Drop for ApolloClient {
    fn drop(&mut self) {
        self.engine.stop_polling();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apollo_config_core::ConfigValue;
    use apollo_config_store::MemorySnapshotStore;
    use apollo_config_sync::{
        ConfigResponse, MemoryTransport, Response, ServiceInstance, SyncError, SERVICES_PATH,
    };
    use serde::Deserialize;
    use std::sync::Mutex;

    use crate::error::ClientError;

    const META: &str = "http://meta:8080";
    const SERVER: &str = "http://config:8080";

    fn transport_serving(pairs: &[(&str, &str)]) -> Arc<MemoryTransport> {
        let transport = Arc::new(MemoryTransport::new());
        let instances = vec![ServiceInstance {
            app_name: "APOLLO-CONFIGSERVICE".into(),
            instance_id: "config".into(),
            homepage_url: SERVER.into(),
        }];
        transport.respond(META, SERVICES_PATH, Response::with_json(200, &instances).unwrap());
        let body = ConfigResponse {
            app_id: None,
            cluster: None,
            namespace_name: None,
            configurations: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            release_key: Some("r1".into()),
        };
        transport.respond(
            SERVER,
            "configs/app/default/application",
            Response::with_json(200, &body).unwrap(),
        );
        transport
    }

    fn builder(transport: Arc<MemoryTransport>) -> ClientBuilder {
        ApolloClient::builder(ClientConfig::new(META, "app"))
            .transport(transport)
            .store(Arc::new(MemorySnapshotStore::new()))
            .dispatch(Dispatch::none())
    }

    #[tokio::test]
    async fn test_get_value() {
        let client = builder(transport_serving(&[("timeout", "30")]))
            .connect()
            .await
            .unwrap();

        assert_eq!(client.value("timeout").as_deref(), Some("30"));
        assert_eq!(client.get_value("missing", Some("dflt"), None).as_deref(), Some("dflt"));
        assert_eq!(client.get_value("missing", None, None), None);
        assert_eq!(
            client.get_value("timeout", Some("dflt"), Some("other")).as_deref(),
            Some("dflt")
        );
        assert_eq!(client.active_endpoint().as_deref(), Some(SERVER));
    }

    #[tokio::test]
    async fn test_get_json_value() {
        #[derive(Debug, Default, PartialEq, Deserialize)]
        struct Pool {
            size: u32,
            name: String,
        }

        let client = builder(transport_serving(&[
            ("pool", r#"{"size": 8, "name": "main"}"#),
            ("broken", "{not json"),
        ]))
        .connect()
        .await
        .unwrap();

        let pool: Pool = client.get_json_value("pool", Pool::default(), None);
        assert_eq!(pool, Pool { size: 8, name: "main".into() });

        let fallback = Pool { size: 1, name: "fallback".into() };
        let pool: Pool = client.get_json_value("broken", fallback, None);
        assert_eq!(pool.name, "fallback");

        let value: serde_json::Value =
            client.get_json_value("missing", serde_json::json!({}), None);
        assert_eq!(value, serde_json::json!({}));
    }

    #[tokio::test]
    async fn test_initial_subscribers_see_first_fetch() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let client = builder(transport_serving(&[("x", "1")]))
            .subscriber(Subscriber::from_fn("application", move |config| {
                sink.lock().unwrap().push(config.cloned());
                Ok(())
            }))
            .connect()
            .await
            .unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(
            seen[0].as_ref().unwrap()["x"],
            ConfigValue::changed("1")
        );
        drop(client);
    }

    #[tokio::test]
    async fn test_initial_subscriber_mismatch_fails_construction() {
        let transport = transport_serving(&[]);
        let result = builder(transport.clone())
            .subscriber(Subscriber::from_fn("other", |_| Ok(())))
            .connect()
            .await;

        assert!(matches!(
            result,
            Err(ClientError::Sync(SyncError::NamespaceMismatch { .. }))
        ));
        // Nothing was fetched.
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let result = ApolloClient::builder(ClientConfig::new("", "app"))
            .transport(transport_serving(&[]))
            .store(Arc::new(MemorySnapshotStore::new()))
            .connect()
            .await;
        assert!(matches!(result, Err(ClientError::Config(_))));
    }

    #[tokio::test]
    async fn test_discovery_failure_is_fatal() {
        let transport = Arc::new(MemoryTransport::new());
        let err = builder(transport).connect().await.err().unwrap();
        assert!(err.is_directory());
    }

    #[tokio::test]
    async fn test_drop_stops_polling() {
        let client = builder(transport_serving(&[])).connect().await.unwrap();
        let engine = Arc::clone(client.engine());

        assert!(client.start_polling());
        drop(client);
        assert!(!engine.is_polling());
    }
}
