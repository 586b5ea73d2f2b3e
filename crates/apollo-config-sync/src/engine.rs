//! The sync engine: fetch-or-fallback, diff, notify, and long-poll.
//!
//! # Sync pass
//!
//! ```text
//! fetch configs/{app}/{cluster}/{namespace} from the active server
//!   200         → diff into cache, notify, persist if the release key moved
//!   other code  → install the local snapshot
//!   no response → install the local snapshot, fail over to another server
//! ```
//!
//! A sync pass never fails: the worst case is an empty namespace.
//!
//! # Long poll
//!
//! One background task repeatedly asks `notifications/v2` whether the
//! namespace moved past its last notification id. The server holds the
//! request until something changes (200) or its hold time elapses (304).

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use tracing::instrument::WithSubscriber;
use tracing::Dispatch;

use apollo_config_core::{
    parse_configurations, EffectiveConfig, NamespaceConfig, RawConfig, RemoteConfigResponse,
    NEVER_POLLED,
};
use apollo_config_store::SnapshotStore;

use crate::cache::{ConfigCache, UpdateReport};
use crate::directory::ServerDirectory;
use crate::error::{Result, SyncError, TransportError};
use crate::messages::{config_path, ConfigResponse, NotificationEntry, NOTIFICATIONS_PATH};
use crate::signing::now_millis;
use crate::subscriber::{NotifyReport, Subscriber, SubscriberRegistry};
use crate::transport::{Request, Transport};

/// Identity and timing of a sync engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    pub app_id: String,
    pub cluster: String,
    /// The namespace subscribers are bound to and the long poll watches.
    pub namespace: String,
    /// Pause between long-poll rounds.
    pub poll_interval: Duration,
    /// Client-side ceiling for a single long-poll request. This is the
    /// transport timeout itself, so it has to be longer than
    /// [`SERVER_HOLD_TIME`](crate::messages::SERVER_HOLD_TIME) or every quiet round ends as a timeout.
    pub hold_timeout: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            app_id: String::new(),
            cluster: "default".to_string(),
            namespace: "application".to_string(),
            poll_interval: Duration::from_secs(2),
            hold_timeout: Duration::from_secs(90),
        }
    }
}

impl SyncConfig {
    pub fn new(app_id: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            ..Self::default()
        }
    }
}

/// Where a sync pass got its data from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncSource {
    /// The config server answered 200 with this release.
    Remote { release_key: String },
    /// The local snapshot (possibly empty) was installed.
    Snapshot,
}

/// Result of one long-poll round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// The server's hold time elapsed with no change (304).
    NotModified,
    /// These namespaces changed and were re-fetched.
    Updated(Vec<String>),
}

/// Whether a poll loop should be running, and which one.
///
/// Both fields change together under one lock. `generation` is bumped on
/// every start and stop, and a loop keeps going only while the state is
/// running at the generation it was started with.
#[derive(Debug, Default)]
struct PollState {
    running: bool,
    generation: u64,
}

/// Keeps one client's namespaces in sync with the config servers.
pub struct SyncEngine {
    config: SyncConfig,
    transport: Arc<dyn Transport>,
    store: Arc<dyn SnapshotStore>,
    directory: ServerDirectory,
    cache: ConfigCache,
    subscribers: SubscriberRegistry,
    /// Release key of the last snapshot written, per namespace.
    persisted: Mutex<HashMap<String, String>>,
    /// Last notification id seen, per namespace.
    notifications: Mutex<HashMap<String, i64>>,
    poller: Mutex<PollState>,
    dispatch: Dispatch,
}

impl SyncEngine {
    /// Create an engine. Nothing is fetched until [`SyncEngine::bootstrap`].
    pub fn new(
        config: SyncConfig,
        meta_url: impl Into<String>,
        transport: Arc<dyn Transport>,
        store: Arc<dyn SnapshotStore>,
    ) -> Self {
        let directory = ServerDirectory::new(meta_url, config.app_id.clone(), transport.clone());
        let subscribers = SubscriberRegistry::new(config.namespace.clone());
        Self {
            config,
            transport,
            store,
            directory,
            cache: ConfigCache::new(),
            subscribers,
            persisted: Mutex::new(HashMap::new()),
            notifications: Mutex::new(HashMap::new()),
            poller: Mutex::new(PollState::default()),
            dispatch: tracing::dispatcher::get_default(|current| current.clone()),
        }
    }

    /// Route this engine's logs to `dispatch` instead of the dispatcher
    /// that was current at construction. `Dispatch::none()` silences it.
    pub fn with_dispatch(mut self, dispatch: Dispatch) -> Self {
        self.dispatch = dispatch;
        self
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// The dispatcher this engine logs to.
    pub fn dispatch(&self) -> &Dispatch {
        &self.dispatch
    }

    /// Select a config server, then run the first sync pass of the client
    /// namespace. Only service discovery can fail here.
    pub async fn bootstrap(&self) -> Result<SyncSource> {
        async {
            self.directory.select_active(None).await?;
            Ok::<_, SyncError>(self.sync_namespace_inner(&self.config.namespace).await)
        }
        .with_subscriber(self.dispatch.clone())
        .await
    }

    // ────────────────────────────────────────────────────────────────────────
    // Sync pass
    // ────────────────────────────────────────────────────────────────────────

    /// Bring `namespace` up to date from the active server, falling back to
    /// the local snapshot when that is not possible.
    pub async fn sync_namespace(&self, namespace: &str) -> SyncSource {
        self.sync_namespace_inner(namespace)
            .with_subscriber(self.dispatch.clone())
            .await
    }

    async fn sync_namespace_inner(&self, namespace: &str) -> SyncSource {
        match self.fetch_remote_inner(namespace, None, None).await {
            Ok(response) => {
                self.apply_update_inner(namespace, &response.config);
                self.persist_if_changed(namespace, &response).await;
                SyncSource::Remote {
                    release_key: response.release_key,
                }
            }
            Err(err) => {
                let unreachable = err.is_transport();
                if unreachable {
                    tracing::error!(namespace, "config server unusable, using local snapshot: {}", err);
                } else {
                    tracing::warn!(namespace, "remote fetch refused, using local snapshot: {}", err);
                }
                self.install_snapshot(namespace).await;
                if unreachable {
                    if let Err(e) = self.failover_inner().await {
                        tracing::error!("failover failed: {}", e);
                    }
                }
                SyncSource::Snapshot
            }
        }
    }

    /// Fetch `namespace` from the active server.
    ///
    /// `release_key` and `messages` are forwarded as query parameters when
    /// both are given. Anything but a 200 is an error here; the fallback
    /// decision belongs to [`SyncEngine::sync_namespace`].
    pub async fn fetch_remote(
        &self,
        namespace: &str,
        release_key: Option<&str>,
        messages: Option<&str>,
    ) -> Result<RemoteConfigResponse> {
        self.fetch_remote_inner(namespace, release_key, messages)
            .with_subscriber(self.dispatch.clone())
            .await
    }

    async fn fetch_remote_inner(
        &self,
        namespace: &str,
        release_key: Option<&str>,
        messages: Option<&str>,
    ) -> Result<RemoteConfigResponse> {
        let endpoint = self.directory.active().ok_or(SyncError::NoActiveServer)?;
        let path = config_path(&self.config.app_id, &self.config.cluster, namespace);

        let mut request = Request::get(path.as_str());
        if let (Some(release_key), Some(messages)) = (release_key, messages) {
            request = request
                .with_query("releasekey", release_key)
                .with_query("messages", messages);
        }

        let response = self.transport.send(&endpoint, request).await?;
        if response.status != 200 {
            return Err(SyncError::UnexpectedStatus {
                status: response.status,
                path,
            });
        }

        let body: ConfigResponse = response.json()?;
        let config = parse_configurations(namespace, &body.configurations)?;
        let release_key = body
            .release_key
            .unwrap_or_else(|| now_millis().to_string());

        tracing::debug!(namespace, release_key = %release_key, keys = config.len(), "fetched config");
        Ok(RemoteConfigResponse {
            release_key,
            config,
            raw: body.configurations,
        })
    }

    /// Diff `config` into the cache, then notify every subscriber.
    pub fn apply_update(&self, namespace: &str, config: &EffectiveConfig) -> UpdateReport {
        tracing::dispatcher::with_default(&self.dispatch, || {
            self.apply_update_inner(namespace, config)
        })
    }

    fn apply_update_inner(&self, namespace: &str, config: &EffectiveConfig) -> UpdateReport {
        let report = self.cache.apply(namespace, config);
        if report.has_changes() {
            tracing::info!(
                namespace,
                added = report.added.len(),
                modified = report.modified.len(),
                "configuration changed"
            );
        }
        self.notify_inner();
        report
    }

    /// Deliver the client namespace's current configuration to every
    /// subscriber, highest priority first.
    pub fn notify(&self) -> NotifyReport {
        tracing::dispatcher::with_default(&self.dispatch, || self.notify_inner())
    }

    fn notify_inner(&self) -> NotifyReport {
        let config = self
            .cache
            .namespace(&self.config.namespace)
            .unwrap_or_default();
        self.subscribers.notify(&config)
    }

    async fn persist_if_changed(&self, namespace: &str, response: &RemoteConfigResponse) {
        let already_written = lock(&self.persisted).get(namespace) == Some(&response.release_key);
        if already_written {
            tracing::debug!(namespace, "snapshot already at this release");
            return;
        }

        match self
            .store
            .save(&self.config.app_id, namespace, &response.raw)
            .await
        {
            Ok(()) => {
                lock(&self.persisted).insert(namespace.to_string(), response.release_key.clone());
            }
            Err(e) => tracing::warn!(namespace, "failed to write snapshot: {}", e),
        }
    }

    async fn install_snapshot(&self, namespace: &str) -> UpdateReport {
        let raw = match self.store.load(&self.config.app_id, namespace).await {
            Ok(raw) => raw,
            Err(e) if e.is_unreadable() => {
                tracing::warn!(namespace, "no usable snapshot: {}", e);
                RawConfig::new()
            }
            Err(e) => {
                tracing::error!(namespace, "snapshot read failed: {}", e);
                RawConfig::new()
            }
        };
        let config = parse_configurations(namespace, &raw).unwrap_or_else(|e| {
            tracing::warn!(namespace, "snapshot content unparsable: {}", e);
            EffectiveConfig::new()
        });
        tracing::info!(namespace, keys = config.len(), "installed local snapshot");
        self.cache.replace(namespace, &config)
    }

    /// Load every snapshot this app has on disk into the cache.
    ///
    /// Returns the restored namespaces. Subscribers are not notified.
    pub async fn restore_snapshots(&self) -> Result<Vec<String>> {
        async {
            let namespaces = self.store.namespaces(&self.config.app_id).await?;
            for namespace in &namespaces {
                self.install_snapshot(namespace).await;
            }
            Ok::<_, SyncError>(namespaces)
        }
        .with_subscriber(self.dispatch.clone())
        .await
    }

    // ────────────────────────────────────────────────────────────────────────
    // Failover
    // ────────────────────────────────────────────────────────────────────────

    /// Switch to a config server other than the active one.
    pub async fn failover(&self) -> Result<String> {
        self.failover_inner()
            .with_subscriber(self.dispatch.clone())
            .await
    }

    async fn failover_inner(&self) -> Result<String> {
        let current = self.directory.active();
        let selected = self.directory.select_active(current.as_deref()).await?;
        tracing::warn!(from = ?current, to = %selected, "failed over to another config server");
        Ok(selected)
    }

    pub fn active_endpoint(&self) -> Option<String> {
        self.directory.active()
    }

    // ────────────────────────────────────────────────────────────────────────
    // Long poll
    // ────────────────────────────────────────────────────────────────────────

    /// Run one long-poll round for the client namespace.
    pub async fn poll_once(&self) -> Result<PollOutcome> {
        self.poll_once_inner()
            .with_subscriber(self.dispatch.clone())
            .await
    }

    async fn poll_once_inner(&self) -> Result<PollOutcome> {
        let endpoint = self.directory.active().ok_or(SyncError::NoActiveServer)?;
        let namespace = &self.config.namespace;

        let watched = vec![NotificationEntry {
            namespace_name: namespace.clone(),
            notification_id: self.notification_id(namespace),
        }];
        let notifications =
            serde_json::to_string(&watched).map_err(|e| TransportError::Encode(e.to_string()))?;

        let request = Request::get(NOTIFICATIONS_PATH)
            .with_query("appId", self.config.app_id.as_str())
            .with_query("cluster", self.config.cluster.as_str())
            .with_query("notifications", notifications)
            .with_timeout(self.config.hold_timeout);

        let response = self.transport.send(&endpoint, request).await?;
        match response.status {
            304 => {
                tracing::debug!(namespace = %namespace, "no configuration change");
                Ok(PollOutcome::NotModified)
            }
            200 => {
                let changed: Vec<NotificationEntry> = response.json()?;
                let mut updated = Vec::with_capacity(changed.len());
                for entry in changed {
                    let ns = entry.namespace_name.as_str();
                    let remote = self.fetch_remote_inner(ns, None, None).await?;
                    self.apply_update_inner(ns, &remote.config);
                    self.persist_if_changed(ns, &remote).await;
                    lock(&self.notifications).insert(entry.namespace_name.clone(), entry.notification_id);
                    tracing::info!(
                        namespace = ns,
                        notification_id = entry.notification_id,
                        release_key = %remote.release_key,
                        "applied change notification"
                    );
                    updated.push(entry.namespace_name);
                }
                Ok(PollOutcome::Updated(updated))
            }
            status => Err(SyncError::UnexpectedStatus {
                status,
                path: NOTIFICATIONS_PATH.to_string(),
            }),
        }
    }

    /// Start the background long-poll loop on the current tokio runtime.
    /// Returns false if it is already running, or if there is no runtime
    /// to run it on.
    pub fn start_polling(self: &Arc<Self>) -> bool {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::dispatcher::with_default(&self.dispatch, || {
                tracing::warn!(
                    namespace = %self.config.namespace,
                    "long polling needs a tokio runtime; not started"
                );
            });
            return false;
        };

        let mut state = lock(&self.poller);
        if state.running {
            return false;
        }
        state.running = true;
        state.generation += 1;
        runtime.spawn(
            Self::run_polling(Arc::downgrade(self), state.generation)
                .with_subscriber(self.dispatch.clone()),
        );
        true
    }

    /// Ask the loop to exit. It finishes the request in flight first.
    pub fn stop_polling(&self) {
        let mut state = lock(&self.poller);
        if !state.running {
            return;
        }
        state.running = false;
        state.generation += 1;
        drop(state);
        tracing::dispatcher::with_default(&self.dispatch, || {
            tracing::info!(namespace = %self.config.namespace, "long polling stopped");
        });
    }

    pub fn is_polling(&self) -> bool {
        lock(&self.poller).running
    }

    fn is_current(&self, generation: u64) -> bool {
        let state = lock(&self.poller);
        state.running && state.generation == generation
    }

    /// Holds only a weak reference between rounds, so the loop also ends
    /// once the engine is dropped.
    async fn run_polling(engine: Weak<Self>, generation: u64) {
        tracing::info!(generation, "long polling started");
        loop {
            let Some(this) = engine.upgrade() else { break };
            if !this.is_current(generation) {
                break;
            }
            match this.poll_once_inner().await {
                Ok(outcome) => tracing::debug!(?outcome, "long poll finished"),
                Err(e) => {
                    tracing::warn!("long poll failed: {}", e);
                    if e.is_transport() {
                        if let Err(e) = this.failover_inner().await {
                            tracing::error!("failover failed: {}", e);
                        }
                    }
                }
            }
            if !this.is_current(generation) {
                break;
            }
            let interval = this.config.poll_interval;
            drop(this);
            tokio::time::sleep(interval).await;
        }
        tracing::debug!(generation, "long-poll loop exited");
    }

    /// Last notification id seen for `namespace`, or [`NEVER_POLLED`].
    pub fn notification_id(&self, namespace: &str) -> i64 {
        lock(&self.notifications)
            .get(namespace)
            .copied()
            .unwrap_or(NEVER_POLLED)
    }

    // ────────────────────────────────────────────────────────────────────────
    // Reads and subscriptions
    // ────────────────────────────────────────────────────────────────────────

    /// Current value of `key` in `namespace`.
    pub fn value(&self, namespace: &str, key: &str) -> Option<String> {
        self.cache.value(namespace, key)
    }

    /// A copy of `namespace`'s versioned values.
    pub fn namespace_config(&self, namespace: &str) -> Option<NamespaceConfig> {
        self.cache.namespace(namespace)
    }

    /// Names of all namespaces in the cache.
    pub fn cached_namespaces(&self) -> Vec<String> {
        self.cache.namespaces()
    }

    /// Register a subscriber for the client namespace.
    pub fn add_subscriber(&self, subscriber: Subscriber) -> Result<()> {
        tracing::dispatcher::with_default(&self.dispatch, || self.subscribers.add(subscriber))
    }

    /// Fail unless `subscriber` could be registered.
    pub fn check_subscriber(&self, subscriber: &Subscriber) -> Result<()> {
        self.subscribers.check(subscriber)
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{ServiceInstance, SERVICES_PATH};
    use crate::subscriber::SinkResult;
    use crate::transport::memory::MemoryTransport;
    use crate::transport::Response;
    use apollo_config_core::ConfigValue;
    use apollo_config_store::MemorySnapshotStore;

    const META: &str = "http://meta:8080";
    const SERVER_A: &str = "http://config-a:8080/";
    const SERVER_B: &str = "http://config-b:8080/";
    const APP: &str = "app";
    const CONFIG_PATH: &str = "configs/app/default/application";

    fn raw(pairs: &[(&str, &str)]) -> RawConfig {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn config_body(pairs: &[(&str, &str)], release_key: Option<&str>) -> Response {
        let body = ConfigResponse {
            app_id: Some(APP.into()),
            cluster: Some("default".into()),
            namespace_name: Some("application".into()),
            configurations: raw(pairs),
            release_key: release_key.map(str::to_string),
        };
        Response::with_json(200, &body).unwrap()
    }

    fn services(urls: &[&str]) -> Response {
        let instances: Vec<ServiceInstance> = urls
            .iter()
            .map(|url| ServiceInstance {
                app_name: "APOLLO-CONFIGSERVICE".into(),
                instance_id: url.to_string(),
                homepage_url: url.to_string(),
            })
            .collect();
        Response::with_json(200, &instances).unwrap()
    }

    fn notifications(namespace: &str, id: i64) -> Response {
        Response::with_json(
            200,
            &vec![NotificationEntry {
                namespace_name: namespace.into(),
                notification_id: id,
            }],
        )
        .unwrap()
    }

    struct Harness {
        transport: Arc<MemoryTransport>,
        store: Arc<MemorySnapshotStore>,
        engine: Arc<SyncEngine>,
    }

    fn harness_with(config: SyncConfig, store: MemorySnapshotStore) -> Harness {
        let transport = Arc::new(MemoryTransport::new());
        transport.respond(META, SERVICES_PATH, services(&[SERVER_A, SERVER_B]));
        let store = Arc::new(store);
        let engine = Arc::new(
            SyncEngine::new(config, META, transport.clone(), store.clone())
                .with_dispatch(Dispatch::none()),
        );
        Harness {
            transport,
            store,
            engine,
        }
    }

    fn harness() -> Harness {
        harness_with(SyncConfig::new(APP), MemorySnapshotStore::new())
    }

    /// Counts notifications and remembers the last delivered config.
    fn recording(engine: &SyncEngine) -> Arc<Mutex<Vec<NamespaceConfig>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        engine
            .add_subscriber(Subscriber::from_fn("application", move |config| -> SinkResult {
                sink.lock().unwrap().push(config.cloned().unwrap_or_default());
                Ok(())
            }))
            .unwrap();
        seen
    }

    #[tokio::test]
    async fn test_bootstrap_fetches_from_first_server() {
        let h = harness();
        h.transport
            .respond(SERVER_A, CONFIG_PATH, config_body(&[("x", "1")], Some("r1")));

        let source = h.engine.bootstrap().await.unwrap();

        assert_eq!(source, SyncSource::Remote { release_key: "r1".into() });
        assert_eq!(h.engine.active_endpoint().as_deref(), Some(SERVER_A));
        assert_eq!(h.engine.value("application", "x").as_deref(), Some("1"));
        assert_eq!(h.store.load(APP, "application").await.unwrap(), raw(&[("x", "1")]));
    }

    #[tokio::test]
    async fn test_bootstrap_fails_without_discovery() {
        let h = harness();
        h.transport.clear(META, SERVICES_PATH);
        h.transport.respond(META, SERVICES_PATH, services(&[]));

        let err = h.engine.bootstrap().await.unwrap_err();
        assert!(matches!(err, SyncError::Directory(_)));
    }

    #[tokio::test]
    async fn test_update_then_change_notifies_with_diff() {
        let h = harness();
        let seen = recording(&h.engine);
        h.transport
            .respond(SERVER_A, CONFIG_PATH, config_body(&[("x", "1")], Some("r1")));
        h.engine.bootstrap().await.unwrap();

        h.transport.clear(SERVER_A, CONFIG_PATH);
        h.transport
            .respond(SERVER_A, CONFIG_PATH, config_body(&[("x", "2")], Some("r2")));
        h.engine.sync_namespace("application").await;

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1]["x"], ConfigValue::changed("2"));
    }

    #[tokio::test]
    async fn test_resync_is_idempotent() {
        let h = harness();
        let seen = recording(&h.engine);
        h.transport
            .respond(SERVER_A, CONFIG_PATH, config_body(&[("x", "1"), ("y", "2")], Some("r1")));
        h.engine.bootstrap().await.unwrap();
        h.engine.sync_namespace("application").await;

        let ns = h.engine.namespace_config("application").unwrap();
        assert!(ns.values().all(|v| !v.changed));
        // Subscribers hear about every pass, changed or not.
        assert_eq!(seen.lock().unwrap().len(), 2);
        // Same release key, one write.
        assert_eq!(h.store.save_count(), 1);
    }

    #[tokio::test]
    async fn test_new_release_key_rewrites_snapshot() {
        let h = harness();
        h.transport
            .respond(SERVER_A, CONFIG_PATH, config_body(&[("x", "1")], Some("r1")));
        h.engine.bootstrap().await.unwrap();

        h.transport.clear(SERVER_A, CONFIG_PATH);
        h.transport
            .respond(SERVER_A, CONFIG_PATH, config_body(&[("x", "1")], Some("r2")));
        h.engine.sync_namespace("application").await;

        assert_eq!(h.store.save_count(), 2);
    }

    #[tokio::test]
    async fn test_missing_release_key_is_synthesized() {
        let h = harness();
        h.transport
            .respond(SERVER_A, CONFIG_PATH, config_body(&[("x", "1")], None));
        h.engine.bootstrap().await.unwrap();

        let response = h.engine.fetch_remote("application", None, None).await.unwrap();
        assert!(response.release_key.parse::<i64>().unwrap() > 0);
    }

    #[tokio::test]
    async fn test_fetch_forwards_release_key_and_messages() {
        let h = harness();
        h.transport
            .respond(SERVER_A, CONFIG_PATH, config_body(&[], Some("r1")));
        h.engine.bootstrap().await.unwrap();

        h.engine
            .fetch_remote("application", Some("r0"), Some("{}"))
            .await
            .unwrap();
        h.engine
            .fetch_remote("application", Some("r0"), None)
            .await
            .unwrap();

        let sent = h.transport.requests_to(CONFIG_PATH);
        assert_eq!(sent[1].request.query_param("releasekey"), Some("r0"));
        assert_eq!(sent[1].request.query_param("messages"), Some("{}"));
        assert!(sent[2].request.query.is_empty());
    }

    #[tokio::test]
    async fn test_non_200_falls_back_without_failover() {
        let store = MemorySnapshotStore::new().with_snapshot(APP, "application", raw(&[("x", "local")]));
        let h = harness_with(SyncConfig::new(APP), store);
        h.transport.respond(SERVER_A, CONFIG_PATH, Response::empty(500));

        let source = h.engine.bootstrap().await.unwrap();

        assert_eq!(source, SyncSource::Snapshot);
        assert_eq!(h.engine.value("application", "x").as_deref(), Some("local"));
        assert_eq!(h.engine.active_endpoint().as_deref(), Some(SERVER_A));
        assert_eq!(h.store.save_count(), 0);
    }

    #[tokio::test]
    async fn test_transport_failure_falls_back_and_fails_over() {
        let store = MemorySnapshotStore::new().with_snapshot(APP, "application", raw(&[("x", "local")]));
        let h = harness_with(SyncConfig::new(APP), store);
        h.transport.fail(
            SERVER_A,
            CONFIG_PATH,
            TransportError::Request("connection refused".into()),
        );
        h.transport
            .respond(SERVER_B, CONFIG_PATH, config_body(&[("x", "remote")], Some("r1")));

        let source = h.engine.bootstrap().await.unwrap();
        assert_eq!(source, SyncSource::Snapshot);
        assert_eq!(h.engine.value("application", "x").as_deref(), Some("local"));
        assert_eq!(h.engine.active_endpoint().as_deref(), Some(SERVER_B));

        let source = h.engine.sync_namespace("application").await;
        assert_eq!(source, SyncSource::Remote { release_key: "r1".into() });
        assert_eq!(h.engine.value("application", "x").as_deref(), Some("remote"));
    }

    #[tokio::test]
    async fn test_fallback_without_snapshot_is_empty() {
        let h = harness();
        h.transport.respond(SERVER_A, CONFIG_PATH, Response::empty(404));

        assert_eq!(h.engine.bootstrap().await.unwrap(), SyncSource::Snapshot);
        assert_eq!(
            h.engine.namespace_config("application"),
            Some(NamespaceConfig::new())
        );
    }

    #[tokio::test]
    async fn test_malformed_body_counts_as_transport_failure() {
        let h = harness();
        h.transport
            .respond(SERVER_A, CONFIG_PATH, Response::new(200, "<html>oops</html>"));

        assert_eq!(h.engine.bootstrap().await.unwrap(), SyncSource::Snapshot);
        assert_eq!(h.engine.active_endpoint().as_deref(), Some(SERVER_B));
    }

    #[tokio::test]
    async fn test_remote_deletions_are_not_propagated() {
        let h = harness();
        h.transport
            .respond(SERVER_A, CONFIG_PATH, config_body(&[("x", "1"), ("y", "2")], Some("r1")));
        h.engine.bootstrap().await.unwrap();

        h.transport.clear(SERVER_A, CONFIG_PATH);
        h.transport
            .respond(SERVER_A, CONFIG_PATH, config_body(&[("x", "1")], Some("r2")));
        h.engine.sync_namespace("application").await;

        assert_eq!(h.engine.value("application", "y").as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn test_structured_namespace() {
        let mut config = SyncConfig::new(APP);
        config.namespace = "dev.yml".into();
        let h = harness_with(config, MemorySnapshotStore::new());
        h.transport.respond(
            SERVER_A,
            "configs/app/default/dev.yml",
            config_body(&[("content", "log_level: INFO\nport: 8080\n")], Some("r1")),
        );

        h.engine.bootstrap().await.unwrap();

        assert_eq!(h.engine.value("dev.yml", "log_level").as_deref(), Some("INFO"));
        assert_eq!(h.engine.value("dev.yml", "port").as_deref(), Some("8080"));
        // The snapshot keeps the raw document.
        let snapshot = h.store.load(APP, "dev.yml").await.unwrap();
        assert!(snapshot.contains_key("content"));
    }

    #[tokio::test]
    async fn test_restore_snapshots() {
        let store = MemorySnapshotStore::new()
            .with_snapshot(APP, "application", raw(&[("x", "1")]))
            .with_snapshot(APP, "dev.yml", raw(&[("content", "a: b\n")]))
            .with_snapshot("other", "application", raw(&[("x", "nope")]));
        let h = harness_with(SyncConfig::new(APP), store);
        let seen = recording(&h.engine);

        let restored = h.engine.restore_snapshots().await.unwrap();

        assert_eq!(restored, vec!["application", "dev.yml"]);
        assert_eq!(h.engine.value("application", "x").as_deref(), Some("1"));
        assert_eq!(h.engine.value("dev.yml", "a").as_deref(), Some("b"));
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_subscriber_namespace_mismatch() {
        let h = harness();
        let err = h
            .engine
            .add_subscriber(Subscriber::from_fn("other", |_| Ok(())))
            .unwrap_err();
        assert!(matches!(err, SyncError::NamespaceMismatch { .. }));
        assert_eq!(h.engine.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_poll_not_modified() {
        let h = harness();
        h.transport
            .respond(SERVER_A, CONFIG_PATH, config_body(&[("x", "1")], Some("r1")));
        h.transport.respond(SERVER_A, NOTIFICATIONS_PATH, Response::empty(304));
        h.engine.bootstrap().await.unwrap();

        assert_eq!(h.engine.poll_once().await.unwrap(), PollOutcome::NotModified);
        assert_eq!(h.engine.notification_id("application"), NEVER_POLLED);

        let sent = h.transport.requests_to(NOTIFICATIONS_PATH);
        let request = &sent[0].request;
        assert_eq!(request.query_param("appId"), Some(APP));
        assert_eq!(request.query_param("cluster"), Some("default"));
        assert_eq!(
            request.query_param("notifications"),
            Some(r#"[{"namespaceName":"application","notificationId":-1}]"#)
        );
        assert_eq!(request.timeout, Some(Duration::from_secs(90)));
        assert!(request.timeout > Some(crate::messages::SERVER_HOLD_TIME));
    }

    #[tokio::test]
    async fn test_poll_change_refetches_and_records_id() {
        let h = harness();
        let seen = recording(&h.engine);
        h.transport
            .respond(SERVER_A, CONFIG_PATH, config_body(&[("x", "1")], Some("r1")));
        h.engine.bootstrap().await.unwrap();

        h.transport.clear(SERVER_A, CONFIG_PATH);
        h.transport
            .respond(SERVER_A, CONFIG_PATH, config_body(&[("x", "2")], Some("r2")));
        h.transport
            .respond(SERVER_A, NOTIFICATIONS_PATH, notifications("application", 42));
        h.transport.respond(SERVER_A, NOTIFICATIONS_PATH, Response::empty(304));

        let outcome = h.engine.poll_once().await.unwrap();
        assert_eq!(outcome, PollOutcome::Updated(vec!["application".into()]));
        assert_eq!(h.engine.notification_id("application"), 42);
        assert_eq!(h.engine.value("application", "x").as_deref(), Some("2"));
        assert_eq!(seen.lock().unwrap().last().unwrap()["x"], ConfigValue::changed("2"));
        assert_eq!(h.store.save_count(), 2);

        // The next round reports the recorded id.
        h.engine.poll_once().await.unwrap();
        let sent = h.transport.requests_to(NOTIFICATIONS_PATH);
        assert_eq!(
            sent[1].request.query_param("notifications"),
            Some(r#"[{"namespaceName":"application","notificationId":42}]"#)
        );
    }

    #[tokio::test]
    async fn test_poll_unexpected_status() {
        let h = harness();
        h.transport.respond(SERVER_A, CONFIG_PATH, config_body(&[], Some("r1")));
        h.transport.respond(SERVER_A, NOTIFICATIONS_PATH, Response::empty(500));
        h.engine.bootstrap().await.unwrap();

        let err = h.engine.poll_once().await.unwrap_err();
        assert!(matches!(err, SyncError::UnexpectedStatus { status: 500, .. }));
        assert!(!err.is_transport());
    }

    #[tokio::test]
    async fn test_poll_without_server() {
        let h = harness();
        let err = h.engine.poll_once().await.unwrap_err();
        assert!(matches!(err, SyncError::NoActiveServer));
    }

    #[tokio::test]
    async fn test_polling_loop_applies_changes() {
        let mut config = SyncConfig::new(APP);
        config.poll_interval = Duration::from_millis(10);
        let h = harness_with(config, MemorySnapshotStore::new());
        h.transport
            .respond(SERVER_A, CONFIG_PATH, config_body(&[("x", "1")], Some("r1")));
        h.engine.bootstrap().await.unwrap();

        h.transport.clear(SERVER_A, CONFIG_PATH);
        h.transport
            .respond(SERVER_A, CONFIG_PATH, config_body(&[("x", "2")], Some("r2")));
        h.transport
            .respond(SERVER_A, NOTIFICATIONS_PATH, notifications("application", 7));
        h.transport.respond(SERVER_A, NOTIFICATIONS_PATH, Response::empty(304));

        assert!(h.engine.start_polling());
        assert!(!h.engine.start_polling());
        assert!(h.engine.is_polling());

        let mut waited = 0;
        while h.engine.notification_id("application") != 7 && waited < 200 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            waited += 1;
        }
        assert_eq!(h.engine.value("application", "x").as_deref(), Some("2"));

        h.engine.stop_polling();
        assert!(!h.engine.is_polling());

        // A stopped loop sends no more requests.
        tokio::time::sleep(Duration::from_millis(50)).await;
        let before = h.transport.requests_to(NOTIFICATIONS_PATH).len();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(h.transport.requests_to(NOTIFICATIONS_PATH).len(), before);

        // And it can be started again.
        assert!(h.engine.start_polling());
        h.engine.stop_polling();
    }

    #[tokio::test]
    async fn test_polling_loop_fails_over() {
        let mut config = SyncConfig::new(APP);
        config.poll_interval = Duration::from_millis(10);
        let h = harness_with(config, MemorySnapshotStore::new());
        h.transport.respond(SERVER_A, CONFIG_PATH, config_body(&[], Some("r1")));
        h.transport.fail(
            SERVER_A,
            NOTIFICATIONS_PATH,
            TransportError::Timeout("hold exceeded".into()),
        );
        h.transport.respond(SERVER_B, NOTIFICATIONS_PATH, Response::empty(304));
        h.engine.bootstrap().await.unwrap();

        h.engine.start_polling();
        let mut waited = 0;
        let reached_b = || {
            h.transport
                .requests_to(NOTIFICATIONS_PATH)
                .iter()
                .any(|r| r.base_url == SERVER_B)
        };
        while !reached_b() && waited < 200 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            waited += 1;
        }
        h.engine.stop_polling();

        assert_eq!(h.engine.active_endpoint().as_deref(), Some(SERVER_B));
    }

    #[test]
    fn test_start_polling_outside_runtime() {
        let h = harness();
        assert!(!h.engine.start_polling());
        assert!(!h.engine.is_polling());
        h.engine.stop_polling();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_start_stop_keeps_a_live_loop() {
        let mut config = SyncConfig::new(APP);
        config.poll_interval = Duration::from_millis(5);
        let h = harness_with(config, MemorySnapshotStore::new());
        h.transport.respond(SERVER_A, CONFIG_PATH, config_body(&[], Some("r1")));
        h.transport.respond(SERVER_A, NOTIFICATIONS_PATH, Response::empty(304));
        h.engine.bootstrap().await.unwrap();
        h.engine.start_polling();

        // Every task ends on a start, so polling must be on afterwards.
        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let engine = Arc::clone(&h.engine);
                tokio::spawn(async move {
                    for _ in 0..200 {
                        engine.stop_polling();
                        tokio::task::yield_now().await;
                        engine.start_polling();
                    }
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }
        assert!(h.engine.is_polling());
        assert!(!h.engine.start_polling());

        let polls = || h.transport.requests_to(NOTIFICATIONS_PATH).len();
        let before = polls();
        let mut waited = 0;
        while polls() == before && waited < 200 {
            tokio::time::sleep(Duration::from_millis(5)).await;
            waited += 1;
        }
        assert!(polls() > before, "no poll loop is running");

        // Stopping leaves nothing behind.
        h.engine.stop_polling();
        tokio::time::sleep(Duration::from_millis(50)).await;
        let after_stop = polls();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(polls(), after_stop);
    }
}
