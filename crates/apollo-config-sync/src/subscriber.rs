//! Change subscribers and their dispatch order.
//!
//! Subscribers are notified synchronously, highest priority first, with
//! registration order breaking ties. A subscriber that fails or panics is
//! logged and skipped; the rest still run.

use std::error::Error as StdError;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock};

use apollo_config_core::NamespaceConfig;

use crate::error::{Result, SyncError};

/// What a subscriber callback returns.
pub type SinkResult = std::result::Result<(), Box<dyn StdError + Send + Sync>>;

/// Receives the namespace's configuration after every update pass.
pub trait NotificationSink: Send + Sync {
    /// `config` is `None` for namespace-less subscribers.
    fn on_update(&self, config: Option<&NamespaceConfig>) -> SinkResult;
}

/// Adapts a closure into a [`NotificationSink`].
pub struct FnSink<F>(F);

impl<F> NotificationSink for FnSink<F>
where
    F: Fn(Option<&NamespaceConfig>) -> SinkResult + Send + Sync,
{
    fn on_update(&self, config: Option<&NamespaceConfig>) -> SinkResult {
        (self.0)(config)
    }
}

/// A registered callback with its dispatch priority.
#[derive(Clone)]
pub struct Subscriber {
    sink: Arc<dyn NotificationSink>,
    priority: i32,
    namespace: Option<String>,
}

impl Subscriber {
    /// A subscriber for `namespace` with priority 0.
    pub fn new(namespace: impl Into<String>, sink: impl NotificationSink + 'static) -> Self {
        Self {
            sink: Arc::new(sink),
            priority: 0,
            namespace: Some(namespace.into()),
        }
    }

    /// A subscriber for `namespace` backed by a closure.
    pub fn from_fn<F>(namespace: impl Into<String>, f: F) -> Self
    where
        F: Fn(Option<&NamespaceConfig>) -> SinkResult + Send + Sync + 'static,
    {
        Self::new(namespace, FnSink(f))
    }

    /// A namespace-less subscriber. It is told that an update happened but
    /// receives no configuration.
    pub fn detached(sink: impl NotificationSink + 'static) -> Self {
        Self {
            sink: Arc::new(sink),
            priority: 0,
            namespace: None,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }
}

impl fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriber")
            .field("priority", &self.priority)
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

/// Counts from one notification round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NotifyReport {
    pub delivered: usize,
    pub failed: usize,
}

/// The subscribers of one client namespace.
#[derive(Debug)]
pub struct SubscriberRegistry {
    namespace: String,
    subscribers: RwLock<Vec<Subscriber>>,
}

impl SubscriberRegistry {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            subscribers: RwLock::new(Vec::new()),
        }
    }

    /// Fail unless `subscriber` may be registered here.
    pub fn check(&self, subscriber: &Subscriber) -> Result<()> {
        match subscriber.namespace() {
            Some(ns) if ns != self.namespace => Err(SyncError::NamespaceMismatch {
                subscriber: ns.to_string(),
                client: self.namespace.clone(),
            }),
            _ => Ok(()),
        }
    }

    /// Register a subscriber. On error the registry is unchanged.
    pub fn add(&self, subscriber: Subscriber) -> Result<()> {
        self.check(&subscriber)?;
        tracing::debug!(
            namespace = ?subscriber.namespace(),
            priority = subscriber.priority(),
            "subscriber registered"
        );
        self.subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(subscriber);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Subscribers in dispatch order: priority descending, stable.
    pub fn ordered(&self) -> Vec<Subscriber> {
        let mut subscribers = self
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        subscribers.sort_by(|a, b| b.priority.cmp(&a.priority));
        subscribers
    }

    /// Deliver `config` to every subscriber.
    ///
    /// Works on a snapshot of the registry, so callbacks may register more
    /// subscribers; those are first notified on the next round.
    pub fn notify(&self, config: &NamespaceConfig) -> NotifyReport {
        let mut report = NotifyReport::default();

        for subscriber in self.ordered() {
            let payload = subscriber.namespace.as_ref().map(|_| config);
            match catch_unwind(AssertUnwindSafe(|| subscriber.sink.on_update(payload))) {
                Ok(Ok(())) => report.delivered += 1,
                Ok(Err(e)) => {
                    tracing::warn!(priority = subscriber.priority, "subscriber failed: {}", e);
                    report.failed += 1;
                }
                Err(_) => {
                    tracing::error!(priority = subscriber.priority, "subscriber panicked");
                    report.failed += 1;
                }
            }
        }

        report
    }
}
