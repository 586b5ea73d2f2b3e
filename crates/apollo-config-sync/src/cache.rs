//! In-memory configuration cache with per-key change tracking.
//!
//! Every update pass recomputes the `changed` marker of each key in the
//! namespace. A namespace is updated under one write lock, so readers see
//! either the whole previous pass or the whole new one.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use apollo_config_core::{ConfigValue, EffectiveConfig, NamespaceConfig};

/// Outcome of one update pass over a namespace.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateReport {
    /// Keys that did not exist before this pass.
    pub added: Vec<String>,
    /// Keys whose value differs from the previous pass.
    pub modified: Vec<String>,
    /// Number of keys confirmed unchanged.
    pub unchanged: usize,
}

impl UpdateReport {
    pub fn has_changes(&self) -> bool {
        !self.added.is_empty() || !self.modified.is_empty()
    }
}

/// Namespace name to that namespace's versioned values.
#[derive(Debug, Default)]
pub struct ConfigCache {
    namespaces: RwLock<HashMap<String, NamespaceConfig>>,
}

impl ConfigCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge an authoritative remote map into the namespace.
    ///
    /// Keys absent from `remote` are kept with `changed = false`; remote
    /// deletions are not propagated.
    pub fn apply(&self, namespace: &str, remote: &EffectiveConfig) -> UpdateReport {
        let mut namespaces = self.namespaces.write().unwrap_or_else(PoisonError::into_inner);
        let current = namespaces.entry(namespace.to_string()).or_default();
        let mut report = UpdateReport::default();

        for entry in current.values_mut() {
            entry.changed = false;
        }

        for (key, value) in remote {
            match current.get_mut(key) {
                Some(existing) if existing.value == *value => {
                    report.unchanged += 1;
                }
                Some(existing) => {
                    tracing::debug!(
                        namespace,
                        key = %key,
                        old = %existing.value,
                        new = %value,
                        "config value changed"
                    );
                    *existing = ConfigValue::changed(value.as_str());
                    report.modified.push(key.clone());
                }
                None => {
                    tracing::debug!(namespace, key = %key, value = %value, "config key added");
                    current.insert(key.clone(), ConfigValue::changed(value.as_str()));
                    report.added.push(key.clone());
                }
            }
        }

        report
    }

    /// Install `config` as the namespace's entire content.
    ///
    /// Used for snapshot fallback, where there is no authoritative remote
    /// map to merge against. `changed` is still computed against whatever
    /// was cached before.
    pub fn replace(&self, namespace: &str, config: &EffectiveConfig) -> UpdateReport {
        let mut namespaces = self.namespaces.write().unwrap_or_else(PoisonError::into_inner);
        let previous = namespaces.remove(namespace).unwrap_or_default();
        let mut report = UpdateReport::default();

        let next: NamespaceConfig = config
            .iter()
            .map(|(key, value)| {
                let entry = match previous.get(key) {
                    Some(old) if old.value == *value => {
                        report.unchanged += 1;
                        ConfigValue::unchanged(value.as_str())
                    }
                    Some(_) => {
                        report.modified.push(key.clone());
                        ConfigValue::changed(value.as_str())
                    }
                    None => {
                        report.added.push(key.clone());
                        ConfigValue::changed(value.as_str())
                    }
                };
                (key.clone(), entry)
            })
            .collect();

        namespaces.insert(namespace.to_string(), next);
        report
    }

    /// Current value of `key` in `namespace`.
    pub fn value(&self, namespace: &str, key: &str) -> Option<String> {
        self.namespaces
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(namespace)
            .and_then(|ns| ns.get(key))
            .map(|entry| entry.value.clone())
    }

    /// A copy of the namespace's versioned values.
    pub fn namespace(&self, namespace: &str) -> Option<NamespaceConfig> {
        self.namespaces
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(namespace)
            .cloned()
    }

    /// Names of all cached namespaces, sorted.
    pub fn namespaces(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .namespaces
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}
