//! One client per identity.
//!
//! Callers asking for a client with the same [`ClientKey`] share one
//! instance. Each key gets its own once-cell, so two concurrent requests
//! for a new key still build only one client, while clients for other
//! keys are looked up and built independently.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use tokio::sync::{Mutex, OnceCell};

use crate::client::{ApolloClient, ClientBuilder};
use crate::config::{ClientConfig, ClientKey};
use crate::error::Result;

type Slot = Arc<OnceCell<Arc<ApolloClient>>>;

/// Maps client identities to their shared instances.
#[derive(Default)]
pub struct ClientRegistry {
    /// Only held to find or insert a slot, never across a connect.
    clients: Mutex<HashMap<ClientKey, Slot>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry.
    pub fn global() -> &'static ClientRegistry {
        static GLOBAL: OnceLock<ClientRegistry> = OnceLock::new();
        GLOBAL.get_or_init(ClientRegistry::new)
    }

    /// The client for `config`, connecting it with the default transport and
    /// store if none exists yet.
    pub async fn get_or_connect(&self, config: ClientConfig) -> Result<Arc<ApolloClient>> {
        self.get_or_connect_with(ClientBuilder::new(config)).await
    }

    /// Like [`ClientRegistry::get_or_connect`], connecting through `builder`.
    ///
    /// When a client with the builder's key already exists the builder is
    /// dropped unused, including any subscribers it carries. A failed
    /// connect leaves nothing behind, so the next caller tries again.
    pub async fn get_or_connect_with(&self, builder: ClientBuilder) -> Result<Arc<ApolloClient>> {
        let key = builder.config().key();
        let slot = {
            let mut clients = self.clients.lock().await;
            Arc::clone(clients.entry(key.clone()).or_default())
        };

        let result = slot
            .get_or_try_init(|| async move { builder.connect().await.map(Arc::new) })
            .await
            .map(Arc::clone);

        if result.is_err() {
            self.discard_if_unused(&key, &slot).await;
        }
        result
    }

    /// Drop an empty slot nobody else is waiting on.
    async fn discard_if_unused(&self, key: &ClientKey, slot: &Slot) {
        let mut clients = self.clients.lock().await;
        let unused = clients.get(key).is_some_and(|current| {
            Arc::ptr_eq(current, slot) && !slot.initialized() && Arc::strong_count(slot) == 2
        });
        if unused {
            clients.remove(key);
        }
    }

    pub async fn get(&self, key: &ClientKey) -> Option<Arc<ApolloClient>> {
        self.clients.lock().await.get(key)?.get().cloned()
    }

    /// Forget a client. It keeps running until its last handle is dropped.
    pub async fn remove(&self, key: &ClientKey) -> Option<Arc<ApolloClient>> {
        self.clients.lock().await.remove(key)?.get().cloned()
    }

    /// Number of connected clients. Keys still connecting are not counted.
    pub async fn len(&self) -> usize {
        self.clients
            .lock()
            .await
            .values()
            .filter(|slot| slot.initialized())
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
