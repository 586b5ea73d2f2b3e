//! Service discovery: which config server the client talks to.
//!
//! The meta server lists the config-service instances registered for an
//! app. The directory picks the first usable one and remembers it as the
//! active endpoint until a failover selects another.

use std::sync::{Arc, PoisonError, RwLock};

use crate::error::{Result, SyncError};
use crate::messages::{ServiceInstance, SERVICES_PATH};
use crate::transport::{Request, Transport};

/// Resolves config servers and tracks the active one.
pub struct ServerDirectory {
    meta_url: String,
    app_id: String,
    transport: Arc<dyn Transport>,
    active: RwLock<Option<String>>,
}

impl ServerDirectory {
    pub fn new(
        meta_url: impl Into<String>,
        app_id: impl Into<String>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            meta_url: meta_url.into(),
            app_id: app_id.into(),
            transport,
            active: RwLock::new(None),
        }
    }

    pub fn meta_url(&self) -> &str {
        &self.meta_url
    }

    /// Ask the meta server for the app's config-service instances.
    ///
    /// Fails with [`SyncError::Directory`] when the meta server is
    /// unreachable, answers with anything but 200, returns something that is
    /// not an instance list, or returns an empty list.
    pub async fn resolve_servers(&self) -> Result<Vec<ServiceInstance>> {
        let request = Request::get(SERVICES_PATH).with_query("appId", self.app_id.as_str());
        let response = self
            .transport
            .send(&self.meta_url, request)
            .await
            .map_err(|e| SyncError::Directory(format!("meta server unreachable: {}", e)))?;

        if response.status != 200 {
            return Err(SyncError::Directory(format!(
                "meta server returned status {}",
                response.status
            )));
        }

        let instances: Vec<ServiceInstance> = response
            .json()
            .map_err(|e| SyncError::Directory(format!("unreadable service list: {}", e)))?;
        if instances.is_empty() {
            return Err(SyncError::Directory(format!(
                "no config service registered for app {}",
                self.app_id
            )));
        }
        Ok(instances)
    }

    /// Resolve and activate the first server whose URL is not `exclude`.
    pub async fn select_active(&self, exclude: Option<&str>) -> Result<String> {
        let selected = self
            .resolve_servers()
            .await?
            .into_iter()
            .map(|instance| instance.homepage_url)
            .find(|url| Some(url.as_str()) != exclude)
            .ok_or_else(|| {
                SyncError::Directory(format!(
                    "no config service left after excluding {}",
                    exclude.unwrap_or_default()
                ))
            })?;

        *self.active.write().unwrap_or_else(PoisonError::into_inner) = Some(selected.clone());
        tracing::info!(endpoint = %selected, "active config server selected");
        Ok(selected)
    }

    /// The currently active server, if one has been selected.
    pub fn active(&self) -> Option<String> {
        self.active
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
