//! Wire messages exchanged with the meta server and config servers.
//!
//! All bodies are JSON with camelCase field names. Unknown fields are
//! ignored so newer servers stay compatible.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use apollo_config_core::RawConfig;

/// Meta-server endpoint listing the config-service instances for an app.
pub const SERVICES_PATH: &str = "services/config";

/// Config-server long-poll endpoint.
pub const NOTIFICATIONS_PATH: &str = "notifications/v2";

/// How long a config server holds a long poll before answering 304.
/// A client's long-poll timeout has to be longer than this.
pub const SERVER_HOLD_TIME: Duration = Duration::from_secs(60);

/// Path of the fetch endpoint for one namespace.
pub fn config_path(app_id: &str, cluster: &str, namespace: &str) -> String {
    format!("configs/{}/{}/{}", app_id, cluster, namespace)
}

/// One config-service instance as reported by service discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceInstance {
    #[serde(default)]
    pub app_name: String,
    #[serde(default)]
    pub instance_id: String,
    /// Base URL requests for this instance are sent to.
    pub homepage_url: String,
}

/// Body of a successful namespace fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace_name: Option<String>,
    #[serde(default)]
    pub configurations: RawConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_key: Option<String>,
}

/// A namespace and the last notification id the client has seen for it.
///
/// Sent as the `notifications` query parameter of a long poll, and returned
/// by the server for every namespace that changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationEntry {
    pub namespace_name: String,
    pub notification_id: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_path() {
        assert_eq!(
            config_path("my-app", "default", "dev.yml"),
            "configs/my-app/default/dev.yml"
        );
    }

    #[test]
    fn test_service_instance_decode() {
        let body = r#"[{
            "appName": "APOLLO-CONFIGSERVICE",
            "instanceId": "host:apollo-configservice:8080",
            "homepageUrl": "http://10.0.0.1:8080/",
            "port": 8080
        }]"#;
        let instances: Vec<ServiceInstance> = serde_json::from_str(body).unwrap();
        assert_eq!(instances.len(), 1);
        assert_eq!(instances[0].homepage_url, "http://10.0.0.1:8080/");
        assert_eq!(instances[0].app_name, "APOLLO-CONFIGSERVICE");
    }

    #[test]
    fn test_config_response_decode() {
        let body = r#"{
            "appId": "my-app",
            "cluster": "default",
            "namespaceName": "application",
            "configurations": {"timeout": "30"},
            "releaseKey": "20240101-abc"
        }"#;
        let response: ConfigResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.release_key.as_deref(), Some("20240101-abc"));
        assert_eq!(response.configurations["timeout"], "30");

        let bare: ConfigResponse = serde_json::from_str(r#"{"configurations": {}}"#).unwrap();
        assert!(bare.release_key.is_none());
    }

    #[test]
    fn test_notification_entry_wire_format() {
        let entries = vec![NotificationEntry {
            namespace_name: "application".into(),
            notification_id: -1,
        }];
        assert_eq!(
            serde_json::to_string(&entries).unwrap(),
            r#"[{"namespaceName":"application","notificationId":-1}]"#
        );

        let changed: Vec<NotificationEntry> = serde_json::from_str(
            r#"[{"namespaceName":"application","notificationId":42,"messages":{"details":{}}}]"#,
        )
        .unwrap();
        assert_eq!(changed[0].notification_id, 42);
    }
}
