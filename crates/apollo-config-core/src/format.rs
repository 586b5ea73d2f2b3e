//! Namespace content formats.
//!
//! The namespace name's suffix decides how `configurations` is read:
//!
//! | Suffix            | Effective map                                 |
//! |-------------------|-----------------------------------------------|
//! | `.yaml`, `.yml`   | top-level mapping of the YAML in `content`    |
//! | `.json`           | top-level object of the JSON in `content`     |
//! | anything else     | `configurations` itself                       |
//!
//! Structured values keep string scalars verbatim and store everything
//! else (numbers, booleans, null, nested maps, lists) as compact JSON text.

use serde_json::{Map, Value};

use crate::error::{FormatError, Result};
use crate::types::{EffectiveConfig, RawConfig};

/// The `configurations` entry holding a structured namespace's document.
pub const CONTENT_KEY: &str = "content";

/// How a namespace's `configurations` map is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamespaceFormat {
    /// Plain key/value pairs (the `application` namespace, `.properties`).
    Properties,
    /// A YAML document in `content`.
    Yaml,
    /// A JSON document in `content`.
    Json,
}

impl NamespaceFormat {
    /// Determine the format from a namespace name.
    pub fn of(namespace: &str) -> Self {
        match namespace.rsplit_once('.').map(|(_, ext)| ext) {
            Some("yaml") | Some("yml") => NamespaceFormat::Yaml,
            Some("json") => NamespaceFormat::Json,
            _ => NamespaceFormat::Properties,
        }
    }

    /// Whether the namespace carries a document in `content`.
    pub fn is_structured(self) -> bool {
        !matches!(self, NamespaceFormat::Properties)
    }
}

/// Resolve a raw `configurations` map into the namespace's effective map.
pub fn parse_configurations(namespace: &str, raw: &RawConfig) -> Result<EffectiveConfig> {
    let document: Map<String, Value> = match NamespaceFormat::of(namespace) {
        NamespaceFormat::Properties => return Ok(raw.clone()),
        NamespaceFormat::Yaml => match document_content(namespace, raw)? {
            Some(content) => serde_yaml::from_str(content).map_err(|e| FormatError::Yaml {
                namespace: namespace.to_string(),
                message: e.to_string(),
            })?,
            None => Map::new(),
        },
        NamespaceFormat::Json => match document_content(namespace, raw)? {
            Some(content) => serde_json::from_str(content).map_err(|e| FormatError::Json {
                namespace: namespace.to_string(),
                message: e.to_string(),
            })?,
            None => Map::new(),
        },
    };

    Ok(document
        .into_iter()
        .map(|(key, value)| (key, render_value(value)))
        .collect())
}

/// The `content` document, or `None` when it is blank.
fn document_content<'a>(namespace: &str, raw: &'a RawConfig) -> Result<Option<&'a str>> {
    let content = raw
        .get(CONTENT_KEY)
        .ok_or_else(|| FormatError::MissingContent {
            namespace: namespace.to_string(),
        })?;
    Ok(Some(content.as_str()).filter(|c| !c.trim().is_empty()))
}

fn render_value(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}
