//! Request signing for access-key protected apps.
//!
//! The signature is `base64(HMAC-SHA1(secret, "{timestamp}\n{path_and_query}"))`
//! where `timestamp` is Unix time in milliseconds and `path_and_query` is the
//! request URL's path plus `?query` when a query is present. It travels in
//! two headers:
//!
//! ```text
//! Authorization: Apollo {app_id}:{signature}
//! Timestamp: {timestamp}
//! ```

use std::time::{SystemTime, UNIX_EPOCH};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use reqwest::Url;
use sha1::Sha1;

use crate::error::TransportError;

type HmacSha1 = Hmac<Sha1>;

pub const AUTHORIZATION_HEADER: &str = "Authorization";
pub const TIMESTAMP_HEADER: &str = "Timestamp";

/// Compute the request signature.
pub fn signature(
    secret: &str,
    timestamp_millis: i64,
    path_and_query: &str,
) -> Result<String, TransportError> {
    let mut mac = HmacSha1::new_from_slice(secret.as_bytes())
        .map_err(|e| TransportError::Encode(format!("invalid signing key: {}", e)))?;
    mac.update(format!("{}\n{}", timestamp_millis, path_and_query).as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

/// The part of `url` covered by the signature.
pub fn path_and_query(url: &Url) -> String {
    match url.query() {
        Some(query) => format!("{}?{}", url.path(), query),
        None => url.path().to_string(),
    }
}

/// Both signing headers for a request to `url`.
pub fn auth_headers(
    app_id: &str,
    secret: &str,
    url: &Url,
    timestamp_millis: i64,
) -> Result<[(&'static str, String); 2], TransportError> {
    let signature = signature(secret, timestamp_millis, &path_and_query(url))?;
    Ok([
        (
            AUTHORIZATION_HEADER,
            format!("Apollo {}:{}", app_id, signature),
        ),
        (TIMESTAMP_HEADER, timestamp_millis.to_string()),
    ])
}

/// Current Unix time in milliseconds.
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
