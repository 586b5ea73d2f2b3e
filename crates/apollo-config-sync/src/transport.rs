//! Transport abstraction for talking to the meta server and config servers.
//!
//! The engine only ever sees [`Request`] and [`Response`]; status handling
//! (200, 304, everything else) is its business, not the transport's. A
//! transport error means no usable response was received at all.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::TransportError;
use crate::signing;

/// Result type for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;

/// HTTP method of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

/// A request relative to some server's base URL.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: Method,
    /// Path below the base URL, without a query string.
    pub path: String,
    /// Query parameters in send order.
    pub query: Vec<(String, String)>,
    pub body: Option<Bytes>,
    /// Overrides the transport's default timeout.
    pub timeout: Option<Duration>,
}

impl Request {
    fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            timeout: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::Post, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::Put, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::Delete, path)
    }

    /// Append a query parameter.
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Value of the first query parameter named `key`.
    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// A response: status code plus the full body.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: u16,
    pub body: Bytes,
}

impl Response {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// A response whose body is `value` encoded as JSON.
    pub fn with_json<T: Serialize>(status: u16, value: &T) -> Result<Self> {
        let body = serde_json::to_vec(value).map_err(|e| TransportError::Encode(e.to_string()))?;
        Ok(Self::new(status, body))
    }

    /// A bodyless response.
    pub fn empty(status: u16) -> Self {
        Self::new(status, Bytes::new())
    }

    /// Decode the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).map_err(|e| TransportError::Decode(e.to_string()))
    }
}

/// Sends requests to a server identified by its base URL.
///
/// Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send `request` to the server at `base_url` and wait for the full response.
    async fn send(&self, base_url: &str, request: Request) -> Result<Response>;
}

/// Join `base_url` and the request path, then append the query.
pub fn build_url(base_url: &str, request: &Request) -> Result<Url> {
    let joined = format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        request.path.trim_start_matches('/')
    );
    let mut url = Url::parse(&joined).map_err(|e| TransportError::InvalidUrl {
        url: joined.clone(),
        message: e.to_string(),
    })?;
    if !request.query.is_empty() {
        url.query_pairs_mut().extend_pairs(request.query.iter());
    }
    Ok(url)
}

// ────────────────────────────────────────────────────────────────────────────
// HTTP
// ────────────────────────────────────────────────────────────────────────────

/// reqwest-backed transport.
///
/// When a secret is configured every request carries the signing headers
/// described in [`crate::signing`].
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    app_id: String,
    secret: Option<String>,
    timeout: Duration,
}

impl HttpTransport {
    /// Create a transport with a default per-request `timeout`.
    pub fn new(app_id: impl Into<String>, secret: Option<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| TransportError::Request(e.to_string()))?;
        Ok(Self {
            client,
            app_id: app_id.into(),
            secret: secret.filter(|s| !s.is_empty()),
            timeout,
        })
    }

    /// Whether requests are signed.
    pub fn is_signing(&self) -> bool {
        self.secret.is_some()
    }
}

fn map_reqwest_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout(e.to_string())
    } else if e.is_decode() || e.is_body() {
        TransportError::Decode(e.to_string())
    } else {
        TransportError::Request(e.to_string())
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, base_url: &str, request: Request) -> Result<Response> {
        let url = build_url(base_url, &request)?;

        let mut builder = self
            .client
            .request(request.method.into(), url.clone())
            .timeout(request.timeout.unwrap_or(self.timeout));

        if let Some(secret) = &self.secret {
            for (name, value) in
                signing::auth_headers(&self.app_id, secret, &url, signing::now_millis())?
            {
                builder = builder.header(name, value);
            }
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        tracing::debug!(method = ?request.method, url = %url, "sending request");
        let response = builder.send().await.map_err(map_reqwest_error)?;
        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(map_reqwest_error)?;
        tracing::debug!(url = %url, status, "received response");

        Ok(Response { status, body })
    }
}

/// A scripted in-memory transport for testing.
///
/// Responses are queued per `(base_url, path)`. Each request pops the next
/// queued outcome; the last one repeats forever. Unscripted routes answer 404.
pub mod memory {
    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::sync::{Mutex, PoisonError};

    type Outcome = std::result::Result<Response, TransportError>;

    /// A request as the transport received it.
    #[derive(Debug, Clone, PartialEq)]
    pub struct RecordedRequest {
        pub base_url: String,
        pub request: Request,
    }

    /// In-memory transport implementation.
    #[derive(Debug, Default)]
    pub struct MemoryTransport {
        routes: Mutex<HashMap<(String, String), VecDeque<Outcome>>>,
        requests: Mutex<Vec<RecordedRequest>>,
    }

    fn route_key(base_url: &str, path: &str) -> (String, String) {
        (
            base_url.trim_end_matches('/').to_string(),
            path.trim_start_matches('/').to_string(),
        )
    }

    impl MemoryTransport {
        pub fn new() -> Self {
            Self::default()
        }

        /// Queue a response for `path` on `base_url`.
        pub fn respond(&self, base_url: &str, path: &str, response: Response) {
            self.push(base_url, path, Ok(response));
        }

        /// Queue a transport failure for `path` on `base_url`.
        pub fn fail(&self, base_url: &str, path: &str, error: TransportError) {
            self.push(base_url, path, Err(error));
        }

        /// Drop everything queued for `path` on `base_url`.
        pub fn clear(&self, base_url: &str, path: &str) {
            self.routes
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&route_key(base_url, path));
        }

        fn push(&self, base_url: &str, path: &str, outcome: Outcome) {
            self.routes
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .entry(route_key(base_url, path))
                .or_default()
                .push_back(outcome);
        }

        /// Every request received so far, in order.
        pub fn requests(&self) -> Vec<RecordedRequest> {
            self.requests
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }

        /// Requests received for `path`, on any server.
        pub fn requests_to(&self, path: &str) -> Vec<RecordedRequest> {
            let path = path.trim_start_matches('/');
            self.requests()
                .into_iter()
                .filter(|r| r.request.path.trim_start_matches('/') == path)
                .collect()
        }
    }

    #[async_trait]
    impl Transport for MemoryTransport {
        async fn send(&self, base_url: &str, request: Request) -> Result<Response> {
            let key = route_key(base_url, &request.path);
            self.requests
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(RecordedRequest {
                    base_url: base_url.to_string(),
                    request,
                });

            let mut routes = self.routes.lock().unwrap_or_else(PoisonError::into_inner);
            match routes.get_mut(&key) {
                Some(queue) if queue.len() > 1 => queue
                    .pop_front()
                    .unwrap_or_else(|| Ok(Response::empty(404))),
                Some(queue) => queue
                    .front()
                    .cloned()
                    .unwrap_or_else(|| Ok(Response::empty(404))),
                None => Ok(Response::empty(404)),
            }
        }
    }
}
