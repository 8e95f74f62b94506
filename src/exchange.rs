//! Per-request context threaded through the filter chain.
//!
//! # Responsibilities
//! - Carry request metadata (method, current and original URI, headers, body)
//! - Carry the response status/headers being assembled on the way back
//! - Provide a string-keyed attribute map for cross-filter coordination
//! - Carry the overall deadline and cancellation signal of the request
//!
//! # Design Decisions
//! - Exclusively owned by one in-flight request; never shared or persisted
//! - Attributes are typed on read (`attribute::<T>`) rather than stringly typed
//! - The request body is one-shot: the first `take_request_body` gets it

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;
use std::time::Duration;

use axum::body::Body;
use http::{HeaderMap, Method, Request, StatusCode, Uri};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Attribute set by the short-circuit filter when it served a response.
pub const SHORT_CIRCUITED_ATTR: &str = "gateway.short_circuited";

/// Attribute holding the final state of the last response-body rewrite.
pub const REWRITE_STATE_ATTR: &str = "gateway.rewrite_state";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Response status and headers as seen by the filters.
#[derive(Debug, Clone)]
pub struct ResponseState {
    status: StatusCode,
    headers: HeaderMap,
}

impl ResponseState {
    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// The declared `content-type`, if it is valid UTF-8.
    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
    }
}

impl Default for ResponseState {
    fn default() -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
        }
    }
}

/// Mutable context for one request/response cycle.
pub struct GatewayExchange {
    request_id: String,
    method: Method,
    uri: Uri,
    original_uri: Uri,
    request_headers: HeaderMap,
    // Mutex only makes the exchange `Sync`; access goes through `get_mut`.
    request_body: Mutex<Option<Body>>,
    route_id: Option<String>,
    target: Option<Uri>,
    response: ResponseState,
    attributes: HashMap<String, Box<dyn Any + Send + Sync>>,
    deadline: Instant,
    cancellation: CancellationToken,
}

impl GatewayExchange {
    /// Create an exchange for `request` with the default 30s deadline.
    pub fn new(request: Request<Body>) -> Self {
        let (parts, body) = request.into_parts();
        Self {
            request_id: String::new(),
            method: parts.method,
            original_uri: parts.uri.clone(),
            uri: parts.uri,
            request_headers: parts.headers,
            request_body: Mutex::new(Some(body)),
            route_id: None,
            target: None,
            response: ResponseState::default(),
            attributes: HashMap::new(),
            deadline: Instant::now() + DEFAULT_TIMEOUT,
            cancellation: CancellationToken::new(),
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }

    /// Bound the whole exchange to `timeout` from now.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Instant::now() + timeout;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Bind the exchange to the matched route and its backend base URI.
    pub fn with_route(mut self, route_id: impl Into<String>, target: Uri) -> Self {
        self.route_id = Some(route_id.into());
        self.target = Some(target);
        self
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Current request URI, including rewrites applied by filters.
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// URI as received from the caller.
    pub fn original_uri(&self) -> &Uri {
        &self.original_uri
    }

    /// Replace the request path, keeping the query string.
    pub fn set_path(&mut self, path: &str) -> Result<(), http::Error> {
        let path_and_query = match self.uri.query() {
            Some(query) => format!("{path}?{query}"),
            None => path.to_owned(),
        };
        let mut parts = self.uri.clone().into_parts();
        parts.path_and_query = Some(path_and_query.parse()?);
        self.uri = Uri::from_parts(parts)?;
        Ok(())
    }

    pub fn request_headers(&self) -> &HeaderMap {
        &self.request_headers
    }

    pub fn request_headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.request_headers
    }

    /// Take the request body. Later calls get `None`.
    pub fn take_request_body(&mut self) -> Option<Body> {
        self.request_body
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }

    pub fn route_id(&self) -> Option<&str> {
        self.route_id.as_deref()
    }

    /// Backend base URI of the matched route.
    pub fn target(&self) -> Option<&Uri> {
        self.target.as_ref()
    }

    pub fn response(&self) -> &ResponseState {
        &self.response
    }

    pub fn response_mut(&mut self) -> &mut ResponseState {
        &mut self.response
    }

    pub fn attribute<T: Any>(&self, key: &str) -> Option<&T> {
        self.attributes.get(key).and_then(|v| v.downcast_ref::<T>())
    }

    pub fn set_attribute<T: Any + Send + Sync>(&mut self, key: impl Into<String>, value: T) {
        self.attributes.insert(key.into(), Box::new(value));
    }

    /// Remove an attribute, returning whether it was present.
    pub fn remove_attribute(&mut self, key: &str) -> bool {
        self.attributes.remove(key).is_some()
    }

    pub fn has_attribute(&self, key: &str) -> bool {
        self.attributes.contains_key(key)
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Time left before the deadline (zero once passed).
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

impl fmt::Debug for GatewayExchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayExchange")
            .field("request_id", &self.request_id)
            .field("method", &self.method)
            .field("uri", &self.uri)
            .field("route_id", &self.route_id)
            .field("status", &self.response.status)
            .field("attributes", &self.attributes.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}
