//! Route lookup and dispatch.
//!
//! # Responsibilities
//! - Compile route definitions (TOML or `RouteBuilder`) into routes
//! - Look up the matching route for a request
//! - Return matched route or explicit no-match
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - O(n) scan in priority order (acceptable for typical route counts)
//! - Explicit `None` rather than a silent default route

use std::sync::Arc;

use axum::body::Body;
use http::header::HeaderName;
use http::uri::Scheme;
use http::{HeaderValue, Request, StatusCode, Uri};

use crate::config::{CodecConfig, FilterConfig, GatewayConfig, RouteConfig};
use crate::filter::{
    AddRequestHeaderFilter, AddResponseHeaderFilter, FilterChain, GatewayFilter,
    ModifyResponseBodyFilter, SetPathFilter, SetStatusFilter, StripPrefixFilter, TransformSpec,
};
use crate::routing::matcher::{AndMatcher, HostMatcher, Matcher, PathPrefixMatcher};

/// Error compiling a route definition.
#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    /// The route has no backend URI.
    #[error("route '{0}' has no backend uri")]
    MissingUri(String),

    /// The backend URI is not an absolute `http` URI.
    #[error("invalid backend uri '{uri}': {reason}")]
    InvalidUri { uri: String, reason: String },

    /// A header filter names an invalid header or value.
    #[error("invalid header '{name}'")]
    InvalidHeader { name: String },

    /// A status filter carries an out-of-range code.
    #[error("invalid status code {0}")]
    InvalidStatus(u16),

    /// A path does not start with `/`.
    #[error("path '{0}' must start with '/'")]
    InvalidPath(String),
}

/// Parse a backend base URI: absolute, `http`, with an authority.
pub fn parse_target(uri: &str) -> Result<Uri, RouteError> {
    let invalid = |reason: &str| RouteError::InvalidUri {
        uri: uri.to_owned(),
        reason: reason.to_owned(),
    };

    let parsed: Uri = uri.parse().map_err(|e: http::uri::InvalidUri| invalid(&e.to_string()))?;
    if parsed.scheme() != Some(&Scheme::HTTP) {
        return Err(invalid("scheme must be http"));
    }
    if parsed.authority().is_none() {
        return Err(invalid("missing host"));
    }
    Ok(parsed)
}

/// Compile a declarative filter definition.
pub fn build_filter(config: &FilterConfig) -> Result<Arc<dyn GatewayFilter>, RouteError> {
    let filter: Arc<dyn GatewayFilter> = match config {
        FilterConfig::SetPath { path } => {
            if !path.starts_with('/') {
                return Err(RouteError::InvalidPath(path.clone()));
            }
            Arc::new(SetPathFilter::new(path.clone()))
        }
        FilterConfig::StripPrefix { parts } => Arc::new(StripPrefixFilter::new(*parts)),
        FilterConfig::AddRequestHeader { name, value } => {
            let (name, value) = header_pair(name, value)?;
            Arc::new(AddRequestHeaderFilter::new(name, value))
        }
        FilterConfig::AddResponseHeader { name, value } => {
            let (name, value) = header_pair(name, value)?;
            Arc::new(AddResponseHeaderFilter::new(name, value))
        }
        FilterConfig::SetStatus { status } => {
            let code =
                StatusCode::from_u16(*status).map_err(|_| RouteError::InvalidStatus(*status))?;
            Arc::new(SetStatusFilter::new(code))
        }
    };
    Ok(filter)
}

fn header_pair(name: &str, value: &str) -> Result<(HeaderName, HeaderValue), RouteError> {
    let invalid = || RouteError::InvalidHeader { name: name.to_owned() };
    let name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| invalid())?;
    let value = HeaderValue::from_str(value).map_err(|_| invalid())?;
    Ok((name, value))
}

/// A compiled route.
#[derive(Debug)]
pub struct Route {
    id: String,
    matcher: AndMatcher,
    target: Uri,
    chain: FilterChain,
    priority: u32,
}

impl Route {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Backend base URI; scheme and authority are used, the path comes from the exchange.
    pub fn target(&self) -> &Uri {
        &self.target
    }

    pub fn chain(&self) -> &FilterChain {
        &self.chain
    }

    pub fn priority(&self) -> u32 {
        self.priority
    }

    pub fn matches(&self, req: &Request<Body>) -> bool {
        self.matcher.matches(req)
    }
}

enum PendingFilter {
    Ready(Arc<dyn GatewayFilter>),
    ModifyResponseBody(TransformSpec),
}

/// Programmatic route definition.
///
/// ```ignore
/// let route = RouteBuilder::new("rewrite")
///     .path_prefix("/get")
///     .uri("http://127.0.0.1:9000")
///     .modify_response_body(spec)
///     .build(&config.codec)?;
/// ```
pub struct RouteBuilder {
    id: String,
    host: Option<String>,
    path_prefix: Option<String>,
    uri: Option<String>,
    priority: u32,
    filters: Vec<PendingFilter>,
}

impl RouteBuilder {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            host: None,
            path_prefix: None,
            uri: None,
            priority: 0,
            filters: Vec::new(),
        }
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn path_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.path_prefix = Some(prefix.into());
        self
    }

    pub fn uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    pub fn priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    /// Append a filter.
    pub fn filter(mut self, filter: impl GatewayFilter + 'static) -> Self {
        self.filters.push(PendingFilter::Ready(Arc::new(filter)));
        self
    }

    /// Append a response-body rewrite at this position of the chain.
    pub fn modify_response_body(mut self, spec: TransformSpec) -> Self {
        self.filters.push(PendingFilter::ModifyResponseBody(spec));
        self
    }

    /// Compile the route; rewrite filters take their buffer limit from `codec`.
    pub fn build(self, codec: &CodecConfig) -> Result<Route, RouteError> {
        let uri = self.uri.ok_or_else(|| RouteError::MissingUri(self.id.clone()))?;
        let target = parse_target(&uri)?;

        let mut matchers: Vec<Box<dyn Matcher>> = Vec::new();
        if let Some(host) = self.host {
            matchers.push(Box::new(HostMatcher::new(host)));
        }
        if let Some(prefix) = self.path_prefix {
            if !prefix.starts_with('/') {
                return Err(RouteError::InvalidPath(prefix));
            }
            matchers.push(Box::new(PathPrefixMatcher::new(prefix)));
        }

        let filters = self
            .filters
            .into_iter()
            .map(|pending| match pending {
                PendingFilter::Ready(filter) => filter,
                PendingFilter::ModifyResponseBody(spec) => {
                    Arc::new(ModifyResponseBodyFilter::new(spec, codec.max_in_memory_size))
                        as Arc<dyn GatewayFilter>
                }
            })
            .collect();

        Ok(Route {
            id: self.id,
            matcher: AndMatcher::new(matchers),
            target,
            chain: FilterChain::new(filters),
            priority: self.priority,
        })
    }

    fn from_config(config: &RouteConfig) -> Result<Self, RouteError> {
        let mut builder = RouteBuilder::new(config.name.clone())
            .uri(config.uri.clone())
            .priority(config.priority);
        if let Some(host) = &config.host {
            builder = builder.host(host.clone());
        }
        if let Some(prefix) = &config.path_prefix {
            builder = builder.path_prefix(prefix.clone());
        }
        for filter in &config.filters {
            builder.filters.push(PendingFilter::Ready(build_filter(filter)?));
        }
        Ok(builder)
    }
}

/// Immutable, priority-ordered route set.
#[derive(Debug, Default)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    /// Higher priority first; equal priorities keep declaration order.
    pub fn new(mut routes: Vec<Route>) -> Self {
        routes.sort_by(|a, b| b.priority.cmp(&a.priority));
        Self { routes }
    }

    /// Compile the routes declared in `config`.
    pub fn from_config(config: &GatewayConfig) -> Result<Self, RouteError> {
        let routes = config
            .routes
            .iter()
            .map(|route| RouteBuilder::from_config(route)?.build(&config.codec))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(routes))
    }

    /// First matching route.
    pub fn match_request(&self, req: &Request<Body>) -> Option<&Route> {
        self.routes.iter().find(|route| route.matches(req))
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Route> {
        self.routes.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::{BodyType, TypedValue};
    use crate::filter::TransformError;

    fn request(host: &str, path: &str) -> Request<Body> {
        Request::builder()
            .uri(path)
            .header("Host", host)
            .body(Body::empty())
            .unwrap()
    }

    fn route(name: &str, prefix: &str, priority: u32) -> RouteConfig {
        RouteConfig {
            name: name.into(),
            host: None,
            path_prefix: Some(prefix.into()),
            uri: "http://127.0.0.1:9000".into(),
            priority,
            filters: Vec::new(),
        }
    }

    #[test]
    fn test_priority_order() {
        let mut config = GatewayConfig::default();
        config.routes.push(route("catch-all", "/", 0));
        config.routes.push(route("api", "/api", 10));
        config.routes.push(route("api-shadow", "/api", 10));

        let table = RouteTable::from_config(&config).unwrap();
        assert_eq!(table.match_request(&request("a", "/api/x")).unwrap().id(), "api");
        assert_eq!(table.match_request(&request("a", "/other")).unwrap().id(), "catch-all");
    }

    #[test]
    fn test_no_match() {
        let mut config = GatewayConfig::default();
        config.routes.push(RouteConfig {
            host: Some("api.example.com".into()),
            ..route("api", "/", 0)
        });

        let table = RouteTable::from_config(&config).unwrap();
        assert!(table.match_request(&request("API.example.com", "/")).is_some());
        assert!(table.match_request(&request("www.example.com", "/")).is_none());
    }

    #[test]
    fn test_filters_compiled_in_order() {
        let mut config = GatewayConfig::default();
        config.routes.push(RouteConfig {
            filters: vec![
                FilterConfig::StripPrefix { parts: 1 },
                FilterConfig::AddResponseHeader {
                    name: "x-gateway".into(),
                    value: "1".into(),
                },
                FilterConfig::SetStatus { status: 202 },
            ],
            ..route("r", "/", 0)
        });

        let table = RouteTable::from_config(&config).unwrap();
        let route = table.iter().next().unwrap();
        assert_eq!(
            route.chain().names(),
            vec!["strip_prefix", "add_response_header", "set_status"]
        );
        assert_eq!(route.target().authority().unwrap().as_str(), "127.0.0.1:9000");
    }

    #[test]
    fn test_invalid_definitions() {
        assert!(matches!(parse_target("https://x"), Err(RouteError::InvalidUri { .. })));
        assert!(matches!(parse_target("/relative"), Err(RouteError::InvalidUri { .. })));
        assert!(matches!(
            build_filter(&FilterConfig::SetStatus { status: 1000 }),
            Err(RouteError::InvalidStatus(1000))
        ));
        assert!(matches!(
            build_filter(&FilterConfig::AddRequestHeader {
                name: "bad header".into(),
                value: "v".into()
            }),
            Err(RouteError::InvalidHeader { .. })
        ));
        assert!(matches!(
            RouteBuilder::new("r").build(&CodecConfig::default()),
            Err(RouteError::MissingUri(_))
        ));
    }

    #[test]
    fn test_builder_places_body_rewrite() {
        let spec = TransformSpec::new(
            BodyType::Text,
            BodyType::Text,
            |_exchange, value: TypedValue| async move { Ok::<_, TransformError>(value) },
        );
        let route = RouteBuilder::new("rewrite")
            .path_prefix("/get")
            .uri("http://localhost:9000")
            .filter(StripPrefixFilter::new(1))
            .modify_response_body(spec)
            .build(&CodecConfig::default())
            .unwrap();

        assert_eq!(route.chain().names(), vec!["strip_prefix", "modify_response_body"]);
        assert!(route.matches(&request("any", "/get/x")));
    }
}
