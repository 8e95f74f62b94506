//! Declarative request/response rewriting filters.
//!
//! These are the filters configurable from TOML route definitions. Request
//! rewrites run on the forward leg; response header and status rewrites run
//! on the return leg after the downstream body has been produced.

use async_trait::async_trait;
use http::header::HeaderName;
use http::{HeaderValue, StatusCode};

use crate::body::BodySequence;
use crate::error::GatewayResult;
use crate::exchange::GatewayExchange;
use crate::filter::{GatewayFilter, Next};

/// Replaces the request path.
#[derive(Debug, Clone)]
pub struct SetPathFilter {
    path: String,
}

impl SetPathFilter {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl GatewayFilter for SetPathFilter {
    fn name(&self) -> &'static str {
        "set_path"
    }

    async fn filter(
        &self,
        exchange: &mut GatewayExchange,
        next: Next<'_>,
    ) -> GatewayResult<BodySequence> {
        exchange.set_path(&self.path)?;
        next.run(exchange).await
    }
}

/// Removes the first `parts` path segments.
///
/// `/prefix/item-1` with one part stripped becomes `/item-1`; stripping every
/// segment leaves `/`.
#[derive(Debug, Clone, Copy)]
pub struct StripPrefixFilter {
    parts: usize,
}

impl StripPrefixFilter {
    pub fn new(parts: usize) -> Self {
        Self { parts }
    }

    fn strip(&self, path: &str) -> String {
        if self.parts == 0 {
            return path.to_owned();
        }
        let rest: Vec<&str> = path
            .split('/')
            .filter(|segment| !segment.is_empty())
            .skip(self.parts)
            .collect();
        let mut stripped = format!("/{}", rest.join("/"));
        if path.ends_with('/') && !rest.is_empty() {
            stripped.push('/');
        }
        stripped
    }
}

#[async_trait]
impl GatewayFilter for StripPrefixFilter {
    fn name(&self) -> &'static str {
        "strip_prefix"
    }

    async fn filter(
        &self,
        exchange: &mut GatewayExchange,
        next: Next<'_>,
    ) -> GatewayResult<BodySequence> {
        if self.parts > 0 {
            let stripped = self.strip(exchange.uri().path());
            exchange.set_path(&stripped)?;
        }
        next.run(exchange).await
    }
}

/// Appends a header to the forwarded request.
#[derive(Debug, Clone)]
pub struct AddRequestHeaderFilter {
    name: HeaderName,
    value: HeaderValue,
}

impl AddRequestHeaderFilter {
    pub fn new(name: HeaderName, value: HeaderValue) -> Self {
        Self { name, value }
    }
}

#[async_trait]
impl GatewayFilter for AddRequestHeaderFilter {
    fn name(&self) -> &'static str {
        "add_request_header"
    }

    async fn filter(
        &self,
        exchange: &mut GatewayExchange,
        next: Next<'_>,
    ) -> GatewayResult<BodySequence> {
        exchange
            .request_headers_mut()
            .append(self.name.clone(), self.value.clone());
        next.run(exchange).await
    }
}

/// Appends a header to the response on the way back.
#[derive(Debug, Clone)]
pub struct AddResponseHeaderFilter {
    name: HeaderName,
    value: HeaderValue,
}

impl AddResponseHeaderFilter {
    pub fn new(name: HeaderName, value: HeaderValue) -> Self {
        Self { name, value }
    }
}

#[async_trait]
impl GatewayFilter for AddResponseHeaderFilter {
    fn name(&self) -> &'static str {
        "add_response_header"
    }

    async fn filter(
        &self,
        exchange: &mut GatewayExchange,
        next: Next<'_>,
    ) -> GatewayResult<BodySequence> {
        let body = next.run(exchange).await?;
        exchange
            .response_mut()
            .headers_mut()
            .append(self.name.clone(), self.value.clone());
        Ok(body)
    }
}

/// Overrides the response status.
#[derive(Debug, Clone, Copy)]
pub struct SetStatusFilter {
    status: StatusCode,
}

impl SetStatusFilter {
    pub fn new(status: StatusCode) -> Self {
        Self { status }
    }
}

#[async_trait]
impl GatewayFilter for SetStatusFilter {
    fn name(&self) -> &'static str {
        "set_status"
    }

    async fn filter(
        &self,
        exchange: &mut GatewayExchange,
        next: Next<'_>,
    ) -> GatewayResult<BodySequence> {
        let body = next.run(exchange).await?;
        exchange.response_mut().set_status(self.status);
        Ok(body)
    }
}
