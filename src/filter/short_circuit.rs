//! Filter serving a complete response without calling the backend.

use async_trait::async_trait;
use bytes::Bytes;
use http::{header, HeaderMap, HeaderValue, StatusCode};

use crate::body::BodySequence;
use crate::error::GatewayResult;
use crate::exchange::{GatewayExchange, SHORT_CIRCUITED_ATTR};
use crate::filter::{GatewayFilter, Next};

/// Produces a fixed response and never invokes the rest of the chain.
///
/// Filters declared before this one still see (and may rewrite) the response
/// on their return leg.
#[derive(Debug, Clone)]
pub struct ShortCircuitFilter {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl ShortCircuitFilter {
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    /// A response declared as `application/json`.
    pub fn json(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self::new(status, body).with_header(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        )
    }

    pub fn with_header(mut self, name: header::HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }
}

#[async_trait]
impl GatewayFilter for ShortCircuitFilter {
    fn name(&self) -> &'static str {
        "short_circuit"
    }

    async fn filter(
        &self,
        exchange: &mut GatewayExchange,
        _next: Next<'_>,
    ) -> GatewayResult<BodySequence> {
        tracing::debug!(
            request_id = %exchange.request_id(),
            status = %self.status,
            "Short-circuiting chain"
        );

        let response = exchange.response_mut();
        response.set_status(self.status);
        let headers = response.headers_mut();
        headers.clear();
        headers.extend(self.headers.clone());
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(self.body.len()));

        exchange.set_attribute(SHORT_CIRCUITED_ATTR, true);
        Ok(BodySequence::once(self.body.clone()))
    }
}
