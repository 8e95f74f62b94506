//! HTTP backend over the hyper-util legacy client.
//!
//! # Responsibilities
//! - Rebuild the request URI from the route target and the exchange path
//! - Forward method, headers and the request body
//! - Expose backend status and headers on the exchange, body as a sequence
//!
//! # Design Decisions
//! - The `Host` header is regenerated from the target authority
//! - Connect failures are `BackendUnavailable` (503); other failures are 502
//! - The response body is never buffered here

use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use http::uri::PathAndQuery;
use http::{header, HeaderValue, Request, Uri};
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use tokio::time::timeout_at;

use crate::backend::Backend;
use crate::body::BodySequence;
use crate::error::{GatewayError, GatewayResult};
use crate::exchange::GatewayExchange;
use crate::http::request::X_REQUEST_ID;
use crate::http::response::strip_hop_by_hop;

/// Forwards exchanges to the route's target URI.
#[derive(Clone)]
pub struct HttpBackend {
    client: Client<HttpConnector, Body>,
}

impl HttpBackend {
    pub fn new(connect_timeout: Duration) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(connect_timeout));
        connector.set_nodelay(true);

        let client = Client::builder(TokioExecutor::new()).build(connector);
        Self { client }
    }
}

impl std::fmt::Debug for HttpBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpBackend").finish_non_exhaustive()
    }
}

/// `target`'s scheme and authority joined with `current`'s path and query.
fn backend_uri(target: &Uri, current: &Uri) -> Result<Uri, http::Error> {
    let mut parts = target.clone().into_parts();
    parts.path_and_query = Some(
        current
            .path_and_query()
            .cloned()
            .unwrap_or_else(|| PathAndQuery::from_static("/")),
    );
    Ok(Uri::from_parts(parts)?)
}

#[async_trait]
impl Backend for HttpBackend {
    async fn call(&self, exchange: &mut GatewayExchange) -> GatewayResult<BodySequence> {
        let target = exchange
            .target()
            .cloned()
            .ok_or_else(|| {
                GatewayError::BackendUnavailable("no backend target for exchange".into())
            })?;
        let uri = backend_uri(&target, exchange.uri())?;

        let mut headers = exchange.request_headers().clone();
        strip_hop_by_hop(&mut headers);
        headers.remove(header::HOST);
        if let Ok(id) = HeaderValue::from_str(exchange.request_id()) {
            headers.insert(X_REQUEST_ID, id);
        }

        let body = exchange.take_request_body().unwrap_or_else(Body::empty);
        let mut request = Request::builder()
            .method(exchange.method().clone())
            .uri(uri.clone())
            .body(body)?;
        *request.headers_mut() = headers;

        tracing::debug!(
            request_id = %exchange.request_id(),
            method = %exchange.method(),
            backend = %uri,
            "Forwarding to backend"
        );

        let budget = exchange.remaining();
        let cancellation = exchange.cancellation().clone();
        let response = tokio::select! {
            biased;
            _ = cancellation.cancelled() => return Err(GatewayError::Cancelled),
            sent = timeout_at(exchange.deadline(), self.client.request(request)) => sent,
        };

        let response = match response {
            Ok(Ok(response)) => response,
            Ok(Err(e)) if e.is_connect() => {
                tracing::warn!(
                    request_id = %exchange.request_id(),
                    backend = %uri,
                    error = %e,
                    "Backend unreachable"
                );
                return Err(GatewayError::BackendUnavailable(e.to_string()));
            }
            Ok(Err(e)) => {
                tracing::error!(
                    request_id = %exchange.request_id(),
                    backend = %uri,
                    error = %e,
                    "Upstream error"
                );
                return Err(GatewayError::backend(e));
            }
            Err(_) => return Err(GatewayError::Timeout(budget)),
        };

        let (parts, body): (_, hyper::body::Incoming) = response.into_parts();
        tracing::debug!(
            request_id = %exchange.request_id(),
            status = %parts.status,
            "Backend responded"
        );

        let state = exchange.response_mut();
        state.set_status(parts.status);
        let headers = state.headers_mut();
        headers.extend(parts.headers);
        strip_hop_by_hop(headers);

        Ok(BodySequence::from_body(body))
    }
}
