//! Gateway filters.
//!
//! # Data Flow
//! ```text
//! FilterChain::execute
//!     → filter[0].filter(exchange, next)      (forward leg, declaration order)
//!         → filter[1].filter(exchange, next)
//!             → Backend::call                 (or a short-circuit response)
//!         ← filter[1] post-processes body      (return leg, reverse order)
//!     ← filter[0] post-processes body
//! ```
//!
//! # Design Decisions
//! - A filter is "invoke next, then post-process"; not calling `next` short-circuits
//! - Filters are stateless per exchange; all per-request state lives on the exchange
//! - Chains are immutable and shared across concurrent exchanges

pub mod chain;
pub mod modify_response;
pub mod rewrite;
pub mod short_circuit;
pub mod transform;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::backend::Backend;
use crate::body::BodySequence;
use crate::error::{GatewayError, GatewayResult};
use crate::exchange::GatewayExchange;

pub use chain::{FilterChain, FinalResponse};
pub use modify_response::{ModifyResponseBodyFilter, RewriteState};
pub use rewrite::{
    AddRequestHeaderFilter, AddResponseHeaderFilter, SetPathFilter, SetStatusFilter,
    StripPrefixFilter,
};
pub use short_circuit::ShortCircuitFilter;
pub use transform::{TransformError, TransformFuture, TransformSpec};

/// A step of the filter chain.
#[async_trait]
pub trait GatewayFilter: Send + Sync + fmt::Debug {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// Handle the exchange.
    ///
    /// Call `next.run(exchange)` to continue the chain and receive the
    /// downstream body, or return a body directly to short-circuit.
    async fn filter(
        &self,
        exchange: &mut GatewayExchange,
        next: Next<'_>,
    ) -> GatewayResult<BodySequence>;
}

/// Remainder of the chain after the current filter.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    filters: &'a [Arc<dyn GatewayFilter>],
    backend: &'a dyn Backend,
}

impl<'a> Next<'a> {
    pub(crate) fn new(filters: &'a [Arc<dyn GatewayFilter>], backend: &'a dyn Backend) -> Self {
        Self { filters, backend }
    }

    /// Invoke the next filter, or the backend once no filters remain.
    pub async fn run(self, exchange: &mut GatewayExchange) -> GatewayResult<BodySequence> {
        if exchange.is_cancelled() {
            return Err(GatewayError::Cancelled);
        }
        match self.filters.split_first() {
            Some((filter, rest)) => {
                tracing::trace!(
                    request_id = %exchange.request_id(),
                    filter = filter.name(),
                    "Invoking filter"
                );
                filter.filter(exchange, Next::new(rest, self.backend)).await
            }
            None => {
                tracing::trace!(request_id = %exchange.request_id(), "Invoking backend");
                self.backend.call(exchange).await
            }
        }
    }
}

impl fmt::Debug for Next<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next")
            .field("filters", &self.filters.iter().map(|fl| fl.name()).collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory backends and helpers shared by filter tests.

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use axum::body::Body;
    use bytes::Bytes;
    use futures_util::{stream, StreamExt};
    use http::{header, HeaderValue, Request, StatusCode};

    use super::*;
    use crate::body::{BodyError, Chunk};

    /// Backend answering every call with a fixed status, content type and chunks.
    #[derive(Debug)]
    pub struct StaticBackend {
        pub status: StatusCode,
        pub content_type: Option<&'static str>,
        pub chunks: Vec<&'static str>,
        pub fail_after: Option<usize>,
        pub calls: AtomicUsize,
    }

    impl StaticBackend {
        pub fn new(content_type: Option<&'static str>, chunks: Vec<&'static str>) -> Self {
            Self {
                status: StatusCode::OK,
                content_type,
                chunks,
                fail_after: None,
                calls: AtomicUsize::new(0),
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Backend for StaticBackend {
        async fn call(&self, exchange: &mut GatewayExchange) -> GatewayResult<BodySequence> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let response = exchange.response_mut();
            response.set_status(self.status);
            if let Some(ct) = self.content_type {
                response
                    .headers_mut()
                    .insert(header::CONTENT_TYPE, HeaderValue::from_static(ct));
            }
            let total: usize = self.chunks.iter().map(|c| c.len()).sum();
            response.headers_mut().insert(header::CONTENT_LENGTH, total.into());

            let mut items: Vec<Result<Chunk, BodyError>> = self
                .chunks
                .iter()
                .map(|c| Ok(Chunk::data(Bytes::from_static(c.as_bytes()))))
                .collect();
            if let Some(n) = self.fail_after {
                items.truncate(n);
                items.push(Err(BodyError::new("backend connection reset")));
            }
            Ok(BodySequence::from_stream(stream::iter(items)))
        }
    }

    /// Backend echoing the request path as a text body.
    #[derive(Debug, Default)]
    pub struct EchoPathBackend;

    #[async_trait]
    impl Backend for EchoPathBackend {
        async fn call(&self, exchange: &mut GatewayExchange) -> GatewayResult<BodySequence> {
            tokio::task::yield_now().await;
            let path = exchange.uri().path().to_owned();
            exchange
                .response_mut()
                .headers_mut()
                .insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
            Ok(BodySequence::once(path))
        }
    }

    /// Filter recording its forward and return legs into a shared log.
    #[derive(Debug)]
    pub struct Recorder {
        pub name: &'static str,
        pub log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl GatewayFilter for Recorder {
        fn name(&self) -> &'static str {
            "recorder"
        }

        async fn filter(
            &self,
            exchange: &mut GatewayExchange,
            next: Next<'_>,
        ) -> GatewayResult<BodySequence> {
            self.log.lock().unwrap().push(format!("{}:request", self.name));
            let body = next.run(exchange).await?;
            self.log.lock().unwrap().push(format!("{}:response", self.name));
            Ok(body)
        }
    }

    pub fn exchange(path: &str) -> GatewayExchange {
        GatewayExchange::new(Request::builder().uri(path).body(Body::empty()).unwrap())
    }

    pub async fn collect(body: BodySequence) -> Result<Bytes, BodyError> {
        let mut body = body;
        let mut out = Vec::new();
        while let Some(chunk) = body.next().await {
            out.extend_from_slice(chunk?.bytes());
        }
        Ok(Bytes::from(out))
    }
}
