//! Ordered, immutable filter chains.
//!
//! # Design Decisions
//! - Built once per route, shared by every exchange through `Arc`
//! - Response wrapping happens in reverse declaration order (nested scopes)
//! - The chain never holds per-exchange state

use std::fmt;
use std::sync::Arc;

use axum::response::{IntoResponse, Response};
use http::{HeaderMap, StatusCode};

use crate::backend::Backend;
use crate::body::BodySequence;
use crate::error::GatewayResult;
use crate::exchange::GatewayExchange;
use crate::filter::{GatewayFilter, Next};

/// Status, headers and body handed to the HTTP server layer.
#[derive(Debug)]
pub struct FinalResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: BodySequence,
}

impl IntoResponse for FinalResponse {
    fn into_response(self) -> Response {
        let mut response = Response::new(self.body.into_axum_body());
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

/// Immutable sequence of filters.
#[derive(Clone)]
pub struct FilterChain {
    filters: Arc<[Arc<dyn GatewayFilter>]>,
}

impl FilterChain {
    pub fn new(filters: Vec<Arc<dyn GatewayFilter>>) -> Self {
        Self {
            filters: filters.into(),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.filters.iter().map(|f| f.name()).collect()
    }

    /// Run the exchange through every filter and the backend.
    pub async fn execute(
        &self,
        exchange: &mut GatewayExchange,
        backend: &dyn Backend,
    ) -> GatewayResult<FinalResponse> {
        let body = Next::new(&self.filters, backend).run(exchange).await?;
        let response = exchange.response();
        Ok(FinalResponse {
            status: response.status(),
            headers: response.headers().clone(),
            body,
        })
    }
}

impl fmt::Debug for FilterChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.filters.iter()).finish()
    }
}
