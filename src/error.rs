//! Gateway-level error taxonomy and its mapping to HTTP responses.
//!
//! # Design Decisions
//! - Every body rewrite failure surfaces as a server error, never a partial 2xx
//! - Upstream failures map to 502, deadline overruns to 504
//! - Callers get a short category message; details go to the logs

use std::time::Duration;

use axum::response::{IntoResponse, Response};
use http::StatusCode;
use thiserror::Error;

use crate::body::{BodyError, BoxError, DecodeError, EncodeError, LimitExceeded};
use crate::filter::transform::TransformError;

/// Errors that abort an exchange.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// No route predicate matched the request.
    #[error("no route matches {0}")]
    NoRoute(String),

    /// Buffered response body grew past the in-memory limit.
    #[error(transparent)]
    LimitExceeded(#[from] LimitExceeded),

    /// Response body could not be decoded into the declared input type.
    #[error("decode failed: {0}")]
    Decode(#[from] DecodeError),

    /// User transform function failed.
    #[error("transform failed: {0}")]
    Transform(#[from] TransformError),

    /// Transform output could not be serialized.
    #[error("encode failed: {0}")]
    Encode(#[from] EncodeError),

    /// Backend body stream failed before buffering completed.
    #[error("upstream body failed: {0}")]
    Upstream(#[from] BodyError),

    /// Backend request could not be sent or answered.
    #[error("backend request failed: {0}")]
    Backend(#[source] BoxError),

    /// Route has no usable backend target.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Exchange deadline passed.
    #[error("deadline exceeded after {0:?}")]
    Timeout(Duration),

    /// Exchange was cancelled upstream (client gone or shutdown).
    #[error("exchange cancelled")]
    Cancelled,

    /// A filter produced an invalid request or header.
    #[error("invalid message: {0}")]
    InvalidMessage(#[from] http::Error),
}

impl GatewayError {
    pub fn backend(err: impl Into<BoxError>) -> Self {
        GatewayError::Backend(err.into())
    }

    /// Status code returned to the caller.
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::NoRoute(_) => StatusCode::NOT_FOUND,
            GatewayError::LimitExceeded(_)
            | GatewayError::Decode(_)
            | GatewayError::Transform(_)
            | GatewayError::Encode(_)
            | GatewayError::InvalidMessage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::Upstream(_) | GatewayError::Backend(_) => StatusCode::BAD_GATEWAY,
            GatewayError::BackendUnavailable(_) | GatewayError::Cancelled => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            GatewayError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    /// Stable label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::NoRoute(_) => "no_route",
            GatewayError::LimitExceeded(_) => "limit_exceeded",
            GatewayError::Decode(_) => "decode",
            GatewayError::Transform(_) => "transform",
            GatewayError::Encode(_) => "encode",
            GatewayError::Upstream(_) => "upstream",
            GatewayError::Backend(_) => "backend",
            GatewayError::BackendUnavailable(_) => "backend_unavailable",
            GatewayError::Timeout(_) => "timeout",
            GatewayError::Cancelled => "cancelled",
            GatewayError::InvalidMessage(_) => "invalid_message",
        }
    }

    fn public_message(&self) -> &'static str {
        match self {
            GatewayError::NoRoute(_) => "No matching route found",
            GatewayError::LimitExceeded(_) => "Response body too large to rewrite",
            GatewayError::Decode(_)
            | GatewayError::Transform(_)
            | GatewayError::Encode(_) => "Response body rewrite failed",
            GatewayError::Upstream(_) | GatewayError::Backend(_) => "Upstream request failed",
            GatewayError::BackendUnavailable(_) => "No backend available",
            GatewayError::Timeout(_) => "Upstream timed out",
            GatewayError::Cancelled => "Request cancelled",
            GatewayError::InvalidMessage(_) => "Internal gateway error",
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        (self.status(), self.public_message()).into_response()
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rewrite_failures_are_server_errors() {
        let errors = [
            GatewayError::from(LimitExceeded { limit: 40, attempted: 9000 }),
            GatewayError::from(DecodeError::EmptyPayload(crate::body::BodyType::Map)),
            GatewayError::from(TransformError::new("boom")),
        ];
        for err in errors {
            assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR, "{err}");
        }
    }

    #[test]
    fn test_upstream_and_timeout_status() {
        assert_eq!(
            GatewayError::from(BodyError::new("reset")).status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            GatewayError::Timeout(Duration::from_secs(1)).status(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(GatewayError::Cancelled.kind(), "cancelled");
    }

    #[test]
    fn test_into_response_hides_details() {
        let response = GatewayError::from(TransformError::new("secret detail")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
