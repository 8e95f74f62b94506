//! Response-body rewriting filter.
//!
//! # States
//! ```text
//! Passthrough ──▶ Buffering ──▶ Decoding ──▶ Transforming ──▶ Encoding ──▶ Emitting ──▶ Done
//!      │              │             │              │              │            │
//!      └──────────────┴─────────────┴──────────────┴──────────────┴────────────┴──▶ Errored
//! ```
//! `Passthrough` is also terminal: bodies that cannot carry content (1xx, 204,
//! 304, `HEAD`) and empty payloads the input type cannot represent are
//! forwarded untouched.
//!
//! # Design Decisions
//! - The whole body is buffered before headers leave the gateway, so a failure
//!   always becomes an error status and never a truncated body
//! - Buffering and the transform share the exchange deadline and cancellation
//! - Length and framing headers are always recomputed after encoding

use std::fmt;

use async_trait::async_trait;
use futures_util::StreamExt;
use http::{header, HeaderValue, Method, StatusCode};
use tokio::time::timeout_at;

use crate::body::{
    AggregatedBody, BodyCodec, BodySequence, ByteSink, DecodeError, EncodeError, LimitExceeded,
};
use crate::error::{GatewayError, GatewayResult};
use crate::exchange::{GatewayExchange, REWRITE_STATE_ATTR};
use crate::filter::transform::TransformSpec;
use crate::filter::{GatewayFilter, Next};
use crate::observability::metrics;

/// Progress of one response-body rewrite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewriteState {
    Passthrough,
    Buffering,
    Decoding,
    Transforming,
    Encoding,
    Emitting,
    Done,
    Errored,
}

impl RewriteState {
    pub fn as_str(self) -> &'static str {
        match self {
            RewriteState::Passthrough => "passthrough",
            RewriteState::Buffering => "buffering",
            RewriteState::Decoding => "decoding",
            RewriteState::Transforming => "transforming",
            RewriteState::Encoding => "encoding",
            RewriteState::Emitting => "emitting",
            RewriteState::Done => "done",
            RewriteState::Errored => "errored",
        }
    }

    fn can_advance_to(self, next: RewriteState) -> bool {
        use RewriteState::*;
        matches!(
            (self, next),
            (Passthrough, Buffering)
                | (Buffering, Decoding)
                | (Buffering, Passthrough)
                | (Decoding, Transforming)
                | (Transforming, Encoding)
                | (Encoding, Emitting)
                | (Emitting, Done)
        ) || (next == Errored && !matches!(self, Done | Errored))
    }
}

impl fmt::Display for RewriteState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State tracker for a single rewrite; logs every transition.
struct Progress {
    state: RewriteState,
    request_id: String,
}

impl Progress {
    fn new(request_id: &str) -> Self {
        Self {
            state: RewriteState::Passthrough,
            request_id: request_id.to_owned(),
        }
    }

    fn advance(&mut self, next: RewriteState) {
        debug_assert!(
            self.state.can_advance_to(next),
            "invalid rewrite transition {} -> {}",
            self.state,
            next
        );
        tracing::trace!(
            request_id = %self.request_id,
            from = %self.state,
            to = %next,
            "Rewrite state change"
        );
        self.state = next;
    }
}

/// Buffers, decodes, transforms and re-encodes the response body.
#[derive(Debug, Clone)]
pub struct ModifyResponseBodyFilter {
    spec: TransformSpec,
    codec: BodyCodec,
    max_in_memory_size: usize,
}

impl ModifyResponseBodyFilter {
    pub fn new(spec: TransformSpec, max_in_memory_size: usize) -> Self {
        Self {
            spec,
            codec: BodyCodec::new(),
            max_in_memory_size,
        }
    }

    pub fn spec(&self) -> &TransformSpec {
        &self.spec
    }

    /// Replace `downstream` with the rewritten body.
    ///
    /// On success the exchange's response headers describe the new body. On
    /// failure nothing of the original body has been forwarded.
    pub async fn on_response(
        &self,
        exchange: &mut GatewayExchange,
        downstream: BodySequence,
    ) -> GatewayResult<BodySequence> {
        let mut progress = Progress::new(exchange.request_id());
        let route = exchange.route_id().unwrap_or("unknown").to_owned();

        if !body_expected(exchange) {
            tracing::debug!(
                request_id = %exchange.request_id(),
                status = %exchange.response().status(),
                "Response carries no body, skipping rewrite"
            );
            exchange.set_attribute(REWRITE_STATE_ATTR, RewriteState::Passthrough);
            metrics::record_rewrite(&route, RewriteState::Passthrough.as_str());
            return Ok(downstream);
        }

        let result = self.rewrite(exchange, downstream, &mut progress).await;
        match &result {
            Ok(_) => {
                if progress.state == RewriteState::Emitting {
                    progress.advance(RewriteState::Done);
                }
                metrics::record_rewrite(&route, progress.state.as_str());
            }
            Err(err) => {
                let failed_in = progress.state;
                progress.advance(RewriteState::Errored);
                tracing::warn!(
                    request_id = %exchange.request_id(),
                    route = %route,
                    state = %failed_in,
                    error = %err,
                    "Response body rewrite failed"
                );
                metrics::record_rewrite(&route, err.kind());
            }
        }
        exchange.set_attribute(REWRITE_STATE_ATTR, progress.state);
        result
    }

    async fn rewrite(
        &self,
        exchange: &mut GatewayExchange,
        downstream: BodySequence,
        progress: &mut Progress,
    ) -> GatewayResult<BodySequence> {
        if let Some(coding) = content_coding(exchange) {
            return Err(DecodeError::UnsupportedEncoding(coding).into());
        }

        progress.advance(RewriteState::Buffering);
        let aggregated = self.buffer(exchange, downstream).await?;
        if aggregated.is_empty() && !self.codec.supports_empty(self.spec.input()) {
            progress.advance(RewriteState::Passthrough);
            return Ok(BodySequence::empty());
        }

        progress.advance(RewriteState::Decoding);
        let input = self.codec.decode(&aggregated, self.spec.input())?;

        progress.advance(RewriteState::Transforming);
        let output = self.transform(exchange, input).await?;
        if output.body_type() != self.spec.output() {
            return Err(EncodeError::TypeMismatch {
                expected: self.spec.output(),
                actual: output.body_type(),
            }
            .into());
        }

        progress.advance(RewriteState::Encoding);
        let content_type = self.codec.decide_content_type(
            aggregated.content_type(),
            self.spec.output(),
            self.spec.content_type(),
        );
        let encoded = self.codec.encode(output, Some(&content_type))?;
        rewrite_headers(exchange, &encoded)?;

        tracing::debug!(
            request_id = %exchange.request_id(),
            original_bytes = aggregated.len(),
            rewritten_bytes = encoded.len(),
            content_type = %content_type,
            "Response body rewritten"
        );

        progress.advance(RewriteState::Emitting);
        let (bytes, _) = encoded.into_parts();
        Ok(BodySequence::once(bytes))
    }

    /// Drain `downstream` into a bounded sink within the exchange deadline.
    async fn buffer(
        &self,
        exchange: &GatewayExchange,
        mut downstream: BodySequence,
    ) -> GatewayResult<AggregatedBody> {
        let limit = self.max_in_memory_size;
        if let Some(declared) = declared_length(exchange).filter(|len| *len > limit) {
            return Err(LimitExceeded {
                limit,
                attempted: declared,
            }
            .into());
        }

        let mut sink = ByteSink::new(limit, exchange.response().content_type().map(str::to_owned));
        let budget = exchange.remaining();
        let cancellation = exchange.cancellation().clone();

        let drain = async {
            while let Some(chunk) = downstream.next().await {
                sink.append(chunk?)?;
                if sink.is_terminated() {
                    break;
                }
            }
            Ok::<(), GatewayError>(())
        };

        tokio::select! {
            biased;
            _ = cancellation.cancelled() => Err(GatewayError::Cancelled),
            drained = timeout_at(exchange.deadline(), drain) => {
                drained.map_err(|_| GatewayError::Timeout(budget))?
            }
        }?;

        Ok(sink.finish())
    }

    async fn transform(
        &self,
        exchange: &GatewayExchange,
        input: crate::body::TypedValue,
    ) -> GatewayResult<crate::body::TypedValue> {
        let budget = exchange.remaining();
        let cancellation = exchange.cancellation().clone();
        let pending = self.spec.apply(exchange, input);

        tokio::select! {
            biased;
            _ = cancellation.cancelled() => Err(GatewayError::Cancelled),
            output = timeout_at(exchange.deadline(), pending) => {
                Ok(output.map_err(|_| GatewayError::Timeout(budget))??)
            }
        }
    }
}

#[async_trait]
impl GatewayFilter for ModifyResponseBodyFilter {
    fn name(&self) -> &'static str {
        "modify_response_body"
    }

    async fn filter(
        &self,
        exchange: &mut GatewayExchange,
        next: Next<'_>,
    ) -> GatewayResult<BodySequence> {
        let downstream = next.run(exchange).await?;
        self.on_response(exchange, downstream).await
    }
}

/// Whether the response may carry a body at all.
fn body_expected(exchange: &GatewayExchange) -> bool {
    let status = exchange.response().status();
    !(exchange.method() == Method::HEAD
        || status.is_informational()
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED)
}

fn declared_length(exchange: &GatewayExchange) -> Option<usize> {
    exchange
        .response()
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

/// Non-identity `content-encoding`, if any.
fn content_coding(exchange: &GatewayExchange) -> Option<String> {
    exchange
        .response()
        .headers()
        .get(header::CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case("identity"))
        .map(str::to_owned)
}

fn rewrite_headers(exchange: &mut GatewayExchange, encoded: &AggregatedBody) -> GatewayResult<()> {
    let headers = exchange.response_mut().headers_mut();
    headers.remove(header::TRANSFER_ENCODING);
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(encoded.len()));
    if let Some(content_type) = encoded.content_type() {
        let value = HeaderValue::from_str(content_type).map_err(http::Error::from)?;
        headers.insert(header::CONTENT_TYPE, value);
    }
    Ok(())
}
