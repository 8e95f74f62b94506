//! Route-level declaration of a response-body transform.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt};
use thiserror::Error;

use crate::body::{BodyType, BoxError, TypedValue};
use crate::exchange::GatewayExchange;

/// Failure reported by a user transform function.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct TransformError {
    message: String,
    #[source]
    source: Option<BoxError>,
}

impl TransformError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self {
            message: message.into(),
            source: Some(source.into()),
        }
    }
}

/// Deferred result of a transform invocation.
pub type TransformFuture = BoxFuture<'static, Result<TypedValue, TransformError>>;

type TransformFn = dyn Fn(&GatewayExchange, TypedValue) -> TransformFuture + Send + Sync;

/// Input type, output type and function of a response-body rewrite.
///
/// The function sees the exchange synchronously and returns a future that
/// owns everything it needs; the filter awaits it without blocking.
#[derive(Clone)]
pub struct TransformSpec {
    input: BodyType,
    output: BodyType,
    content_type: Option<String>,
    function: Arc<TransformFn>,
}

impl TransformSpec {
    pub fn new<F, Fut>(input: BodyType, output: BodyType, f: F) -> Self
    where
        F: Fn(&GatewayExchange, TypedValue) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<TypedValue, TransformError>> + Send + 'static,
    {
        let function: Arc<TransformFn> =
            Arc::new(move |exchange: &GatewayExchange, value: TypedValue| {
                f(exchange, value).boxed()
            });
        Self {
            input,
            output,
            content_type: None,
            function,
        }
    }

    /// Force the content type of the rewritten body.
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn input(&self) -> BodyType {
        self.input
    }

    pub fn output(&self) -> BodyType {
        self.output
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn apply(&self, exchange: &GatewayExchange, value: TypedValue) -> TransformFuture {
        (self.function)(exchange, value)
    }
}

impl fmt::Debug for TransformSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformSpec")
            .field("input", &self.input)
            .field("output", &self.output)
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}
