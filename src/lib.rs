//! Response-body rewriting API gateway.
//!
//! Requests are matched to routes, run through the route's filter chain and
//! forwarded to a backend. Filters may rewrite the request on the way in and
//! the response on the way out; `ModifyResponseBodyFilter` buffers, decodes,
//! transforms and re-encodes the response body.

// Core pipeline
pub mod backend;
pub mod body;
pub mod error;
pub mod exchange;
pub mod filter;

// Serving
pub mod config;
pub mod http;
pub mod routing;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use body::{BodyType, TypedValue};
pub use config::GatewayConfig;
pub use error::{GatewayError, GatewayResult};
pub use exchange::GatewayExchange;
pub use filter::{
    FilterChain, GatewayFilter, ModifyResponseBodyFilter, ShortCircuitFilter, TransformSpec,
};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use routing::{RouteBuilder, RouteTable};
