//! Backend client subsystem.
//!
//! # Data Flow
//! ```text
//! end of filter chain (Next::run with no filters left)
//!     → Backend::call(exchange)
//!     → client.rs (hyper-util client, target from the matched route)
//!     → status/headers written to the exchange, body returned as BodySequence
//! ```
//!
//! # Design Decisions
//! - The chain only sees the `Backend` trait; the HTTP client is swappable
//! - A backend never buffers: the body comes back as a lazy sequence

pub mod client;

use async_trait::async_trait;

use crate::body::BodySequence;
use crate::error::GatewayResult;
use crate::exchange::GatewayExchange;

pub use client::HttpBackend;

/// Upstream producer invoked when the chain reaches its end.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Forward the exchange's request.
    ///
    /// Implementations write the response status and headers onto the
    /// exchange and return the response body.
    async fn call(&self, exchange: &mut GatewayExchange) -> GatewayResult<BodySequence>;
}
