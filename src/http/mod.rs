//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (axum setup, middleware, catch-all handler)
//!     → request.rs (request ID assigned)
//!     → routing (RouteTable picks route)
//!     → FilterChain::execute against the backend
//!     → response.rs (hop-by-hop headers stripped)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::{MakeRequestUuid, X_REQUEST_ID};
pub use server::{AppState, HttpServer};
