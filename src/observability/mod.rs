//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! server, filters, backend client produce:
//!     → logging.rs (structured tracing events, request_id on every event)
//!     → metrics.rs (request counters, latency histogram, rewrite outcomes)
//!
//! Consumers:
//!     → stdout (pretty or JSON lines)
//!     → Prometheus scrape endpoint (optional)
//! ```
//!
//! # Design Decisions
//! - Request ID flows through all subsystems as a structured field
//! - Metrics go through the `metrics` facade; recording without an installed
//!   exporter is a no-op, so tests need no setup

pub mod logging;
pub mod metrics;
