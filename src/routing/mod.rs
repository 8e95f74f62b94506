//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (host, path)
//!     → router.rs (route lookup)
//!     → matcher.rs (evaluate match conditions)
//!     → Return: matched Route (target URI + filter chain) or no match
//!
//! Route Compilation (at startup):
//!     RouteConfig[] / RouteBuilder[]
//!     → Build filter chains
//!     → Sort by priority
//!     → Freeze as immutable RouteTable
//! ```
//!
//! # Design Decisions
//! - Routes compiled at startup, immutable at runtime
//! - No regex in hot path (prefix matching only)
//! - First match wins (ordered by priority, then declaration order)

pub mod matcher;
pub mod router;

pub use matcher::{AndMatcher, HostMatcher, Matcher, PathPrefixMatcher};
pub use router::{build_filter, parse_target, Route, RouteBuilder, RouteError, RouteTable};
