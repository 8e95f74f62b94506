//! Message body handling.
//!
//! # Data Flow
//! ```text
//! backend body (http_body::Body)
//!     → chunk.rs (BodySequence of Chunks, single consumption)
//!     → sink.rs (ByteSink, bounded aggregation → AggregatedBody)
//!     → codec.rs (decode to TypedValue / encode back to AggregatedBody)
//!     → BodySequence::once → caller
//! ```
//!
//! Bodies that are not rewritten never leave the `BodySequence` form.

pub mod chunk;
pub mod codec;
pub mod sink;

pub use chunk::{BodyError, BodySequence, BoxError, Chunk};
pub use codec::{BodyCodec, BodyType, DecodeError, EncodeError, TypedValue};
pub use sink::{AggregatedBody, ByteSink, LimitExceeded};
