//! Size-bounded aggregation of a chunked body.
//!
//! # Responsibilities
//! - Accumulate chunks in arrival order into one contiguous payload
//! - Fail the moment the cumulative size would exceed the configured limit
//! - Release buffered memory immediately on overflow

use bytes::{Bytes, BytesMut};

use crate::body::chunk::Chunk;

/// The buffered body grew past the configured in-memory limit.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("buffered body exceeds limit of {limit} bytes (reached {attempted} bytes)")]
pub struct LimitExceeded {
    /// Configured maximum in bytes.
    pub limit: usize,
    /// Size the body would have reached with the rejected chunk.
    pub attempted: usize,
}

/// Fully buffered body plus its declared content type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregatedBody {
    bytes: Bytes,
    content_type: Option<String>,
}

impl AggregatedBody {
    pub fn new(bytes: impl Into<Bytes>, content_type: Option<String>) -> Self {
        Self {
            bytes: bytes.into(),
            content_type,
        }
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn into_parts(self) -> (Bytes, Option<String>) {
        (self.bytes, self.content_type)
    }
}

/// Accumulating buffer bounded by `limit` bytes.
#[derive(Debug)]
pub struct ByteSink {
    buf: BytesMut,
    limit: usize,
    content_type: Option<String>,
    terminated: bool,
    overflowed: bool,
}

impl ByteSink {
    /// Create a sink for a body declared with `content_type`.
    pub fn new(limit: usize, content_type: Option<String>) -> Self {
        Self {
            buf: BytesMut::new(),
            limit,
            content_type,
            terminated: false,
            overflowed: false,
        }
    }

    /// Append the next chunk.
    ///
    /// # Panics
    /// Panics if called after the last chunk was appended.
    pub fn append(&mut self, chunk: Chunk) -> Result<(), LimitExceeded> {
        assert!(!self.terminated, "chunk appended after the last chunk");

        let attempted = self.buf.len().saturating_add(chunk.len());
        if self.overflowed || attempted > self.limit {
            self.overflowed = true;
            self.buf = BytesMut::new();
            return Err(LimitExceeded {
                limit: self.limit,
                attempted,
            });
        }

        self.terminated = chunk.is_last();
        self.buf.extend_from_slice(chunk.bytes());
        Ok(())
    }

    /// Bytes buffered so far.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Hand out the aggregated payload.
    ///
    /// # Panics
    /// Panics if the terminating chunk has not been appended yet.
    pub fn finish(self) -> AggregatedBody {
        assert!(
            self.terminated,
            "ByteSink::finish called before the last chunk"
        );
        AggregatedBody {
            bytes: self.buf.freeze(),
            content_type: self.content_type,
        }
    }
}
