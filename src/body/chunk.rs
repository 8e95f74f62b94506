//! Chunks and single-consumption body sequences.
//!
//! # Design Decisions
//! - A `Chunk` is an immutable `Bytes` view; cloning never copies payload
//! - A `BodySequence` terminates with exactly one last chunk or one error
//! - Sources that end without marking a last chunk get an empty one synthesized

use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_util::stream::{self, BoxStream, Stream, StreamExt};
use http_body_util::BodyExt;

/// Boxed error type carried by body sources.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Failure reported by a body source before it completed.
#[derive(Debug, thiserror::Error)]
#[error("body stream failed: {source}")]
pub struct BodyError {
    #[source]
    source: BoxError,
}

impl BodyError {
    pub fn new(source: impl Into<BoxError>) -> Self {
        Self {
            source: source.into(),
        }
    }
}

/// One unit of a streamed binary body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    data: Bytes,
    last: bool,
}

impl Chunk {
    /// A chunk in the middle of a body.
    pub fn data(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            last: false,
        }
    }

    /// The terminating chunk of a body.
    pub fn last(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            last: true,
        }
    }

    pub fn bytes(&self) -> &Bytes {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn is_last(&self) -> bool {
        self.last
    }

    pub fn into_bytes(self) -> Bytes {
        self.data
    }
}

/// Ordered, single-consumption stream of chunks forming one message body.
///
/// Yields `Ok(Chunk)` items in arrival order. The final item is either a
/// chunk with [`Chunk::is_last`] set or an `Err`, after which the sequence is
/// exhausted.
pub struct BodySequence {
    inner: BoxStream<'static, Result<Chunk, BodyError>>,
    terminated: bool,
}

impl BodySequence {
    /// Wrap a raw chunk stream.
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<Chunk, BodyError>> + Send + 'static,
    {
        Self {
            inner: stream.boxed(),
            terminated: false,
        }
    }

    /// A body consisting of a single terminating chunk.
    pub fn once(data: impl Into<Bytes>) -> Self {
        Self::from_stream(stream::once(futures_util::future::ready(Ok(
            Chunk::last(data),
        ))))
    }

    /// An empty body.
    pub fn empty() -> Self {
        Self::once(Bytes::new())
    }

    /// Adapt an `http_body::Body` (hyper's `Incoming`, axum's `Body`).
    ///
    /// Trailers are dropped; every data frame becomes one chunk.
    pub fn from_body<B>(body: B) -> Self
    where
        B: http_body::Body<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        let chunks = body
            .into_data_stream()
            .map(|frame| frame.map(Chunk::data).map_err(BodyError::new));
        Self::from_stream(chunks)
    }

    /// Convert into an axum body that streams the chunks to the caller.
    pub fn into_axum_body(self) -> axum::body::Body {
        axum::body::Body::from_stream(self.map(|item| item.map(Chunk::into_bytes)))
    }
}

impl Stream for BodySequence {
    type Item = Result<Chunk, BodyError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.terminated {
            return Poll::Ready(None);
        }
        match self.inner.as_mut().poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                if chunk.is_last() {
                    self.terminated = true;
                }
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(e))) => {
                self.terminated = true;
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                self.terminated = true;
                Poll::Ready(Some(Ok(Chunk::last(Bytes::new()))))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl fmt::Debug for BodySequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BodySequence")
            .field("terminated", &self.terminated)
            .finish_non_exhaustive()
    }
}
