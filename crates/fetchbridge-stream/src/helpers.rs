//! Small ready-made [`ByteStream`] sources.

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use fetchbridge_core::{BridgeError, BridgeResult};
use futures_core::Stream;

use crate::ByteStream;

/// A stream that yields a single chunk then ends.
///
/// An empty chunk is skipped so consumers never see zero-length items.
pub struct OnceStream(Option<Bytes>);

impl OnceStream {
    pub fn new(chunk: Bytes) -> Self {
        Self((!chunk.is_empty()).then_some(chunk))
    }

    pub fn boxed(chunk: Bytes) -> ByteStream {
        Box::pin(Self::new(chunk))
    }
}

impl Stream for OnceStream {
    type Item = BridgeResult<Bytes>;

    fn poll_next(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Poll::Ready(self.get_mut().0.take().map(Ok))
    }
}

/// A stream that slices one buffer into fixed-size chunks.
pub struct ChunkedStream {
    buf: Bytes,
    chunk_size: usize,
}

impl ChunkedStream {
    pub fn new(buf: Bytes, chunk_size: usize) -> Self {
        assert!(chunk_size > 0, "chunk_size must be > 0");
        Self { buf, chunk_size }
    }

    pub fn boxed(buf: Bytes, chunk_size: usize) -> ByteStream {
        Box::pin(Self::new(buf, chunk_size))
    }
}

impl Stream for ChunkedStream {
    type Item = BridgeResult<Bytes>;

    fn poll_next(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.buf.is_empty() {
            return Poll::Ready(None);
        }
        let n = this.chunk_size.min(this.buf.len());
        Poll::Ready(Some(Ok(this.buf.split_to(n))))
    }
}

/// A stream that ends immediately.
pub struct EmptyStream;

impl EmptyStream {
    pub fn boxed() -> ByteStream {
        Box::pin(Self)
    }
}

impl Stream for EmptyStream {
    type Item = BridgeResult<Bytes>;

    fn poll_next(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Poll::Ready(None)
    }
}

/// A stream that yields one error then ends.
pub struct FailedStream(Option<BridgeError>);

impl FailedStream {
    pub fn new(err: BridgeError) -> Self {
        Self(Some(err))
    }

    pub fn boxed(err: BridgeError) -> ByteStream {
        Box::pin(Self::new(err))
    }
}

impl Stream for FailedStream {
    type Item = BridgeResult<Bytes>;

    fn poll_next(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Poll::Ready(self.get_mut().0.take().map(Err))
    }
}
