use std::fmt;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use fetchbridge_core::{BridgeError, BridgeResult};
use futures_core::Stream;

use crate::guard::HostHandle;
use crate::reader::HostReader;
use crate::ByteStream;

/// Observable lifecycle of a [`ByteStreamBridge`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    /// Waiting for the consumer to ask for bytes.
    Idle,
    /// One host read is outstanding.
    Pulling,
    /// The host reported end of stream.
    Closed,
    /// The consumer abandoned the stream.
    Canceled,
    /// A host read failed.
    Errored,
}

/// An in-flight host read. The handle travels inside the future, so a
/// second read cannot be started until this one hands it back.
type PullFuture = Pin<Box<dyn Future<Output = (HostHandle, BytesMut, io::Result<usize>)> + Send>>;

enum State {
    Idle(HostHandle),
    Pulling(PullFuture),
    Closed,
    Canceled,
    Errored(BridgeError),
}

/// Adapts a [`HostReader`] into a lazily pulled, backpressured byte stream.
///
/// Bytes are only requested from the host when the consumer asks for them,
/// either through a caller-supplied view ([`read_into`](Self::read_into)) or
/// through the [`Stream`] implementation, which allocates
/// [`chunk_size`](Self::chunk_size) bytes per pull.
///
/// The host resource is released exactly once: on a zero-length read, on
/// [`cancel`](Self::cancel), on a read error, or when the bridge is
/// dropped. A read that completes after cancellation is discarded.
pub struct ByteStreamBridge {
    id: u64,
    chunk_size: usize,
    state: State,
    /// Bytes from a read that overshot a smaller follow-up view.
    leftover: Bytes,
    error_yielded: bool,
}

impl ByteStreamBridge {
    /// Wrap `reader`, pulling its preferred chunk size per read.
    pub fn new(reader: impl HostReader + 'static) -> Self {
        let chunk_size = reader.preferred_chunk_size();
        Self::with_chunk_size(reader, chunk_size)
    }

    /// Wrap `reader`, pulling `chunk_size` bytes per read.
    pub fn with_chunk_size(reader: impl HostReader + 'static, chunk_size: usize) -> Self {
        assert!(chunk_size > 0, "chunk_size must be > 0");
        let handle = HostHandle::new(Box::new(reader));
        tracing::debug!(stream = handle.id(), chunk_size, "byte stream bridge opened");
        Self {
            id: handle.id(),
            chunk_size,
            state: State::Idle(handle),
            leftover: Bytes::new(),
            error_yielded: false,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn state(&self) -> BridgeState {
        match self.state {
            State::Idle(_) => BridgeState::Idle,
            State::Pulling(_) => BridgeState::Pulling,
            State::Closed => BridgeState::Closed,
            State::Canceled => BridgeState::Canceled,
            State::Errored(_) => BridgeState::Errored,
        }
    }

    /// Pull the next chunk of at most [`chunk_size`](Self::chunk_size) bytes.
    ///
    /// Returns `Ok(None)` once the stream has ended or been canceled.
    pub async fn pull(&mut self) -> BridgeResult<Option<Bytes>> {
        let size = self.chunk_size;
        std::future::poll_fn(|cx| self.poll_pull(cx, size)).await
    }

    /// Fill `view` with the next bytes of the stream.
    ///
    /// Issues at most one host read, sized to the view. Returns `Ok(0)` once
    /// the stream has ended or been canceled.
    pub async fn read_into(&mut self, view: &mut [u8]) -> BridgeResult<usize> {
        if view.is_empty() {
            return Err(BridgeError::Type("read view must not be empty".into()));
        }
        let size = view.len();
        match std::future::poll_fn(|cx| self.poll_pull(cx, size)).await? {
            Some(chunk) => {
                view[..chunk.len()].copy_from_slice(&chunk);
                Ok(chunk.len())
            }
            None => Ok(0),
        }
    }

    /// Abandon the stream and release the host resource.
    ///
    /// An outstanding read is dropped and its completion discarded.
    /// Canceling a stream that already closed or errored is a no-op.
    pub fn cancel(&mut self) {
        self.leftover = Bytes::new();
        match std::mem::replace(&mut self.state, State::Canceled) {
            State::Idle(mut handle) => {
                handle.release("canceled");
            }
            State::Pulling(in_flight) => {
                tracing::debug!(stream = self.id, "canceled with a read outstanding");
                drop(in_flight);
            }
            finished @ (State::Closed | State::Errored(_)) => {
                self.state = finished;
            }
            State::Canceled => {}
        }
    }

    /// Box the bridge as a type-erased [`ByteStream`].
    pub fn into_byte_stream(self) -> ByteStream {
        Box::pin(self)
    }

    fn start_read(mut handle: HostHandle, size: usize) -> PullFuture {
        Box::pin(async move {
            let mut buf = BytesMut::zeroed(size);
            let result = handle.read_into(&mut buf[..]).await;
            (handle, buf, result)
        })
    }

    fn poll_pull(&mut self, cx: &mut Context<'_>, size: usize) -> Poll<BridgeResult<Option<Bytes>>> {
        if !self.leftover.is_empty() {
            let n = size.min(self.leftover.len());
            return Poll::Ready(Ok(Some(self.leftover.split_to(n))));
        }

        loop {
            match std::mem::replace(&mut self.state, State::Closed) {
                State::Idle(handle) => {
                    tracing::trace!(stream = self.id, size, "requesting host read");
                    self.state = State::Pulling(Self::start_read(handle, size));
                }
                State::Pulling(mut in_flight) => {
                    let (mut handle, mut buf, result) = match in_flight.as_mut().poll(cx) {
                        Poll::Ready(done) => done,
                        Poll::Pending => {
                            self.state = State::Pulling(in_flight);
                            return Poll::Pending;
                        }
                    };
                    let result = match result {
                        Ok(n) if n > buf.len() => Err(io::Error::new(
                            io::ErrorKind::InvalidData,
                            format!("host reader reported {n} bytes for a {}-byte buffer", buf.len()),
                        )),
                        other => other,
                    };
                    return Poll::Ready(match result {
                        Ok(0) => {
                            handle.release("end of stream");
                            Ok(None)
                        }
                        Ok(n) => {
                            buf.truncate(n);
                            self.state = State::Idle(handle);
                            let mut chunk = buf.freeze();
                            if chunk.len() > size {
                                self.leftover = chunk.split_off(size);
                            }
                            Ok(Some(chunk))
                        }
                        Err(e) => {
                            handle.release("read error");
                            let err = BridgeError::host(e);
                            tracing::debug!(stream = self.id, error = %err, "host read failed");
                            self.state = State::Errored(err.clone());
                            Err(err)
                        }
                    });
                }
                State::Closed => return Poll::Ready(Ok(None)),
                State::Canceled => {
                    self.state = State::Canceled;
                    return Poll::Ready(Ok(None));
                }
                State::Errored(err) => {
                    self.state = State::Errored(err.clone());
                    return Poll::Ready(Err(err));
                }
            }
        }
    }
}

impl Stream for ByteStreamBridge {
    type Item = BridgeResult<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.error_yielded {
            return Poll::Ready(None);
        }
        let size = this.chunk_size;
        match this.poll_pull(cx, size) {
            Poll::Ready(Ok(chunk)) => Poll::Ready(chunk.map(Ok)),
            Poll::Ready(Err(e)) => {
                this.error_yielded = true;
                Poll::Ready(Some(Err(e)))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl fmt::Debug for ByteStreamBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByteStreamBridge")
            .field("id", &self.id)
            .field("chunk_size", &self.chunk_size)
            .field("state", &self.state())
            .finish()
    }
}
