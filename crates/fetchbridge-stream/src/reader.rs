//! Host reader contract and adapters for common Rust I/O sources.

use std::future::Future;
use std::io::{self, Read};
use std::pin::Pin;

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::DEFAULT_CHUNK_SIZE;

/// Boxed future returned by [`HostReader::read_into`].
pub type ReadFuture<'a> = Pin<Box<dyn Future<Output = io::Result<usize>> + Send + 'a>>;

/// A host-owned, pull-based byte source.
///
/// The bridge guarantees it never calls `read_into` again before the
/// previous future has completed or been dropped, and calls `close` at
/// most once, so implementations need not be reentrant.
pub trait HostReader: Send {
    /// Fill `buf` from the front and report how many bytes were written.
    /// `Ok(0)` signals end of stream.
    fn read_into<'a>(&'a mut self, buf: &'a mut [u8]) -> ReadFuture<'a>;

    /// Release the host-side resource.
    fn close(&mut self);

    /// Buffer size the bridge allocates when the consumer does not supply one.
    fn preferred_chunk_size(&self) -> usize {
        DEFAULT_CHUNK_SIZE
    }
}

impl<R: HostReader + ?Sized> HostReader for Box<R> {
    fn read_into<'a>(&'a mut self, buf: &'a mut [u8]) -> ReadFuture<'a> {
        (**self).read_into(buf)
    }

    fn close(&mut self) {
        (**self).close()
    }

    fn preferred_chunk_size(&self) -> usize {
        (**self).preferred_chunk_size()
    }
}

type CloseHook = Box<dyn FnOnce() + Send>;

/// Adapts a blocking [`std::io::Read`] into a [`HostReader`].
///
/// Each read runs on tokio's blocking pool and its result is handed back
/// to the awaiting task. If the awaiting future is dropped mid-read, the
/// worker's result (and the inner reader with it) is discarded.
pub struct BlockingReader<R> {
    inner: Option<R>,
    chunk_size: usize,
    on_close: Option<CloseHook>,
}

impl<R: Read + Send + 'static> BlockingReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner: Some(inner),
            chunk_size: DEFAULT_CHUNK_SIZE,
            on_close: None,
        }
    }

    /// Builder method: set the preferred chunk size.
    pub fn with_chunk_size(self, chunk_size: usize) -> Self {
        Self { chunk_size, ..self }
    }

    /// Builder method: run `hook` when the resource is closed.
    pub fn on_close(self, hook: impl FnOnce() + Send + 'static) -> Self {
        Self {
            on_close: Some(Box::new(hook)),
            ..self
        }
    }
}

fn read_retrying<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    loop {
        match reader.read(buf) {
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            other => return other,
        }
    }
}

fn closed_error() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "host reader already closed")
}

impl<R: Read + Send + 'static> HostReader for BlockingReader<R> {
    fn read_into<'a>(&'a mut self, buf: &'a mut [u8]) -> ReadFuture<'a> {
        Box::pin(async move {
            let mut inner = self.inner.take().ok_or_else(closed_error)?;
            let len = buf.len();
            let (inner, scratch, result) = tokio::task::spawn_blocking(move || {
                let mut scratch = vec![0u8; len];
                let result = read_retrying(&mut inner, &mut scratch);
                (inner, scratch, result)
            })
            .await
            .map_err(io::Error::other)?;
            self.inner = Some(inner);

            let n = result?.min(len);
            buf[..n].copy_from_slice(&scratch[..n]);
            Ok(n)
        })
    }

    fn close(&mut self) {
        self.inner = None;
        if let Some(hook) = self.on_close.take() {
            hook();
        }
    }

    fn preferred_chunk_size(&self) -> usize {
        self.chunk_size
    }
}

/// Adapts a [`tokio::io::AsyncRead`] into a [`HostReader`].
pub struct AsyncReadReader<R> {
    inner: Option<R>,
    chunk_size: usize,
    on_close: Option<CloseHook>,
}

impl<R: AsyncRead + Unpin + Send> AsyncReadReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner: Some(inner),
            chunk_size: DEFAULT_CHUNK_SIZE,
            on_close: None,
        }
    }

    /// Builder method: set the preferred chunk size.
    pub fn with_chunk_size(self, chunk_size: usize) -> Self {
        Self { chunk_size, ..self }
    }

    /// Builder method: run `hook` when the resource is closed.
    pub fn on_close(self, hook: impl FnOnce() + Send + 'static) -> Self {
        Self {
            on_close: Some(Box::new(hook)),
            ..self
        }
    }
}

impl<R: AsyncRead + Unpin + Send> HostReader for AsyncReadReader<R> {
    fn read_into<'a>(&'a mut self, buf: &'a mut [u8]) -> ReadFuture<'a> {
        Box::pin(async move {
            match self.inner.as_mut() {
                Some(inner) => inner.read(buf).await,
                None => Err(closed_error()),
            }
        })
    }

    fn close(&mut self) {
        self.inner = None;
        if let Some(hook) = self.on_close.take() {
            hook();
        }
    }

    fn preferred_chunk_size(&self) -> usize {
        self.chunk_size
    }
}
