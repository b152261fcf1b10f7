//! The host's network collaborator.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use fetchbridge_http::OutgoingBody;
use fetchbridge_stream::HostReader;

/// An outbound request as handed to the host.
#[derive(Debug)]
pub struct FetchRequest {
    pub url: String,
    pub method: String,
    pub headers: Vec<(String, String)>,
    pub body: OutgoingBody,
}

/// What the host returns for a completed fetch. The body is a pull-based
/// reader that the runtime wraps in a byte-stream bridge.
pub struct FetchResult {
    pub status: u16,
    pub status_text: String,
    pub headers: Vec<(String, String)>,
    pub body: Box<dyn HostReader>,
}

pub type TransportFuture<'a> = Pin<Box<dyn Future<Output = anyhow::Result<FetchResult>> + Send + 'a>>;

/// Performs the actual network call.
///
/// Implementations own connection handling; the runtime only sees the
/// response head and a reader for the body.
pub trait HostTransport: Send + Sync {
    fn do_fetch(&self, request: FetchRequest) -> TransportFuture<'_>;
}

impl<T: HostTransport + ?Sized> HostTransport for Arc<T> {
    fn do_fetch(&self, request: FetchRequest) -> TransportFuture<'_> {
        (**self).do_fetch(request)
    }
}
