//! Runtime wiring: one event loop and promise bridge shared by every
//! request, and a fresh I/O scope per request.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use fetchbridge_core::BridgeResult;
use fetchbridge_http::{Request, Response, ResponseParts};
use fetchbridge_promise::{Completion, EventLoop, PromiseBridge, Work};
use tokio::task::JoinHandle;

use crate::config::HostConfig;
use crate::fetch::Fetcher;
use crate::io_context::IoContext;
use crate::transport::HostTransport;

/// What a guest handler receives: the inbound request and a `fetch`
/// bound to this request's I/O scope.
#[derive(Debug)]
pub struct GuestRequest {
    pub request: Request,
    pub fetch: Fetcher,
}

impl GuestRequest {
    /// Keep this request's I/O scope open until `work` finishes, even
    /// after the handler's response has been returned.
    ///
    /// `work` runs on its own task. Its outcome only reaches the log; a
    /// rejection does not affect the response.
    pub fn wait_until(&self, work: impl Future<Output = BridgeResult<()>> + Send + 'static) -> BridgeResult<()> {
        let guard = self.fetch.io_context().extend()?;
        tokio::spawn(async move {
            if let Err(err) = work.await {
                tracing::debug!(error = %err, "background work rejected");
            }
            drop(guard);
        });
        Ok(())
    }
}

/// A guest request handler.
///
/// Runs on the event loop and returns either a finished response, a
/// thrown error, or a response still being produced.
pub trait Handler: Send + Sync + 'static {
    fn call(&self, request: GuestRequest) -> Completion<Response>;
}

impl<F> Handler for F
where
    F: Fn(GuestRequest) -> Completion<Response> + Send + Sync + 'static,
{
    fn call(&self, request: GuestRequest) -> Completion<Response> {
        self(request)
    }
}

pub struct Runtime {
    config: HostConfig,
    transport: Arc<dyn HostTransport>,
    promises: PromiseBridge,
    loop_task: JoinHandle<()>,
}

impl Runtime {
    /// Start the event loop on the current tokio runtime.
    pub fn start(config: HostConfig, transport: Arc<dyn HostTransport>) -> Self {
        let (event_loop, loop_task) = EventLoop::spawn();
        tracing::info!(
            chunk_size = config.chunk_size(),
            max_concurrent_fetches = config.max_concurrent_fetches(),
            "fetchbridge runtime started"
        );
        Self {
            config,
            transport,
            promises: PromiseBridge::new(event_loop),
            loop_task,
        }
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    pub fn promises(&self) -> &PromiseBridge {
        &self.promises
    }

    pub fn event_loop(&self) -> &EventLoop {
        self.promises.event_loop()
    }

    /// A fetcher with its own I/O scope, for host code outside a handler.
    pub fn fetcher(&self) -> Fetcher {
        Fetcher::new(
            self.transport.clone(),
            IoContext::new(self.config.max_concurrent_fetches()),
            self.config.clone(),
        )
    }

    /// Run `handler` for `request` and return the response for the host to
    /// write out.
    ///
    /// A throw, a panic and an asynchronous rejection inside the handler
    /// all come back as the same `Err`. Once the handler has settled, the
    /// request's I/O scope is released in the background: background work
    /// registered with [`GuestRequest::wait_until`] may outlive the
    /// returned response.
    pub async fn handle(&self, handler: Arc<dyn Handler>, request: Request) -> BridgeResult<ResponseParts> {
        let fetch = self.fetcher();
        let io = fetch.io_context().clone();
        tracing::debug!(url = %request.url(), method = %request.method(), "dispatching request");

        let url = request.url().to_owned();
        let started = Instant::now();
        io.register_cleanup(move || {
            tracing::debug!(%url, elapsed_ms = started.elapsed().as_millis() as u64, "request scope closed");
        });

        let work = Work::invoke(move |guest: GuestRequest| handler.call(guest), GuestRequest { request, fetch });
        let outcome = self.promises.submit(work).await;

        let parts = outcome.and_then(Response::into_parts);
        if let Err(err) = &parts {
            tracing::debug!(error = %err, "handler rejected");
        }
        tokio::spawn(async move { io.release().await });
        parts
    }

    /// Stop the event loop after the jobs already queued.
    pub async fn shutdown(self) {
        self.promises.event_loop().stop();
        if let Err(err) = self.loop_task.await {
            tracing::warn!(error = %err, "event loop task failed");
        }
    }
}
