//! Guest-facing `fetch`.

use std::sync::Arc;

use fetchbridge_core::{BridgeError, BridgeResult};
use fetchbridge_http::{HeadersInit, RequestInit, RequestInput, Request, Response, ResponseInit};
use fetchbridge_promise::{PromiseBridge, Settlement, Work};
use fetchbridge_stream::ByteStreamBridge;

use crate::config::HostConfig;
use crate::io_context::IoContext;
use crate::transport::{FetchRequest, HostTransport};

/// Issues outbound requests on behalf of one guest request.
///
/// Each call builds a [`Request`] from the guest's arguments, holds a
/// fetch token from the [`IoContext`] while the transport runs, and wraps
/// the returned body reader in a [`ByteStreamBridge`].
#[derive(Clone)]
pub struct Fetcher {
    transport: Arc<dyn HostTransport>,
    io: IoContext,
    config: HostConfig,
}

impl Fetcher {
    pub fn new(transport: Arc<dyn HostTransport>, io: IoContext, config: HostConfig) -> Self {
        Self {
            transport,
            io,
            config,
        }
    }

    pub fn io_context(&self) -> &IoContext {
        &self.io
    }

    pub async fn fetch(&self, input: impl Into<RequestInput>, init: RequestInit) -> BridgeResult<Response> {
        let mut request = Request::new(input, init)?;
        if !request.headers().has("user-agent")? {
            request.headers_mut().set("user-agent", self.config.user_agent())?;
        }

        let token = self.io.acquire_fetch_token().await?;
        let outgoing = FetchRequest {
            url: request.url().to_owned(),
            method: request.method().to_owned(),
            headers: request.headers().to_pairs(),
            body: request.body_mut().take_outgoing()?,
        };
        tracing::debug!(url = %outgoing.url, method = %outgoing.method, "outbound fetch");

        let result = self
            .transport
            .do_fetch(outgoing)
            .await
            .map_err(|e| BridgeError::HostOperationFailed(format!("{e:#}")));
        drop(token);
        let result = result?;
        tracing::debug!(url = %request.url(), status = result.status, "fetch completed");

        let body = ByteStreamBridge::with_chunk_size(result.body, self.config.chunk_size());
        let init = ResponseInit {
            status: Some(result.status),
            status_text: Some(result.status_text),
            headers: Some(HeadersInit::Pairs(result.headers)),
        };
        Ok(Response::new(Some(body.into()), init)?.with_url(request.url()))
    }

    /// Callback-style fetch: the outcome settles `settlement` on the guest
    /// event loop.
    pub fn fetch_with(
        &self,
        promises: &PromiseBridge,
        input: RequestInput,
        init: RequestInit,
        settlement: Settlement<Response>,
    ) {
        let fetcher = self.clone();
        let work = Work::pending(async move { fetcher.fetch(input, init).await });
        promises.resolve_with(work, settlement);
    }
}

impl std::fmt::Debug for Fetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fetcher").field("config", &self.config).finish()
    }
}
