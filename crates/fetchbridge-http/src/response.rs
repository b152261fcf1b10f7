use bytes::Bytes;
use fetchbridge_core::{BridgeError, BridgeResult};
use fetchbridge_stream::ByteStream;
use serde::de::DeserializeOwned;

use crate::body::{Body, BodyFuture, BodyInit, OutgoingBody};
use crate::headers::{Headers, HeadersInit};

const REDIRECT_STATUSES: [u16; 5] = [301, 302, 303, 307, 308];

/// Optional metadata for [`Response::new`].
#[derive(Debug, Default)]
pub struct ResponseInit {
    pub status: Option<u16>,
    pub status_text: Option<String>,
    pub headers: Option<HeadersInit>,
}

impl ResponseInit {
    pub fn status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn status_text(mut self, status_text: impl Into<String>) -> Self {
        self.status_text = Some(status_text.into());
        self
    }

    pub fn headers(mut self, headers: impl Into<HeadersInit>) -> Self {
        self.headers = Some(headers.into());
        self
    }
}

/// Host-facing view of a finished response.
#[derive(Debug)]
pub struct ResponseParts {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: OutgoingBody,
}

/// A guest-visible response.
///
/// `status` defaults to 200 and `ok` is derived from it. Like
/// [`Request`](crate::Request), the body reads exactly once.
#[derive(Debug)]
pub struct Response {
    status: u16,
    status_text: String,
    headers: Headers,
    body: Body,
    url: String,
}

impl Response {
    pub fn new(body: Option<BodyInit>, init: ResponseInit) -> BridgeResult<Self> {
        let mut headers = match init.headers {
            Some(h) => Headers::from_init(h)?,
            None => Headers::new(),
        };
        let body = body.map(Body::new).unwrap_or_default();
        if let Some(mime) = body.mime_hint() {
            if !headers.has("content-type")? {
                headers.set("content-type", mime)?;
            }
        }
        Ok(Self {
            status: init.status.unwrap_or(200),
            status_text: init.status_text.unwrap_or_default(),
            headers,
            body,
            url: String::new(),
        })
    }

    /// A bodiless redirect to `url`.
    ///
    /// Only 301, 302, 303, 307 and 308 are accepted; anything else fails
    /// with [`BridgeError::InvalidStatus`].
    pub fn redirect(url: &str, status: u16) -> BridgeResult<Self> {
        if !REDIRECT_STATUSES.contains(&status) {
            return Err(BridgeError::InvalidStatus(status));
        }
        Self::new(None, ResponseInit::default().status(status).headers([("location", url)]))
    }

    /// Attach the url this response was fetched from.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn status_text(&self) -> &str {
        &self.status_text
    }

    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    pub fn body_mut(&mut self) -> &mut Body {
        &mut self.body
    }

    pub fn body_used(&self) -> bool {
        self.body.is_used()
    }

    pub fn text(&mut self) -> BodyFuture<String> {
        self.body.text()
    }

    pub fn bytes(&mut self) -> BodyFuture<Bytes> {
        self.body.bytes()
    }

    pub fn json<T: DeserializeOwned + Send + 'static>(&mut self) -> BodyFuture<T> {
        self.body.json()
    }

    pub fn stream(&mut self) -> ByteStream {
        self.body.stream()
    }

    /// Duplicate this response; see [`Body::try_clone`].
    pub fn try_clone(&mut self) -> BridgeResult<Response> {
        Ok(Self {
            status: self.status,
            status_text: self.status_text.clone(),
            headers: self.headers.clone(),
            body: self.body.try_clone()?,
            url: self.url.clone(),
        })
    }

    /// Split into status, flattened headers and the outgoing body.
    pub fn into_parts(mut self) -> BridgeResult<ResponseParts> {
        let body = self.body.take_outgoing()?;
        Ok(ResponseParts {
            status: self.status,
            headers: self.headers.to_pairs(),
            body,
        })
    }
}
