use bytes::Bytes;
use fetchbridge_core::{BridgeError, BridgeResult};
use fetchbridge_stream::ByteStream;
use serde::de::DeserializeOwned;

use crate::body::{Body, BodyFuture, BodyInit};
use crate::headers::{is_method_token, Headers, HeadersInit};

const STANDARD_METHODS: [&str; 6] = ["DELETE", "GET", "HEAD", "OPTIONS", "POST", "PUT"];

/// Upper-case the standard method names and validate the rest as tokens.
fn normalize_method(method: &str) -> BridgeResult<String> {
    if !is_method_token(method) {
        return Err(BridgeError::Type(format!("invalid HTTP method: {method:?}")));
    }
    let upper = method.to_ascii_uppercase();
    if STANDARD_METHODS.contains(&upper.as_str()) {
        Ok(upper)
    } else {
        Ok(method.to_owned())
    }
}

/// Where a [`Request`] takes its defaults from.
#[derive(Debug)]
pub enum RequestInput {
    Url(String),
    /// Copy url, method and headers, and take over the body.
    Request(Request),
}

impl From<&str> for RequestInput {
    fn from(url: &str) -> Self {
        RequestInput::Url(url.to_owned())
    }
}

impl From<String> for RequestInput {
    fn from(url: String) -> Self {
        RequestInput::Url(url)
    }
}

impl From<Request> for RequestInput {
    fn from(request: Request) -> Self {
        RequestInput::Request(request)
    }
}

/// Optional overrides applied on top of a [`RequestInput`].
#[derive(Debug, Default)]
pub struct RequestInit {
    pub method: Option<String>,
    pub headers: Option<HeadersInit>,
    pub body: Option<BodyInit>,
}

impl RequestInit {
    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    pub fn headers(mut self, headers: impl Into<HeadersInit>) -> Self {
        self.headers = Some(headers.into());
        self
    }

    pub fn body(mut self, body: impl Into<BodyInit>) -> Self {
        self.body = Some(body.into());
        self
    }
}

/// A guest-visible request: url, method, headers and a once-only body.
#[derive(Debug)]
pub struct Request {
    url: String,
    method: String,
    headers: Headers,
    body: Body,
}

impl Request {
    /// Build a request from a url or another request plus overrides.
    ///
    /// Fails with [`BridgeError::AlreadyConsumed`] if the input request's
    /// body was already read, and with [`BridgeError::BodyNotAllowed`] if
    /// the resulting method is GET or HEAD and a body is present.
    pub fn new(input: impl Into<RequestInput>, init: RequestInit) -> BridgeResult<Self> {
        let (url, inherited_method, inherited_headers, inherited_body) = match input.into() {
            RequestInput::Url(url) => (url, None, None, None),
            RequestInput::Request(source) => {
                if source.body.is_used() {
                    return Err(BridgeError::AlreadyConsumed);
                }
                (source.url, Some(source.method), Some(source.headers), Some(source.body))
            }
        };

        let method = match init.method.as_deref().or(inherited_method.as_deref()) {
            Some(m) => normalize_method(m)?,
            None => "GET".to_owned(),
        };

        let mut headers = match (init.headers, inherited_headers) {
            (Some(h), _) => Headers::from_init(h)?,
            (None, Some(h)) => h,
            (None, None) => Headers::new(),
        };

        let body = match (init.body, inherited_body) {
            (Some(b), _) => Body::new(b),
            (None, Some(b)) => b,
            (None, None) => Body::empty(),
        };

        if body.has_content() && (method == "GET" || method == "HEAD") {
            return Err(BridgeError::BodyNotAllowed(method));
        }

        if let Some(mime) = body.mime_hint() {
            if !headers.has("content-type")? {
                headers.set("content-type", mime)?;
            }
        }

        Ok(Self {
            url,
            method,
            headers,
            body,
        })
    }

    /// Shorthand for a GET request with no overrides.
    pub fn get(url: impl Into<String>) -> BridgeResult<Self> {
        Self::new(RequestInput::Url(url.into()), RequestInit::default())
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn method(&self) -> &str {
        &self.method
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

    /// Duplicate this request; see [`Body::try_clone`].
    pub fn try_clone(&mut self) -> BridgeResult<Request> {
        Ok(Self {
            url: self.url.clone(),
            method: self.method.clone(),
            headers: self.headers.clone(),
            body: self.body.try_clone()?,
        })
    }
}
