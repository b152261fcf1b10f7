use std::fmt;
use std::future::Future;
use std::pin::Pin;

use bytes::{Bytes, BytesMut};
use fetchbridge_core::{BridgeError, BridgeResult};
use fetchbridge_stream::helpers::{EmptyStream, FailedStream, OnceStream};
use fetchbridge_stream::{tee, ByteStream, ByteStreamBridge};
use futures_core::Stream;
use serde::de::DeserializeOwned;

pub const MIME_TEXT: &str = "text/plain;charset=UTF-8";
pub const MIME_FORM: &str = "application/x-www-form-urlencoded;charset=UTF-8";
pub const MIME_OCTET_STREAM: &str = "application/octet-stream";

/// Future returned by the consuming [`Body`] accessors.
pub type BodyFuture<T> = Pin<Box<dyn Future<Output = BridgeResult<T>> + Send>>;

/// What a body can be constructed from.
pub enum BodyInit {
    Bytes(Bytes),
    Text(String),
    /// URL-encoded form fields, serialized at construction.
    Form(Vec<(String, String)>),
    Stream(ByteStream),
}

impl BodyInit {
    /// Build a form body from `(name, value)` pairs.
    pub fn form<K, V>(fields: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        BodyInit::Form(
            fields
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl From<&str> for BodyInit {
    fn from(text: &str) -> Self {
        BodyInit::Text(text.to_owned())
    }
}

impl From<String> for BodyInit {
    fn from(text: String) -> Self {
        BodyInit::Text(text)
    }
}

impl From<Bytes> for BodyInit {
    fn from(bytes: Bytes) -> Self {
        BodyInit::Bytes(bytes)
    }
}

impl From<Vec<u8>> for BodyInit {
    fn from(bytes: Vec<u8>) -> Self {
        BodyInit::Bytes(bytes.into())
    }
}

impl From<ByteStream> for BodyInit {
    fn from(stream: ByteStream) -> Self {
        BodyInit::Stream(stream)
    }
}

impl From<ByteStreamBridge> for BodyInit {
    fn from(bridge: ByteStreamBridge) -> Self {
        BodyInit::Stream(bridge.into_byte_stream())
    }
}

impl fmt::Debug for BodyInit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BodyInit::Bytes(b) => f.debug_tuple("Bytes").field(&b.len()).finish(),
            BodyInit::Text(t) => f.debug_tuple("Text").field(&t.len()).finish(),
            BodyInit::Form(fields) => f.debug_tuple("Form").field(&fields.len()).finish(),
            BodyInit::Stream(_) => f.write_str("Stream"),
        }
    }
}

/// A consumed body handed to the host for writing out.
pub enum OutgoingBody {
    Empty,
    Bytes(Bytes),
    Stream(ByteStream),
}

impl OutgoingBody {
    pub fn is_empty(&self) -> bool {
        matches!(self, OutgoingBody::Empty)
    }

    pub fn into_stream(self) -> ByteStream {
        match self {
            OutgoingBody::Empty => EmptyStream::boxed(),
            OutgoingBody::Bytes(b) => OnceStream::boxed(b),
            OutgoingBody::Stream(s) => s,
        }
    }

    /// Collect the whole body in memory.
    pub async fn into_bytes(self) -> BridgeResult<Bytes> {
        match self {
            OutgoingBody::Empty => Ok(Bytes::new()),
            OutgoingBody::Bytes(b) => Ok(b),
            OutgoingBody::Stream(s) => drain(s).await,
        }
    }
}

impl fmt::Debug for OutgoingBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutgoingBody::Empty => f.write_str("Empty"),
            OutgoingBody::Bytes(b) => f.debug_tuple("Bytes").field(&b.len()).finish(),
            OutgoingBody::Stream(_) => f.write_str("Stream"),
        }
    }
}

enum Source {
    Empty,
    Bytes(Bytes),
    Text(String),
    Stream(ByteStream),
}

/// A message body that can be consumed exactly once.
///
/// Every consuming accessor ([`text`](Body::text), [`bytes`](Body::bytes),
/// [`json`](Body::json), [`stream`](Body::stream),
/// [`take_outgoing`](Body::take_outgoing)) marks the body used before it
/// returns; the backing value moves into the returned future or stream.
/// Later calls fail with [`BridgeError::AlreadyConsumed`], including on an
/// empty body.
pub struct Body {
    source: Option<Source>,
    mime: Option<&'static str>,
}

impl Body {
    pub fn empty() -> Self {
        Self {
            source: Some(Source::Empty),
            mime: None,
        }
    }

    pub fn new(init: BodyInit) -> Self {
        let (source, mime) = match init {
            BodyInit::Bytes(b) => (Source::Bytes(b), Some(MIME_OCTET_STREAM)),
            BodyInit::Text(t) if t.is_empty() => (Source::Empty, None),
            BodyInit::Text(t) => (Source::Text(t), Some(MIME_TEXT)),
            BodyInit::Form(fields) => {
                let encoded = url::form_urlencoded::Serializer::new(String::new())
                    .extend_pairs(fields)
                    .finish();
                (Source::Text(encoded), Some(MIME_FORM))
            }
            BodyInit::Stream(s) => (Source::Stream(s), Some(MIME_OCTET_STREAM)),
        };
        Self {
            source: Some(source),
            mime,
        }
    }

    /// Content type implied by the initializer, if any.
    pub fn mime_hint(&self) -> Option<&'static str> {
        self.mime
    }

    pub fn is_used(&self) -> bool {
        self.source.is_none()
    }

    pub fn is_stream(&self) -> bool {
        matches!(self.source, Some(Source::Stream(_)))
    }

    /// Whether the body carries content that GET/HEAD must not have.
    pub(crate) fn has_content(&self) -> bool {
        match &self.source {
            Some(Source::Empty) | None => false,
            Some(Source::Bytes(b)) => !b.is_empty(),
            Some(Source::Text(t)) => !t.is_empty(),
            Some(Source::Stream(_)) => true,
        }
    }

    fn take(&mut self) -> BridgeResult<Source> {
        self.source.take().ok_or(BridgeError::AlreadyConsumed)
    }

    /// Read the whole body and return it as raw bytes.
    pub fn bytes(&mut self) -> BodyFuture<Bytes> {
        let source = self.take();
        Box::pin(async move {
            match source? {
                Source::Empty => Ok(Bytes::new()),
                Source::Bytes(b) => Ok(b),
                Source::Text(t) => Ok(Bytes::from(t)),
                Source::Stream(s) => drain(s).await,
            }
        })
    }

    /// Read the whole body and decode it as UTF-8.
    ///
    /// Invalid sequences become U+FFFD and a leading byte-order mark is
    /// dropped.
    pub fn text(&mut self) -> BodyFuture<String> {
        let source = self.take();
        Box::pin(async move {
            match source? {
                Source::Empty => Ok(String::new()),
                Source::Text(t) => Ok(t),
                Source::Bytes(b) => Ok(decode_utf8(&b)),
                Source::Stream(s) => Ok(decode_utf8(&drain(s).await?)),
            }
        })
    }

    /// Read the whole body and parse it as JSON.
    pub fn json<T>(&mut self) -> BodyFuture<T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let text = self.text();
        Box::pin(async move {
            let text = text.await?;
            serde_json::from_str(&text).map_err(|e| BridgeError::MalformedPayload(e.to_string()))
        })
    }

    /// Expose the body as a lazy byte stream.
    ///
    /// Stream-backed bodies hand over their stream unchanged; buffered
    /// bodies yield one chunk. On a used body the stream yields a single
    /// [`BridgeError::AlreadyConsumed`].
    pub fn stream(&mut self) -> ByteStream {
        match self.take() {
            Ok(Source::Empty) => EmptyStream::boxed(),
            Ok(Source::Bytes(b)) => OnceStream::boxed(b),
            Ok(Source::Text(t)) => OnceStream::boxed(Bytes::from(t)),
            Ok(Source::Stream(s)) => s,
            Err(e) => FailedStream::boxed(e),
        }
    }

    /// Consume the body into the form the host writes out.
    pub fn take_outgoing(&mut self) -> BridgeResult<OutgoingBody> {
        Ok(match self.take()? {
            Source::Empty => OutgoingBody::Empty,
            Source::Bytes(b) if b.is_empty() => OutgoingBody::Empty,
            Source::Bytes(b) => OutgoingBody::Bytes(b),
            Source::Text(t) => OutgoingBody::Bytes(Bytes::from(t)),
            Source::Stream(s) => OutgoingBody::Stream(s),
        })
    }

    /// Duplicate an unread body.
    ///
    /// Buffered content is shared; a stream is split with [`tee`] so both
    /// bodies read the full sequence. Fails with
    /// [`BridgeError::CloneAfterConsumption`] once the body has been used.
    pub fn try_clone(&mut self) -> BridgeResult<Body> {
        let source = match self.source.take() {
            None => return Err(BridgeError::CloneAfterConsumption),
            Some(Source::Stream(s)) => {
                tracing::debug!("teeing stream-backed body for clone");
                let (left, right) = tee(s);
                self.source = Some(Source::Stream(left.into_byte_stream()));
                Source::Stream(right.into_byte_stream())
            }
            Some(Source::Empty) => {
                self.source = Some(Source::Empty);
                Source::Empty
            }
            Some(Source::Bytes(b)) => {
                self.source = Some(Source::Bytes(b.clone()));
                Source::Bytes(b)
            }
            Some(Source::Text(t)) => {
                self.source = Some(Source::Text(t.clone()));
                Source::Text(t)
            }
        };
        Ok(Body {
            source: Some(source),
            mime: self.mime,
        })
    }
}

impl Default for Body {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<BodyInit> for Body {
    fn from(init: BodyInit) -> Self {
        Body::new(init)
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.source {
            None => "Used",
            Some(Source::Empty) => "Empty",
            Some(Source::Bytes(_)) => "Bytes",
            Some(Source::Text(_)) => "Text",
            Some(Source::Stream(_)) => "Stream",
        };
        f.debug_struct("Body")
            .field("kind", &kind)
            .field("mime", &self.mime)
            .finish()
    }
}

/// Collect a stream in arrival order.
pub(crate) async fn drain(mut stream: ByteStream) -> BridgeResult<Bytes> {
    let mut buf = BytesMut::new();
    while let Some(chunk) = std::future::poll_fn(|cx| stream.as_mut().poll_next(cx)).await {
        buf.extend_from_slice(&chunk?);
    }
    Ok(buf.freeze())
}

fn decode_utf8(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}
