//! Fetch-shaped message types for the guest: [`Headers`], [`Body`],
//! [`Request`] and [`Response`].
//!
//! Bodies are consumed at most once. The first consuming accessor takes the
//! backing value; every later one fails with
//! [`BridgeError::AlreadyConsumed`](fetchbridge_core::BridgeError::AlreadyConsumed)
//! rather than returning empty data.
//!
//! Header name validation and request method/body validation run at
//! construction and return errors synchronously. Errors from draining a
//! stream-backed body surface through the accessor's future.

mod body;
mod headers;
mod request;
mod response;

pub use body::{Body, BodyFuture, BodyInit, OutgoingBody, MIME_FORM, MIME_OCTET_STREAM, MIME_TEXT};
pub use headers::{Headers, HeadersInit};
pub use request::{Request, RequestInit, RequestInput};
pub use response::{Response, ResponseInit, ResponseParts};
