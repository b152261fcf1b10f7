//! Error kinds shared by every layer of the bridge.
//!
//! Validation errors (header names, method/body compatibility) are returned
//! synchronously from constructors. Everything that originates in a host
//! operation or while draining a stream travels through the same
//! asynchronous path as an ordinary rejection, so callers only need one
//! error path.

use thiserror::Error;

/// Result type alias for bridge operations.
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Errors raised across the host/guest boundary.
///
/// `Clone` so a single stream failure can be replayed to every consumer
/// of a teed stream.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BridgeError {
    #[error("invalid header field name: {0:?}")]
    MalformedHeaderName(String),

    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    #[error("body has already been consumed")]
    AlreadyConsumed,

    #[error("body not allowed for {0} requests")]
    BodyNotAllowed(String),

    #[error("cannot clone a body after it has been consumed")]
    CloneAfterConsumption,

    #[error("host operation failed: {0}")]
    HostOperationFailed(String),

    #[error("invalid status code: {0}")]
    InvalidStatus(u16),

    #[error("type error: {0}")]
    Type(String),

    /// A value thrown by guest code, carried as-is.
    #[error("uncaught exception: {0}")]
    Exception(serde_json::Value),

    #[error("operation canceled before settlement")]
    Canceled,
}

impl BridgeError {
    /// Wrap a host-side failure.
    pub fn host(err: impl std::fmt::Display) -> Self {
        Self::HostOperationFailed(err.to_string())
    }

    /// Wrap a guest exception carrying only a message.
    pub fn exception(message: impl Into<String>) -> Self {
        Self::Exception(serde_json::Value::String(message.into()))
    }
}

impl From<std::io::Error> for BridgeError {
    fn from(err: std::io::Error) -> Self {
        Self::host(err)
    }
}
