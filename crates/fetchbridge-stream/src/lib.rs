//! Byte-stream bridge between host readers and guest-visible streams.
//!
//! The host exposes a pull-based reader: "fill this buffer, tell me how
//! many bytes you wrote, `0` means end of stream". [`ByteStreamBridge`]
//! turns such a reader into a lazily pulled byte stream:
//!
//! - exactly one host read per consumer pull, never speculative;
//! - never more than one outstanding read against the same reader;
//! - the host resource is released exactly once, whether the stream ends
//!   naturally, is canceled, errors, or is dropped without being read.
//!
//! # State machine
//!
//! ```text
//!            pull                 n > 0
//!   Idle ──────────▶ Pulling ──────────────▶ Idle
//!    │                 │  n == 0                │
//!    │ cancel          ├──────────▶ Closed      │
//!    ▼                 │  error                 │
//!  Canceled ◀──────────┼──────────▶ Errored     │
//!            cancel    │                        │
//! ```
//!
//! [`tee`] splits any [`ByteStream`] into two independently consumable
//! branches that observe the same byte sequence.

mod bridge;
mod guard;
pub mod helpers;
pub mod reader;
mod tee;

pub use bridge::{BridgeState, ByteStreamBridge};
pub use fetchbridge_core::config::DEFAULT_CHUNK_SIZE;
pub use reader::{AsyncReadReader, BlockingReader, HostReader, ReadFuture};
pub use tee::{tee, TeeBranch};

use std::pin::Pin;

use bytes::Bytes;
use fetchbridge_core::BridgeResult;
use futures_core::Stream;

/// A type-erased, fallible async stream of byte chunks.
pub type ByteStream = Pin<Box<dyn Stream<Item = BridgeResult<Bytes>> + Send>>;
