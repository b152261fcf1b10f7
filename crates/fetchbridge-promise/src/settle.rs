use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use fetchbridge_core::{BridgeError, BridgeResult};
use serde_json::Value;
use tokio::sync::oneshot;

type Callback<T> = Box<dyn FnOnce(T) + Send>;

/// The resolve/reject pair of one guest promise.
///
/// `settle` takes `self`, so exactly one of the two callbacks runs, once.
pub struct Settlement<T> {
    resolve: Callback<T>,
    reject: Callback<BridgeError>,
}

impl<T: Send + 'static> Settlement<T> {
    pub fn new(
        resolve: impl FnOnce(T) + Send + 'static,
        reject: impl FnOnce(BridgeError) + Send + 'static,
    ) -> Self {
        Self {
            resolve: Box::new(resolve),
            reject: Box::new(reject),
        }
    }

    /// A settlement wired to a [`Pending`] future.
    pub fn channel() -> (Self, Pending<T>) {
        let (tx, rx) = oneshot::channel::<BridgeResult<T>>();
        let reject_tx = Arc::new(Mutex::new(Some(tx)));
        let resolve_tx = reject_tx.clone();
        let settlement = Self::new(
            move |value| send_once(&resolve_tx, Ok(value)),
            move |err| send_once(&reject_tx, Err(err)),
        );
        (settlement, Pending { rx })
    }
}

impl<T> Settlement<T> {
    pub fn settle(self, outcome: BridgeResult<T>) {
        match outcome {
            Ok(value) => (self.resolve)(value),
            Err(err) => (self.reject)(err),
        }
    }
}

fn send_once<T>(slot: &Mutex<Option<oneshot::Sender<T>>>, value: T) {
    let sender = slot
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .take();
    if let Some(sender) = sender {
        let _ = sender.send(value);
    }
}

impl<T> fmt::Debug for Settlement<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Settlement")
    }
}

/// A settled value that can be fanned out into positional arguments.
pub trait Spread {
    type Item;

    /// Split into positional values, or fail with [`BridgeError::Type`]
    /// when the value is not a sequence.
    fn spread(self) -> BridgeResult<Vec<Self::Item>>;
}

impl Spread for Value {
    type Item = Value;

    fn spread(self) -> BridgeResult<Vec<Value>> {
        match self {
            Value::Array(items) => Ok(items),
            other => Err(BridgeError::Type(format!("{other} is not iterable"))),
        }
    }
}

impl<U> Spread for Vec<U> {
    type Item = U;

    fn spread(self) -> BridgeResult<Vec<U>> {
        Ok(self)
    }
}

/// Like [`Settlement`], but resolve receives the settled sequence as
/// separate positional values.
pub struct SpreadSettlement<I> {
    resolve: Callback<Vec<I>>,
    reject: Callback<BridgeError>,
}

impl<I: Send + 'static> SpreadSettlement<I> {
    pub fn new(
        resolve: impl FnOnce(Vec<I>) + Send + 'static,
        reject: impl FnOnce(BridgeError) + Send + 'static,
    ) -> Self {
        Self {
            resolve: Box::new(resolve),
            reject: Box::new(reject),
        }
    }

    /// Settle with a value that must spread; a non-sequence goes to reject.
    pub fn settle<T: Spread<Item = I>>(self, outcome: BridgeResult<T>) {
        match outcome.and_then(Spread::spread) {
            Ok(values) => (self.resolve)(values),
            Err(err) => (self.reject)(err),
        }
    }
}

impl<I> fmt::Debug for SpreadSettlement<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SpreadSettlement")
    }
}

/// Resolves when the paired [`Settlement`] settles; yields
/// [`BridgeError::Canceled`] if it is dropped unsettled.
#[derive(Debug)]
pub struct Pending<T> {
    rx: oneshot::Receiver<BridgeResult<T>>,
}

impl<T> Future for Pending<T> {
    type Output = BridgeResult<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            Poll::Ready(Err(_)) => Poll::Ready(Err(BridgeError::Canceled)),
            Poll::Pending => Poll::Pending,
        }
    }
}
