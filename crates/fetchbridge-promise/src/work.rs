use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::pin::Pin;

use fetchbridge_core::{BridgeError, BridgeResult};

/// A guest operation that is still running.
pub type GuestFuture<T> = Pin<Box<dyn Future<Output = BridgeResult<T>> + Send>>;

/// What a guest function hands back: a settled outcome or an operation
/// still in flight.
pub enum Completion<T> {
    Ready(BridgeResult<T>),
    Pending(GuestFuture<T>),
}

impl<T: Send + 'static> Completion<T> {
    pub fn value(value: T) -> Self {
        Completion::Ready(Ok(value))
    }

    /// A synchronous throw.
    pub fn throw(err: BridgeError) -> Self {
        Completion::Ready(Err(err))
    }

    pub fn pending(fut: impl Future<Output = BridgeResult<T>> + Send + 'static) -> Self {
        Completion::Pending(Box::pin(fut))
    }

    /// Await the outcome regardless of which form it took.
    pub fn into_future(self) -> GuestFuture<T> {
        match self {
            Completion::Ready(outcome) => Box::pin(std::future::ready(outcome)),
            Completion::Pending(fut) => fut,
        }
    }
}

impl<T> From<BridgeResult<T>> for Completion<T> {
    fn from(outcome: BridgeResult<T>) -> Self {
        Completion::Ready(outcome)
    }
}

impl<T> fmt::Debug for Completion<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Completion::Ready(Ok(_)) => f.write_str("Ready(Ok)"),
            Completion::Ready(Err(e)) => f.debug_tuple("Ready").field(e).finish(),
            Completion::Pending(_) => f.write_str("Pending"),
        }
    }
}

type GuestFn<T, A> = Box<dyn FnOnce(A) -> Completion<T> + Send>;

/// A unit of work handed to the promise bridge: either an operation the
/// guest already started, or a guest function to call with one argument.
pub enum Work<T, A = ()> {
    Pending(GuestFuture<T>),
    Invoke { f: GuestFn<T, A>, arg: A },
}

impl<T> Work<T, ()> {
    pub fn pending(fut: impl Future<Output = BridgeResult<T>> + Send + 'static) -> Self {
        Work::Pending(Box::pin(fut))
    }
}

impl<T, A> Work<T, A> {
    pub fn invoke(f: impl FnOnce(A) -> Completion<T> + Send + 'static, arg: A) -> Self {
        Work::Invoke {
            f: Box::new(f),
            arg,
        }
    }

    /// Call the guest function now, if there is one.
    ///
    /// A panic inside the function is caught and becomes a rejection with
    /// [`BridgeError::Exception`], the same shape as a thrown value.
    pub fn run(self) -> Completion<T> {
        match self {
            Work::Pending(fut) => Completion::Pending(fut),
            Work::Invoke { f, arg } => match catch_unwind(AssertUnwindSafe(move || f(arg))) {
                Ok(completion) => completion,
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    tracing::debug!(%message, "guest function panicked");
                    Completion::Ready(Err(BridgeError::exception(message)))
                }
            },
        }
    }
}

impl<T, A> fmt::Debug for Work<T, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Work::Pending(_) => f.write_str("Work::Pending"),
            Work::Invoke { .. } => f.write_str("Work::Invoke"),
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "guest code panicked".to_owned()
    }
}
