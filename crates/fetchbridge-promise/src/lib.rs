//! Promise settlement between host work and guest promises.
//!
//! A [`Work`] item is either an operation the guest already started or a
//! guest function to call with one argument. [`PromiseBridge`] runs it,
//! waits for the outcome and settles the matching [`Settlement`] exactly
//! once, on the guest's [`EventLoop`]. A synchronous throw (or panic) and
//! an asynchronous rejection reach the same reject callback.

mod bridge;
mod event_loop;
mod settle;
mod work;

pub use bridge::PromiseBridge;
pub use event_loop::EventLoop;
pub use settle::{Pending, Settlement, Spread, SpreadSettlement};
pub use work::{Completion, GuestFuture, Work};
