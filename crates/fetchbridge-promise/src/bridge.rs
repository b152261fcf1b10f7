use std::marker::PhantomData;
use std::panic::AssertUnwindSafe;

use fetchbridge_core::{BridgeError, BridgeResult};
use futures_util::FutureExt;

use crate::event_loop::EventLoop;
use crate::settle::{Pending, Settlement, Spread, SpreadSettlement};
use crate::work::{panic_message, Completion, Work};

/// Settles guest promises from host-side work.
///
/// The guest function (if any) is called on the event loop. An outcome
/// that is already known is delivered back through the loop right away,
/// so such settlements keep the order in which they were requested. An
/// operation still in flight is awaited on a separate tokio task and its
/// outcome is posted back to the loop when it finishes.
#[derive(Clone)]
pub struct PromiseBridge {
    event_loop: EventLoop,
}

impl PromiseBridge {
    pub fn new(event_loop: EventLoop) -> Self {
        Self { event_loop }
    }

    pub fn event_loop(&self) -> &EventLoop {
        &self.event_loop
    }

    /// Run `work` and settle `settlement` with its outcome.
    pub fn resolve_with<T, A>(&self, work: Work<T, A>, settlement: Settlement<T>)
    where
        T: Send + 'static,
        A: Send + 'static,
    {
        self.drive(work, move |outcome| settlement.settle(outcome));
    }

    /// Run `work` and resolve with its result spread into positional values.
    pub fn resolve_spread<T, A>(&self, work: Work<T, A>, settlement: SpreadSettlement<T::Item>)
    where
        T: Spread + Send + 'static,
        T::Item: Send + 'static,
        A: Send + 'static,
    {
        self.drive(work, move |outcome| settlement.settle(outcome));
    }

    /// Run `work` and return a future for its outcome.
    pub fn submit<T, A>(&self, work: Work<T, A>) -> Pending<T>
    where
        T: Send + 'static,
        A: Send + 'static,
    {
        let (settlement, pending) = Settlement::channel();
        self.resolve_with(work, settlement);
        pending
    }

    fn drive<T, A, D>(&self, work: Work<T, A>, deliver: D)
    where
        T: Send + 'static,
        A: Send + 'static,
        D: FnOnce(BridgeResult<T>) + Send + 'static,
    {
        let event_loop = self.event_loop.clone();
        let delivery = Delivery::new(deliver);
        let posted = self.event_loop.run_on_loop(move || match work.run() {
            Completion::Ready(outcome) => post_settlement(&event_loop, outcome, delivery),
            Completion::Pending(fut) => {
                tokio::spawn(async move {
                    let outcome = match AssertUnwindSafe(fut).catch_unwind().await {
                        Ok(outcome) => outcome,
                        Err(payload) => {
                            let message = panic_message(payload.as_ref());
                            tracing::debug!(%message, "guest operation panicked");
                            Err(BridgeError::exception(message))
                        }
                    };
                    post_settlement(&event_loop, outcome, delivery);
                });
            }
        });
        if !posted {
            tracing::warn!("event loop stopped; work dropped before it ran");
        }
    }
}

/// Hands one outcome to a settlement callback.
///
/// Dropped without [`complete`](Delivery::complete) (the loop stopped, or
/// the task carrying it was torn down) it rejects with
/// [`BridgeError::Canceled`], so the callback still runs exactly once.
struct Delivery<T, D>
where
    D: FnOnce(BridgeResult<T>),
{
    deliver: Option<D>,
    _outcome: PhantomData<fn(T)>,
}

impl<T, D> Delivery<T, D>
where
    D: FnOnce(BridgeResult<T>),
{
    fn new(deliver: D) -> Self {
        Self {
            deliver: Some(deliver),
            _outcome: PhantomData,
        }
    }

    fn complete(mut self, outcome: BridgeResult<T>) {
        if let Some(deliver) = self.deliver.take() {
            deliver(outcome);
        }
    }
}

impl<T, D> Drop for Delivery<T, D>
where
    D: FnOnce(BridgeResult<T>),
{
    fn drop(&mut self) {
        if let Some(deliver) = self.deliver.take() {
            tracing::debug!("settlement undeliverable; rejecting as canceled");
            deliver(Err(BridgeError::Canceled));
        }
    }
}

fn post_settlement<T, D>(event_loop: &EventLoop, outcome: BridgeResult<T>, delivery: Delivery<T, D>)
where
    T: Send + 'static,
    D: FnOnce(BridgeResult<T>) + Send + 'static,
{
    let rejected = outcome.is_err();
    if event_loop.run_on_loop(move || delivery.complete(outcome)) {
        tracing::trace!(rejected, "settlement queued");
    } else {
        tracing::warn!(rejected, "event loop stopped; settlement rejected as canceled");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use fetchbridge_core::BridgeError;
    use serde_json::{json, Value};
    use tokio::sync::mpsc;

    #[derive(Debug, PartialEq)]
    enum Call {
        Resolve(Value),
        ResolveSpread(Vec<Value>),
        Reject(BridgeError),
    }

    fn bridge() -> PromiseBridge {
        let (event_loop, _handle) = EventLoop::spawn();
        PromiseBridge::new(event_loop)
    }

    fn recording(tx: &mpsc::UnboundedSender<Call>) -> Settlement<Value> {
        let (ok, err) = (tx.clone(), tx.clone());
        Settlement::new(
            move |v| {
                let _ = ok.send(Call::Resolve(v));
            },
            move |e| {
                let _ = err.send(Call::Reject(e));
            },
        )
    }

    /// Collect every callback made within a short settle window.
    async fn calls(mut rx: mpsc::UnboundedReceiver<Call>) -> Vec<Call> {
        let mut out = Vec::new();
        while let Ok(Some(call)) = tokio::time::timeout(Duration::from_millis(50), rx.recv()).await {
            out.push(call);
        }
        out
    }

    #[tokio::test]
    async fn synchronous_throw_rejects_once() {
        let (tx, rx) = mpsc::unbounded_channel();
        let work = Work::invoke(|_: Value| Completion::throw(BridgeError::exception("bad input")), json!(1));
        bridge().resolve_with(work, recording(&tx));
        assert_eq!(calls(rx).await, [Call::Reject(BridgeError::exception("bad input"))]);
    }

    #[tokio::test]
    async fn panic_rejects_once() {
        let (tx, rx) = mpsc::unbounded_channel();
        let work: Work<Value, ()> = Work::invoke(|()| panic!("handler crashed"), ());
        bridge().resolve_with(work, recording(&tx));
        assert_eq!(calls(rx).await, [Call::Reject(BridgeError::exception("handler crashed"))]);
    }

    #[tokio::test]
    async fn async_rejection_looks_like_sync_throw() {
        let (tx, rx) = mpsc::unbounded_channel();
        let work = Work::pending(async {
            tokio::task::yield_now().await;
            Err(BridgeError::exception("bad input"))
        });
        bridge().resolve_with(work, recording(&tx));
        assert_eq!(calls(rx).await, [Call::Reject(BridgeError::exception("bad input"))]);
    }

    async fn crash_after_yield() -> BridgeResult<Value> {
        tokio::task::yield_now().await;
        panic!("lost connection")
    }

    #[tokio::test]
    async fn panic_in_pending_operation_rejects_once() {
        let (tx, rx) = mpsc::unbounded_channel();
        bridge().resolve_with(Work::pending(crash_after_yield()), recording(&tx));
        assert_eq!(calls(rx).await, [Call::Reject(BridgeError::exception("lost connection"))]);
    }

    #[tokio::test]
    async fn sync_and_async_panics_reject_the_same_way() {
        let bridge = bridge();
        let sync: Work<Value, ()> = Work::invoke(|()| panic!("lost connection"), ());
        let deferred: Work<Value, ()> = Work::invoke(|()| Completion::pending(crash_after_yield()), ());

        let sync = bridge.submit(sync).await.unwrap_err();
        let deferred = bridge.submit(deferred).await.unwrap_err();
        assert_eq!(sync, BridgeError::exception("lost connection"));
        assert_eq!(deferred, sync);
    }

    #[tokio::test]
    async fn stopped_loop_rejects_callbacks_with_canceled() {
        let (event_loop, handle) = EventLoop::spawn();
        event_loop.stop();
        handle.await.unwrap();

        let (tx, rx) = mpsc::unbounded_channel();
        PromiseBridge::new(event_loop).resolve_with(Work::pending(async { Ok(json!(1)) }), recording(&tx));
        assert_eq!(calls(rx).await, [Call::Reject(BridgeError::Canceled)]);
    }

    #[tokio::test]
    async fn loop_stopping_mid_operation_rejects_with_canceled() {
        let (event_loop, handle) = EventLoop::spawn();
        let bridge = PromiseBridge::new(event_loop.clone());
        let (release, gate) = tokio::sync::oneshot::channel::<()>();
        let (tx, rx) = mpsc::unbounded_channel();

        bridge.resolve_with(
            Work::pending(async move {
                let _ = gate.await;
                Ok(json!("late"))
            }),
            recording(&tx),
        );
        // Let the loop start the operation before stopping it.
        assert_eq!(event_loop.run(|| ()).await, Ok(()));
        event_loop.stop();
        handle.await.unwrap();
        release.send(()).unwrap();

        assert_eq!(calls(rx).await, [Call::Reject(BridgeError::Canceled)]);
    }

    #[tokio::test]
    async fn resolves_with_function_result() {
        let (tx, rx) = mpsc::unbounded_channel();
        let work = Work::invoke(
            |ctx: Value| Completion::pending(async move { Ok(json!({ "echo": ctx })) }),
            json!("hi"),
        );
        bridge().resolve_with(work, recording(&tx));
        assert_eq!(calls(rx).await, [Call::Resolve(json!({ "echo": "hi" }))]);
    }

    #[tokio::test]
    async fn spread_resolves_with_positional_arguments() {
        let (tx, rx) = mpsc::unbounded_channel();
        let (ok, err) = (tx.clone(), tx.clone());
        let settlement = SpreadSettlement::new(
            move |args| {
                let _ = ok.send(Call::ResolveSpread(args));
            },
            move |e| {
                let _ = err.send(Call::Reject(e));
            },
        );
        let work: Work<Value, ()> = Work::invoke(|()| Completion::value(json!(["a", "b"])), ());
        bridge().resolve_spread(work, settlement);
        assert_eq!(calls(rx).await, [Call::ResolveSpread(vec![json!("a"), json!("b")])]);
    }

    #[tokio::test]
    async fn spread_of_scalar_rejects() {
        let (tx, rx) = mpsc::unbounded_channel();
        let (ok, err) = (tx.clone(), tx.clone());
        let settlement = SpreadSettlement::new(
            move |args| {
                let _ = ok.send(Call::ResolveSpread(args));
            },
            move |e| {
                let _ = err.send(Call::Reject(e));
            },
        );
        bridge().resolve_spread(Work::pending(async { Ok(json!(7)) }), settlement);
        let recorded = calls(rx).await;
        assert_eq!(recorded.len(), 1);
        assert!(matches!(recorded[0], Call::Reject(BridgeError::Type(_))));
    }

    #[tokio::test]
    async fn ready_settlements_keep_request_order() {
        let bridge = bridge();
        let (tx, rx) = mpsc::unbounded_channel();
        for i in 0..50 {
            bridge.resolve_with(Work::invoke(|n: i64| Completion::value(json!(n)), i), recording(&tx));
        }
        let expected: Vec<Call> = (0..50).map(|i| Call::Resolve(json!(i))).collect();
        assert_eq!(calls(rx).await, expected);
    }

    #[tokio::test]
    async fn submit_returns_pending_outcome() {
        let bridge = bridge();
        let pending = bridge.submit(Work::invoke(|s: String| Completion::value(s.len()), "four".to_string()));
        assert_eq!(pending.await.unwrap(), 4);
    }

    #[tokio::test]
    async fn stopped_loop_cancels_submission() {
        let (event_loop, handle) = EventLoop::spawn();
        event_loop.stop();
        handle.await.unwrap();
        let pending = PromiseBridge::new(event_loop).submit(Work::pending(async { Ok(1) }));
        assert_eq!(pending.await.unwrap_err(), BridgeError::Canceled);
    }

    #[tokio::test]
    async fn guest_function_runs_on_the_loop() {
        let bridge = bridge();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let marker = tx.clone();
        assert!(bridge.event_loop().run_on_loop(move || {
            let _ = marker.send("queued first");
        }));
        let pending = bridge.submit(Work::invoke(
            move |()| {
                let _ = tx.send("guest function");
                Completion::value(())
            },
            (),
        ));
        pending.await.unwrap();
        assert_eq!(rx.recv().await, Some("queued first"));
        assert_eq!(rx.recv().await, Some("guest function"));
    }
}
