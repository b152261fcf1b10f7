use std::panic::{catch_unwind, AssertUnwindSafe};

use fetchbridge_core::{BridgeError, BridgeResult};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

type Job = Box<dyn FnOnce() + Send>;

enum Message {
    Job(Job),
    Stop,
}

/// The guest's single logical thread.
///
/// Jobs posted with [`run_on_loop`](EventLoop::run_on_loop) run one at a
/// time, in the order they were posted, on one tokio task. Host work that
/// completes elsewhere reports back by posting a job, so guest-visible
/// state is only ever touched from the loop.
#[derive(Clone)]
pub struct EventLoop {
    tx: mpsc::UnboundedSender<Message>,
}

impl EventLoop {
    /// Start the loop on the current tokio runtime.
    pub fn spawn() -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
        let handle = tokio::spawn(async move {
            tracing::debug!("event loop started");
            let mut processed: u64 = 0;
            while let Some(message) = rx.recv().await {
                match message {
                    Message::Job(job) => {
                        processed += 1;
                        if catch_unwind(AssertUnwindSafe(job)).is_err() {
                            tracing::warn!(job = processed, "event loop job panicked");
                        }
                    }
                    Message::Stop => break,
                }
            }
            tracing::debug!(processed, "event loop stopped");
        });
        (Self { tx }, handle)
    }

    /// Queue `job` behind everything already posted.
    ///
    /// Returns `false` if the loop has stopped; the job is dropped unrun.
    pub fn run_on_loop(&self, job: impl FnOnce() + Send + 'static) -> bool {
        self.tx.send(Message::Job(Box::new(job))).is_ok()
    }

    /// Run `f` on the loop and wait for its result.
    pub async fn run<T, F>(&self, f: F) -> BridgeResult<T>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        if !self.run_on_loop(move || {
            let _ = tx.send(f());
        }) {
            return Err(BridgeError::Canceled);
        }
        rx.await.map_err(|_| BridgeError::Canceled)
    }

    /// Ask the loop to exit after the jobs already queued.
    pub fn stop(&self) {
        let _ = self.tx.send(Message::Stop);
    }

    pub fn is_stopped(&self) -> bool {
        self.tx.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[tokio::test]
    async fn jobs_run_in_fifo_order() {
        let (event_loop, handle) = EventLoop::spawn();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for i in 0..100 {
            let seen = seen.clone();
            assert!(event_loop.run_on_loop(move || seen.lock().unwrap().push(i)));
        }
        event_loop.stop();
        handle.await.unwrap();
        assert_eq!(*seen.lock().unwrap(), (0..100).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn run_returns_job_result() {
        let (event_loop, _handle) = EventLoop::spawn();
        assert_eq!(event_loop.run(|| 6 * 7).await.unwrap(), 42);
    }

    #[tokio::test]
    async fn panicking_job_does_not_stop_loop() {
        let (event_loop, _handle) = EventLoop::spawn();
        assert!(event_loop.run_on_loop(|| panic!("guest bug")));
        assert_eq!(event_loop.run(|| "still alive").await.unwrap(), "still alive");
    }

    #[tokio::test]
    async fn panicking_run_reports_canceled() {
        let (event_loop, _handle) = EventLoop::spawn();
        let result: BridgeResult<()> = event_loop.run(|| panic!("boom")).await;
        assert_eq!(result.unwrap_err(), BridgeError::Canceled);
    }

    #[tokio::test]
    async fn stopped_loop_rejects_jobs() {
        let (event_loop, handle) = EventLoop::spawn();
        event_loop.stop();
        handle.await.unwrap();
        assert!(event_loop.is_stopped());
        assert!(!event_loop.run_on_loop(|| {}));
        assert_eq!(event_loop.run(|| 1).await.unwrap_err(), BridgeError::Canceled);
    }
}
