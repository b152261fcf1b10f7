//! Splits one [`ByteStream`] into two branches that observe the same bytes.

use std::collections::VecDeque;
use std::fmt;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll, Wake, Waker};

use bytes::Bytes;
use fetchbridge_core::BridgeResult;
use futures_core::Stream;

use crate::ByteStream;

struct TeeShared {
    source: Option<ByteStream>,
    queues: [VecDeque<BridgeResult<Bytes>>; 2],
    alive: [bool; 2],
    done: bool,
}

/// Wakes whichever branches last polled while the source was pending.
#[derive(Default)]
struct TeeWaker {
    wakers: Mutex<[Option<Waker>; 2]>,
}

impl TeeWaker {
    fn register(&self, side: usize, waker: &Waker) {
        let mut wakers = lock(&self.wakers);
        match &wakers[side] {
            Some(existing) if existing.will_wake(waker) => {}
            _ => wakers[side] = Some(waker.clone()),
        }
    }

    fn wake_side(&self, side: usize) {
        let taken = lock(&self.wakers)[side].take();
        if let Some(waker) = taken {
            waker.wake();
        }
    }
}

impl Wake for TeeWaker {
    fn wake(self: Arc<Self>) {
        self.wake_by_ref();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        let taken: Vec<Waker> = lock(&self.wakers).iter_mut().filter_map(Option::take).collect();
        for waker in taken {
            waker.wake();
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// One side of a [`tee`].
///
/// Whichever branch polls first drives the shared source; each chunk (and a
/// terminal error) is queued for the other branch until it catches up. The
/// source is dropped, releasing its host resource, once it is exhausted or
/// once both branches have been dropped.
pub struct TeeBranch {
    side: usize,
    shared: Arc<Mutex<TeeShared>>,
    waker: Arc<TeeWaker>,
}

/// Split `source` into two branches yielding identical sequences.
pub fn tee(source: ByteStream) -> (TeeBranch, TeeBranch) {
    let shared = Arc::new(Mutex::new(TeeShared {
        source: Some(source),
        queues: [VecDeque::new(), VecDeque::new()],
        alive: [true, true],
        done: false,
    }));
    let waker = Arc::new(TeeWaker::default());
    let left = TeeBranch {
        side: 0,
        shared: shared.clone(),
        waker: waker.clone(),
    };
    let right = TeeBranch { side: 1, shared, waker };
    (left, right)
}

impl TeeBranch {
    /// Box the branch as a type-erased [`ByteStream`].
    pub fn into_byte_stream(self) -> ByteStream {
        Box::pin(self)
    }
}

impl Stream for TeeBranch {
    type Item = BridgeResult<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let side = this.side;
        let other = 1 - side;
        let mut shared = lock(&this.shared);

        if let Some(item) = shared.queues[side].pop_front() {
            return Poll::Ready(Some(item));
        }
        if shared.done {
            return Poll::Ready(None);
        }

        this.waker.register(side, cx.waker());
        let tee_waker = Waker::from(this.waker.clone());
        let mut tee_cx = Context::from_waker(&tee_waker);

        let polled = match shared.source.as_mut() {
            Some(source) => source.as_mut().poll_next(&mut tee_cx),
            None => Poll::Ready(None),
        };
        match polled {
            Poll::Pending => Poll::Pending,
            Poll::Ready(None) => {
                shared.done = true;
                let exhausted = shared.source.take();
                drop(shared);
                drop(exhausted);
                this.waker.wake_side(other);
                Poll::Ready(None)
            }
            Poll::Ready(Some(item)) => {
                if shared.alive[other] {
                    shared.queues[other].push_back(item.clone());
                    drop(shared);
                    this.waker.wake_side(other);
                }
                Poll::Ready(Some(item))
            }
        }
    }
}

impl Drop for TeeBranch {
    fn drop(&mut self) {
        let abandoned = {
            let mut shared = lock(&self.shared);
            shared.alive[self.side] = false;
            shared.queues[self.side].clear();
            if shared.alive.iter().any(|alive| *alive) {
                None
            } else {
                shared.source.take()
            }
        };
        drop(abandoned);
    }
}

impl fmt::Debug for TeeBranch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TeeBranch").field("side", &self.side).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use fetchbridge_core::BridgeError;
    use futures_util::StreamExt;

    use crate::helpers::{FailedStream, OnceStream};

    fn chunks(parts: &[&'static [u8]]) -> ByteStream {
        let items: Vec<BridgeResult<Bytes>> = parts.iter().map(|p| Ok(Bytes::from_static(p))).collect();
        Box::pin(futures_util::stream::iter(items))
    }

    async fn collect(branch: TeeBranch) -> Vec<u8> {
        let mut out = Vec::new();
        let mut branch = branch;
        while let Some(chunk) = branch.next().await {
            out.extend_from_slice(&chunk.unwrap());
        }
        out
    }

    #[tokio::test]
    async fn both_branches_see_the_same_bytes() {
        let (left, right) = tee(chunks(&[b"ab", b"cd", b"ef"]));
        assert_eq!(collect(left).await, b"abcdef");
        assert_eq!(collect(right).await, b"abcdef");
    }

    #[tokio::test]
    async fn interleaved_consumption() {
        let (mut left, mut right) = tee(chunks(&[b"1", b"2", b"3"]));
        assert_eq!(left.next().await.unwrap().unwrap(), "1");
        assert_eq!(right.next().await.unwrap().unwrap(), "1");
        assert_eq!(right.next().await.unwrap().unwrap(), "2");
        assert_eq!(left.next().await.unwrap().unwrap(), "2");
        assert_eq!(left.next().await.unwrap().unwrap(), "3");
        assert!(left.next().await.is_none());
        assert_eq!(right.next().await.unwrap().unwrap(), "3");
        assert!(right.next().await.is_none());
    }

    #[tokio::test]
    async fn branches_consumed_concurrently() {
        let (left, right) = tee(OnceStream::boxed(Bytes::from_static(b"payload")));
        let (a, b) = tokio::join!(collect(left), collect(right));
        assert_eq!(a, b"payload");
        assert_eq!(b, b"payload");
    }

    #[tokio::test]
    async fn errors_reach_both_branches() {
        let (mut left, mut right) = tee(FailedStream::boxed(BridgeError::host("boom")));
        assert_eq!(left.next().await.unwrap().unwrap_err(), BridgeError::host("boom"));
        assert_eq!(right.next().await.unwrap().unwrap_err(), BridgeError::host("boom"));
    }

    struct DropCounter {
        inner: ByteStream,
        drops: Arc<AtomicUsize>,
    }

    impl Stream for DropCounter {
        type Item = BridgeResult<Bytes>;

        fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
            self.inner.as_mut().poll_next(cx)
        }
    }

    impl Drop for DropCounter {
        fn drop(&mut self) {
            self.drops.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn source_dropped_only_when_both_branches_are_gone() {
        let drops = Arc::new(AtomicUsize::new(0));
        let source = DropCounter {
            inner: chunks(&[b"a", b"b"]),
            drops: drops.clone(),
        };
        let (mut left, right) = tee(Box::pin(source));

        drop(right);
        assert_eq!(drops.load(Ordering::SeqCst), 0);
        assert_eq!(left.next().await.unwrap().unwrap(), "a");
        drop(left);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausted_source_is_dropped_early() {
        let drops = Arc::new(AtomicUsize::new(0));
        let source = DropCounter {
            inner: chunks(&[b"z"]),
            drops: drops.clone(),
        };
        let (left, right) = tee(Box::pin(source));
        assert_eq!(collect(left).await, b"z");
        assert_eq!(drops.load(Ordering::SeqCst), 1);
        assert_eq!(collect(right).await, b"z");
    }
}
