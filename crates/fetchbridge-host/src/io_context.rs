//! Per-request I/O scope.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use fetchbridge_core::{BridgeError, BridgeResult};
use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore};

type Cleanup = Box<dyn FnOnce() + Send>;

/// Bounds and tracks the outbound work of one guest request.
///
/// - at most `max_concurrent` fetches hold a [`FetchToken`] at once;
/// - background work holding an [`ExtendGuard`] keeps the scope open past
///   the response;
/// - cleanups registered during the request run in reverse order when the
///   scope is released;
/// - [`release`](IoContext::release) waits for extenders, then for
///   in-flight fetches, and refuses new fetches afterwards.
#[derive(Clone)]
pub struct IoContext {
    inner: Arc<Inner>,
}

struct Inner {
    limiter: Arc<Semaphore>,
    max_concurrent: u32,
    extenders: AtomicUsize,
    concluded: Notify,
    extensions_closed: AtomicBool,
    cleanups: Mutex<Vec<Cleanup>>,
    released: AtomicBool,
}

/// Held for the duration of one outbound fetch.
#[derive(Debug)]
pub struct FetchToken {
    _permit: OwnedSemaphorePermit,
}

/// Keeps an [`IoContext`] open until dropped.
#[must_use = "the scope is only extended while the guard is alive"]
pub struct ExtendGuard {
    inner: Arc<Inner>,
}

impl Drop for ExtendGuard {
    fn drop(&mut self) {
        if self.inner.extenders.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.inner.concluded.notify_waiters();
        }
    }
}

impl fmt::Debug for ExtendGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ExtendGuard")
    }
}

impl IoContext {
    pub fn new(max_concurrent: u32) -> Self {
        assert!(max_concurrent > 0, "max_concurrent must be > 0");
        Self {
            inner: Arc::new(Inner {
                limiter: Arc::new(Semaphore::new(max_concurrent as usize)),
                max_concurrent,
                extenders: AtomicUsize::new(0),
                concluded: Notify::new(),
                extensions_closed: AtomicBool::new(false),
                cleanups: Mutex::new(Vec::new()),
                released: AtomicBool::new(false),
            }),
        }
    }

    /// Wait for a fetch slot. Fails with [`BridgeError::Canceled`] once the
    /// scope has been released.
    pub async fn acquire_fetch_token(&self) -> BridgeResult<FetchToken> {
        let permit = self
            .inner
            .limiter
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| BridgeError::Canceled)?;
        Ok(FetchToken { _permit: permit })
    }

    /// Fetches currently holding a token.
    pub fn in_flight(&self) -> usize {
        if self.inner.limiter.is_closed() {
            return 0;
        }
        self.inner.max_concurrent as usize - self.inner.limiter.available_permits()
    }

    /// Keep the scope open for background work until the guard drops.
    ///
    /// Nested extensions are allowed while another guard is alive. Fails
    /// with [`BridgeError::Canceled`] once release has stopped waiting for
    /// extenders.
    pub fn extend(&self) -> BridgeResult<ExtendGuard> {
        if self.inner.extensions_closed.load(Ordering::Acquire) {
            return Err(BridgeError::Canceled);
        }
        self.inner.extenders.fetch_add(1, Ordering::AcqRel);
        Ok(ExtendGuard {
            inner: self.inner.clone(),
        })
    }

    /// Background work currently extending the scope.
    pub fn extenders(&self) -> usize {
        self.inner.extenders.load(Ordering::Acquire)
    }

    pub fn register_cleanup(&self, cleanup: impl FnOnce() + Send + 'static) {
        self.lock_cleanups().push(Box::new(cleanup));
    }

    pub fn is_released(&self) -> bool {
        self.inner.released.load(Ordering::Acquire)
    }

    /// Wait for extenders and in-flight fetches, then run cleanups
    /// last-registered first.
    ///
    /// Only the first call does anything.
    pub async fn release(&self) {
        if self.inner.released.swap(true, Ordering::AcqRel) {
            return;
        }
        loop {
            let concluded = self.inner.concluded.notified();
            let extenders = self.extenders();
            if extenders == 0 {
                break;
            }
            tracing::debug!(extenders, "waiting for background work");
            concluded.await;
        }
        self.inner.extensions_closed.store(true, Ordering::Release);

        if let Ok(all) = self.inner.limiter.acquire_many(self.inner.max_concurrent).await {
            all.forget();
        }
        self.inner.limiter.close();

        let cleanups = std::mem::take(&mut *self.lock_cleanups());
        tracing::debug!(cleanups = cleanups.len(), "releasing request scope");
        for cleanup in cleanups.into_iter().rev() {
            cleanup();
        }
    }

    fn lock_cleanups(&self) -> std::sync::MutexGuard<'_, Vec<Cleanup>> {
        self.inner
            .cleanups
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
