use std::sync::atomic::{AtomicU64, Ordering};

use crate::reader::{HostReader, ReadFuture};

static NEXT_STREAM_ID: AtomicU64 = AtomicU64::new(1);

/// Owns a host reader and releases it exactly once.
///
/// Every exit path (end of data, cancel, read error, abandonment) funnels
/// through [`release`](HostHandle::release) or `Drop`; the `released` flag
/// makes the host `close` call happen at most once.
pub(crate) struct HostHandle {
    reader: Box<dyn HostReader>,
    released: bool,
    id: u64,
}

impl HostHandle {
    pub fn new(reader: Box<dyn HostReader>) -> Self {
        Self {
            reader,
            released: false,
            id: NEXT_STREAM_ID.fetch_add(1, Ordering::Relaxed),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn read_into<'a>(&'a mut self, buf: &'a mut [u8]) -> ReadFuture<'a> {
        self.reader.read_into(buf)
    }

    pub fn release(&mut self, reason: &'static str) {
        if self.released {
            return;
        }
        self.released = true;
        self.reader.close();
        tracing::debug!(stream = self.id, reason, "host resource released");
    }
}

impl Drop for HostHandle {
    fn drop(&mut self) {
        self.release("dropped");
    }
}
