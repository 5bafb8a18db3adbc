//! Failure-injecting object store for testing.

use crate::backend::ObjectStore;
use crate::error::{StorageError, StorageResult};
use bytes::Bytes;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Per-operation call counters of a [`FaultyObjectStore`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpCounts {
    /// Calls to `get`.
    pub gets: usize,
    /// Calls to `put`.
    pub puts: usize,
    /// Calls to `list`.
    pub lists: usize,
    /// Calls to `delete`.
    pub deletes: usize,
    /// Calls that were failed by injection.
    pub injected_failures: usize,
}

/// An object store wrapper that can simulate an unreachable store.
///
/// Injected failures surface as [`StorageError::Unavailable`], which is
/// retryable. Successful calls pass through to the inner store.
pub struct FaultyObjectStore {
    inner: Arc<dyn ObjectStore>,
    fail_next: AtomicUsize,
    unavailable: AtomicBool,
    gets: AtomicUsize,
    puts: AtomicUsize,
    lists: AtomicUsize,
    deletes: AtomicUsize,
    injected: AtomicUsize,
}

impl FaultyObjectStore {
    /// Wraps an inner store. No failures are injected until configured.
    pub fn new(inner: Arc<dyn ObjectStore>) -> Self {
        Self {
            inner,
            fail_next: AtomicUsize::new(0),
            unavailable: AtomicBool::new(false),
            gets: AtomicUsize::new(0),
            puts: AtomicUsize::new(0),
            lists: AtomicUsize::new(0),
            deletes: AtomicUsize::new(0),
            injected: AtomicUsize::new(0),
        }
    }

    /// Fails the next `count` operations of any kind.
    pub fn fail_next(&self, count: usize) {
        self.fail_next.store(count, Ordering::SeqCst);
    }

    /// Fails every operation until cleared.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Clears all injected failures.
    pub fn reset(&self) {
        self.fail_next.store(0, Ordering::SeqCst);
        self.unavailable.store(false, Ordering::SeqCst);
    }

    /// Snapshot of the call counters.
    pub fn counts(&self) -> OpCounts {
        OpCounts {
            gets: self.gets.load(Ordering::SeqCst),
            puts: self.puts.load(Ordering::SeqCst),
            lists: self.lists.load(Ordering::SeqCst),
            deletes: self.deletes.load(Ordering::SeqCst),
            injected_failures: self.injected.load(Ordering::SeqCst),
        }
    }

    fn check(&self, op: &str, counter: &AtomicUsize) -> StorageResult<()> {
        counter.fetch_add(1, Ordering::SeqCst);
        let injected = self.unavailable.load(Ordering::SeqCst)
            || self
                .fail_next
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
        if injected {
            self.injected.fetch_add(1, Ordering::SeqCst);
            return Err(StorageError::Unavailable(format!("simulated {op} failure")));
        }
        Ok(())
    }
}

impl ObjectStore for FaultyObjectStore {
    fn get(&self, key: &str) -> StorageResult<Bytes> {
        self.check("get", &self.gets)?;
        self.inner.get(key)
    }

    fn put(&self, key: &str, data: &[u8]) -> StorageResult<()> {
        self.check("put", &self.puts)?;
        self.inner.put(key, data)
    }

    fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        self.check("list", &self.lists)?;
        self.inner.list(prefix)
    }

    fn delete(&self, key: &str) -> StorageResult<()> {
        self.check("delete", &self.deletes)?;
        self.inner.delete(key)
    }
}
