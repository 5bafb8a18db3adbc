//! Remote segment tier.
//!
//! A single pusher thread copies local segments to the object store, lowest
//! index first and one at a time. Once segment N is confirmed, the local
//! file of the previously confirmed segment is deleted, so at most the
//! in-flight segment and one confirmed predecessor stay on local disk.

use crate::config::RetryConfig;
use crate::error::{CoreError, CoreResult};
use crate::retry::with_retries;
use crate::wal::format::{compress_segment, parse_segment_index, segment_name, SegmentInfo};
use crate::wal::local::SegmentDir;
use crate::wal::reader::{HistoryReader, SegmentFetch};
use bytes::Bytes;
use parking_lot::{Condvar, Mutex};
use std::collections::BTreeMap;
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tablewal_storage::ObjectStore;
use tracing::{debug, error, info, warn};

#[derive(Debug, Default)]
struct ReplicatorState {
    pending: BTreeMap<u64, SegmentInfo>,
    last_pushed: Option<SegmentInfo>,
    /// Remote index to max entry id, `None` until read or pushed.
    known: BTreeMap<u64, Option<u64>>,
    in_flight: Option<u64>,
    terminated: bool,
}

struct Shared {
    store: Arc<dyn ObjectStore>,
    prefix: String,
    retry: RetryConfig,
    local: SegmentDir,
    push_failure_delay: Duration,
    state: Mutex<ReplicatorState>,
    changed: Condvar,
}

impl Shared {
    fn key(&self, index: u64) -> String {
        segment_name(&self.prefix, index)
    }

    fn fetch(&self, index: u64) -> CoreResult<Bytes> {
        let key = self.key(index);
        with_retries(&self.retry, "get", || Ok(self.store.get(&key)?))
    }

    fn push(&self, info: SegmentInfo) -> CoreResult<usize> {
        let raw = self.local.read_segment(info.index, Some(info.size_bytes))?;
        let stored = compress_segment(raw);
        let key = self.key(info.index);
        with_retries(&self.retry, "put", || Ok(self.store.put(&key, &stored)?))?;
        Ok(stored.len())
    }
}

/// Replicates local segments to an object store and reads them back.
pub struct RemoteReplicator {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl RemoteReplicator {
    /// Lists the remote segments under `prefix` and starts the pusher.
    ///
    /// # Errors
    ///
    /// Returns an error if the listing fails after retries or the worker
    /// thread cannot be spawned.
    pub fn open(
        store: Arc<dyn ObjectStore>,
        prefix: impl Into<String>,
        retry: RetryConfig,
        local: SegmentDir,
        push_failure_delay: Duration,
    ) -> CoreResult<Self> {
        let prefix = prefix.into();
        let keys = with_retries(&retry, "list", || Ok(store.list(&prefix)?))?;
        let known: BTreeMap<u64, Option<u64>> = keys
            .iter()
            .filter_map(|key| parse_segment_index(&prefix, key))
            .map(|index| (index, None))
            .collect();
        info!(prefix = %prefix, segments = known.len(), "opened remote tier");

        let shared = Arc::new(Shared {
            store,
            prefix,
            retry,
            local,
            push_failure_delay,
            state: Mutex::new(ReplicatorState {
                known,
                ..ReplicatorState::default()
            }),
            changed: Condvar::new(),
        });

        let worker_shared = Arc::clone(&shared);
        let worker = thread::Builder::new()
            .name("tablewal-pusher".into())
            .spawn(move || run_pusher(&worker_shared))?;

        Ok(Self {
            shared,
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Queues a segment snapshot for pushing, replacing any older snapshot
    /// of the same segment.
    pub fn enqueue(&self, info: SegmentInfo) {
        let mut state = self.shared.state.lock();
        state.pending.insert(info.index, info);
        self.shared.changed.notify_all();
    }

    /// Number of segments waiting to be pushed.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.shared.state.lock().pending.len()
    }

    /// Highest remote segment index, if any.
    #[must_use]
    pub fn max_index(&self) -> Option<u64> {
        self.shared.state.lock().known.keys().next_back().copied()
    }

    /// Remote segments and their max entry ids, where known.
    #[must_use]
    pub fn known_segments(&self) -> Vec<(u64, Option<u64>)> {
        self.shared
            .state
            .lock()
            .known
            .iter()
            .map(|(&index, &max)| (index, max))
            .collect()
    }

    /// The most recently confirmed push.
    #[must_use]
    pub fn last_pushed(&self) -> Option<SegmentInfo> {
        self.shared.state.lock().last_pushed
    }

    /// Fetches a stored segment, with retries.
    ///
    /// # Errors
    ///
    /// Returns the last storage error once retries are exhausted.
    pub fn fetch(&self, index: u64) -> CoreResult<Bytes> {
        self.shared.fetch(index)
    }

    /// A fetch function backed by this tier, for use by readers.
    #[must_use]
    pub fn fetcher(&self) -> SegmentFetch {
        let shared = Arc::clone(&self.shared);
        Box::new(move |index| shared.fetch(index))
    }

    /// Replays remote segments with index at most `max_index`, or all of
    /// them when `None`.
    ///
    /// Remote segments are never torn, so any decode failure is reported.
    #[must_use]
    pub fn read_all(&self, max_index: Option<u64>) -> HistoryReader {
        let shared = Arc::clone(&self.shared);
        let indices: Vec<u64> = {
            let state = shared.state.lock();
            state
                .known
                .keys()
                .copied()
                .filter(|&index| max_index.map_or(true, |max| index <= max))
                .collect()
        };
        HistoryReader::new(indices, self.fetcher())
            .ignore_trailing_corruption(false)
            .with_observer(Box::new(move |info: SegmentInfo| {
                if info.has_entries() {
                    shared.state.lock().known.insert(info.index, Some(info.max_entry_id));
                }
            }))
    }

    /// Deletes remote segments whose entries all precede
    /// `min(min_entry_id_to_retain, max observed id)`.
    ///
    /// Only a contiguous run of the lowest segments is removed, and the
    /// highest segment is always kept. A segment whose max entry id has not
    /// been read or pushed yet stops the run: its contents are unknown, so it
    /// may still hold entries at or above the floor. Returns the number
    /// deleted.
    ///
    /// # Errors
    ///
    /// Returns the storage error of the first deletion that fails after
    /// retries; segments deleted before it stay deleted.
    pub fn remove_segments(&self, min_entry_id_to_retain: u64) -> CoreResult<usize> {
        let targets: Vec<u64> = {
            let state = self.shared.state.lock();
            let Some(max_observed) = state.known.values().flatten().max().copied() else {
                return Ok(0);
            };
            let floor = min_entry_id_to_retain.min(max_observed);
            let highest = state.known.keys().next_back().copied();
            state
                .known
                .iter()
                .take_while(|&(&index, &max)| {
                    Some(index) != highest && matches!(max, Some(m) if m < floor)
                })
                .map(|(&index, _)| index)
                .collect()
        };

        let mut removed = 0;
        for index in targets {
            let key = self.shared.key(index);
            with_retries(&self.shared.retry, "delete", || {
                Ok(self.shared.store.delete(&key)?)
            })?;
            self.shared.state.lock().known.remove(&index);
            removed += 1;
            debug!(index, "removed remote segment");
        }
        if removed > 0 {
            info!(removed, floor = min_entry_id_to_retain, "remote retention applied");
        }
        Ok(removed)
    }

    /// Blocks until nothing is pending or being pushed.
    pub fn wait_idle(&self) {
        let mut state = self.shared.state.lock();
        while !state.pending.is_empty() || state.in_flight.is_some() {
            self.shared.changed.wait(&mut state);
        }
    }

    /// Stops the pusher after it has drained its queue. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::WorkerPanicked`] if the pusher panicked.
    pub fn terminate(&self) -> CoreResult<()> {
        {
            let mut state = self.shared.state.lock();
            state.terminated = true;
            self.shared.changed.notify_all();
        }
        let Some(worker) = self.worker.lock().take() else {
            return Ok(());
        };
        worker
            .join()
            .map_err(|_| CoreError::WorkerPanicked { worker: "pusher" })?;
        info!("remote replicator terminated");
        Ok(())
    }
}

impl Drop for RemoteReplicator {
    fn drop(&mut self) {
        if let Err(e) = self.terminate() {
            error!(error = %e, "failed to terminate remote replicator");
        }
    }
}

fn run_pusher(shared: &Shared) {
    loop {
        let info = {
            let mut state = shared.state.lock();
            loop {
                if let Some(info) = state.pending.values().next().copied() {
                    state.in_flight = Some(info.index);
                    break info;
                }
                if state.terminated {
                    return;
                }
                shared.changed.wait(&mut state);
            }
        };

        match shared.push(info) {
            Ok(stored) => {
                let stale = {
                    let mut state = shared.state.lock();
                    state.known.insert(info.index, Some(info.max_entry_id).filter(|&m| m != 0));
                    if state.pending.get(&info.index) == Some(&info) {
                        state.pending.remove(&info.index);
                    }
                    let stale = state
                        .last_pushed
                        .map(|prev| prev.index)
                        .filter(|&prev| prev < info.index);
                    state.last_pushed = Some(info);
                    stale
                };
                debug!(
                    index = info.index,
                    max_entry_id = info.max_entry_id,
                    size = info.size_bytes,
                    stored,
                    "pushed segment"
                );
                if let Some(prev) = stale {
                    match shared.local.delete_segment(prev) {
                        Ok(()) => debug!(index = prev, "deleted confirmed local segment"),
                        Err(e) => warn!(index = prev, error = %e, "failed to delete local segment"),
                    }
                }
            }
            Err(CoreError::Io(e)) if e.kind() == io::ErrorKind::NotFound => {
                error!(index = info.index, "local segment vanished before push; dropping it");
                let mut state = shared.state.lock();
                if state.pending.get(&info.index) == Some(&info) {
                    state.pending.remove(&info.index);
                }
            }
            Err(e) => {
                warn!(
                    index = info.index,
                    error = %e,
                    delay = ?shared.push_failure_delay,
                    "push failed, will retry"
                );
                thread::sleep(shared.push_failure_delay);
            }
        }

        let mut state = shared.state.lock();
        state.in_flight = None;
        shared.changed.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wal::format::{segment_header, Compression, HEADER_LEN};
    use std::fs;
    use tablewal_codec::{LogEntryBuilder, Record, Value};
    use tablewal_storage::{FaultyObjectStore, InMemoryObjectStore};
    use tempfile::tempdir;

    fn fast_retry() -> RetryConfig {
        RetryConfig::new(3)
            .with_initial_delay(Duration::from_millis(1))
            .with_max_delay(Duration::from_millis(2))
    }

    /// Writes a local segment holding `ids` and returns its snapshot.
    fn local_segment(dir: &SegmentDir, index: u64, ids: std::ops::RangeInclusive<u64>) -> SegmentInfo {
        let mut data = segment_header(Compression::None).to_vec();
        let mut max = 0;
        for id in ids {
            LogEntryBuilder::update("t")
                .record(Record::new(vec![Value::Int(id as i64), Value::Text("row".repeat(8))]))
                .build(id)
                .encode_delimited(&mut data);
            max = id;
        }
        fs::write(dir.segment_path(index), &data).unwrap();
        SegmentInfo {
            index,
            max_entry_id: max,
            size_bytes: data.len() as u64,
        }
    }

    fn open(store: Arc<dyn ObjectStore>, dir: &SegmentDir) -> RemoteReplicator {
        RemoteReplicator::open(store, "wal/", fast_retry(), dir.clone(), Duration::from_millis(5))
            .unwrap()
    }

    #[test]
    fn pushes_and_reads_back() {
        let tmp = tempdir().unwrap();
        let dir = SegmentDir::new(tmp.path());
        let store = Arc::new(InMemoryObjectStore::new());
        let replicator = open(store.clone(), &dir);

        replicator.enqueue(local_segment(&dir, 1, 1..=10));
        replicator.enqueue(local_segment(&dir, 2, 11..=20));
        replicator.wait_idle();

        assert_eq!(store.keys(), vec!["wal/wal.log.1", "wal/wal.log.2"]);
        assert_eq!(replicator.known_segments(), vec![(1, Some(10)), (2, Some(20))]);

        let ids: Vec<u64> = replicator.read_all(None).map(|r| r.unwrap().id()).collect();
        assert_eq!(ids, (1..=20).collect::<Vec<_>>());
        let first: Vec<u64> = replicator.read_all(Some(1)).map(|r| r.unwrap().id()).collect();
        assert_eq!(first, (1..=10).collect::<Vec<_>>());
        replicator.terminate().unwrap();
    }

    #[test]
    fn compressible_segments_stored_compressed() {
        let tmp = tempdir().unwrap();
        let dir = SegmentDir::new(tmp.path());
        let store = Arc::new(InMemoryObjectStore::new());
        let replicator = open(store.clone(), &dir);

        let info = local_segment(&dir, 1, 1..=200);
        replicator.enqueue(info);
        replicator.wait_idle();

        let stored = store.get("wal/wal.log.1").unwrap();
        assert_eq!(stored[HEADER_LEN - 1], Compression::Zstd.as_byte());
        assert!((stored.len() as u64) < info.size_bytes);
    }

    #[test]
    fn confirmed_predecessor_deleted_locally() {
        let tmp = tempdir().unwrap();
        let dir = SegmentDir::new(tmp.path());
        let replicator = open(Arc::new(InMemoryObjectStore::new()), &dir);

        for index in 1..=4u64 {
            let first = (index - 1) * 10 + 1;
            replicator.enqueue(local_segment(&dir, index, first..=first + 9));
            replicator.wait_idle();
            assert!(dir.list_indices().unwrap().len() <= 2);
        }
        assert_eq!(dir.list_indices().unwrap(), vec![4]);
        assert_eq!(replicator.last_pushed().map(|i| i.index), Some(4));
    }

    #[test]
    fn opens_with_existing_remote_segments() {
        let tmp = tempdir().unwrap();
        let dir = SegmentDir::new(tmp.path());
        let store = Arc::new(InMemoryObjectStore::new());
        store.put("wal/wal.log.3", b"x").unwrap();
        store.put("wal/wal.log.9", b"x").unwrap();
        store.put("wal/notes", b"x").unwrap();
        store.put("other/wal.log.1", b"x").unwrap();

        let replicator = open(store, &dir);
        assert_eq!(replicator.known_segments(), vec![(3, None), (9, None)]);
        assert_eq!(replicator.max_index(), Some(9));
    }

    #[test]
    fn transient_failures_are_retried() {
        let tmp = tempdir().unwrap();
        let dir = SegmentDir::new(tmp.path());
        let inner = Arc::new(InMemoryObjectStore::new());
        let faulty = Arc::new(FaultyObjectStore::new(inner.clone()));
        let replicator = open(faulty.clone(), &dir);

        // More failures than one retry budget, so the pusher also backs off.
        faulty.fail_next(5);
        replicator.enqueue(local_segment(&dir, 1, 1..=5));
        replicator.wait_idle();

        assert_eq!(inner.keys(), vec!["wal/wal.log.1"]);
        assert_eq!(faulty.counts().injected_failures, 5);
        assert!(faulty.counts().puts >= 6);
    }

    #[test]
    fn vanished_local_segment_is_dropped() {
        let tmp = tempdir().unwrap();
        let dir = SegmentDir::new(tmp.path());
        let store = Arc::new(InMemoryObjectStore::new());
        let replicator = open(store.clone(), &dir);

        replicator.enqueue(SegmentInfo {
            index: 7,
            max_entry_id: 3,
            size_bytes: 100,
        });
        replicator.wait_idle();
        assert!(store.is_empty());
        assert_eq!(replicator.pending_count(), 0);
    }

    #[test]
    fn retention_keeps_newest_segment() {
        let tmp = tempdir().unwrap();
        let dir = SegmentDir::new(tmp.path());
        let store = Arc::new(InMemoryObjectStore::new());
        let replicator = open(store.clone(), &dir);

        replicator.enqueue(local_segment(&dir, 1, 1..=20));
        replicator.enqueue(local_segment(&dir, 2, 21..=50));
        replicator.enqueue(local_segment(&dir, 3, 51..=80));
        replicator.wait_idle();

        assert_eq!(replicator.remove_segments(60).unwrap(), 2);
        assert_eq!(store.keys(), vec!["wal/wal.log.3"]);

        // Even a floor above every id keeps the newest segment.
        assert_eq!(replicator.remove_segments(u64::MAX).unwrap(), 0);
        assert_eq!(store.keys(), vec!["wal/wal.log.3"]);
    }

    #[test]
    fn retention_skips_unknown_segments() {
        let tmp = tempdir().unwrap();
        let dir = SegmentDir::new(tmp.path());
        let store = Arc::new(InMemoryObjectStore::new());
        store.put("wal/wal.log.1", b"unread").unwrap();
        let replicator = open(store.clone(), &dir);

        replicator.enqueue(local_segment(&dir, 2, 1..=10));
        replicator.enqueue(local_segment(&dir, 3, 11..=20));
        replicator.wait_idle();

        assert_eq!(replicator.remove_segments(100).unwrap(), 0);
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn terminate_drains_pending() {
        let tmp = tempdir().unwrap();
        let dir = SegmentDir::new(tmp.path());
        let store = Arc::new(InMemoryObjectStore::new());
        let replicator = open(store.clone(), &dir);

        for index in 1..=3u64 {
            replicator.enqueue(local_segment(&dir, index, index..=index));
        }
        replicator.terminate().unwrap();
        replicator.terminate().unwrap();
        assert_eq!(store.len(), 3);
    }
}
