//! Public WAL entry point tying the local and remote tiers together.

use crate::config::WalConfig;
use crate::dir::CacheDir;
use crate::error::{CoreError, CoreResult};
use crate::retry::Backoff;
use crate::wal::format::SegmentInfo;
use crate::wal::local::{SegmentStore, SharedSegmentStore};
use crate::wal::reader::HistoryReader;
use crate::wal::remote::RemoteReplicator;
use crate::wal::split::split_entry;
use parking_lot::{Condvar, Mutex};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tablewal_codec::{LogEntry, LogEntryBuilder};
use tablewal_storage::ObjectStore;
use tracing::{debug, error, info, warn};

enum QueueItem {
    Entry(LogEntry),
    Flush(mpsc::SyncSender<()>),
}

struct WriterQueue {
    items: Vec<QueueItem>,
    max_entry_id: u64,
    terminated: bool,
    /// Set once a replay has run to completion.
    recovered: bool,
}

struct Inner {
    config: WalConfig,
    queue: Mutex<WriterQueue>,
    changed: Condvar,
    segments: SharedSegmentStore,
    replicator: Arc<RemoteReplicator>,
    /// Serializes the implicit replay run by the first producer.
    recovery: Mutex<()>,
}

/// A write-ahead log with a local segment cache replicated to an object
/// store.
///
/// Producers call [`append`](Self::append), which assigns the next entry id
/// and queues the entry for a background writer. Writes become durable
/// locally once [`flush`](Self::flush) returns, and are copied to the object
/// store shortly after.
///
/// # Recovery
///
/// The write cursor and id counter are rebuilt by the first replay that runs
/// to completion. Callers normally drain [`read_all`](Self::read_all) right
/// after opening; if they append first, the replay runs internally.
///
/// # Example
///
/// ```rust,ignore
/// let wal = WalCoordinator::open(WalConfig::new("cache"), store)?;
/// for entry in wal.read_all()? {
///     apply(entry?);
/// }
/// let id = wal.append(LogEntryBuilder::update("users").record(row))?;
/// wal.flush()?;
/// ```
pub struct WalCoordinator {
    inner: Arc<Inner>,
    writer: Mutex<Option<JoinHandle<()>>>,
    _cache: CacheDir,
}

impl WalCoordinator {
    /// Opens the WAL and starts its background workers.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The configuration is invalid
    /// - The cache directory is locked by another process
    /// - The remote tier cannot be listed after retries
    /// - A worker thread cannot be spawned
    pub fn open(config: WalConfig, store: Arc<dyn ObjectStore>) -> CoreResult<Self> {
        config.validate()?;
        let cache = CacheDir::open(&config.cache_dir)?;
        let segment_dir = cache.segment_dir();

        let replicator = Arc::new(RemoteReplicator::open(
            store,
            config.remote_prefix.clone(),
            config.retry.clone(),
            segment_dir.clone(),
            config.push_failure_delay,
        )?);

        let local = segment_dir.list_indices()?;
        let start_index = match local.last() {
            Some(&index) => index,
            None => {
                let after_remote = replicator.max_index().map_or(0, |max| max.saturating_add(1));
                config.suggested_first_index.max(after_remote)
            }
        };
        info!(
            cache_dir = %config.cache_dir.display(),
            local_segments = local.len(),
            remote_max_index = ?replicator.max_index(),
            start_index,
            "opening WAL"
        );

        let segments: SharedSegmentStore = Arc::new(Mutex::new(SegmentStore::new(
            segment_dir,
            start_index,
            config.max_segment_size,
            config.sync_on_write,
        )));

        let inner = Arc::new(Inner {
            config,
            queue: Mutex::new(WriterQueue {
                items: Vec::new(),
                max_entry_id: 0,
                terminated: false,
                recovered: false,
            }),
            changed: Condvar::new(),
            segments,
            replicator,
            recovery: Mutex::new(()),
        });

        let worker_inner = Arc::clone(&inner);
        let writer = thread::Builder::new()
            .name("tablewal-writer".into())
            .spawn(move || run_writer(&worker_inner))?;

        Ok(Self {
            inner,
            writer: Mutex::new(Some(writer)),
            _cache: cache,
        })
    }

    /// Returns the configuration the WAL was opened with.
    #[must_use]
    pub fn config(&self) -> &WalConfig {
        &self.inner.config
    }

    /// Highest entry id assigned or recovered so far.
    #[must_use]
    pub fn max_entry_id(&self) -> u64 {
        self.inner.queue.lock().max_entry_id
    }

    /// Snapshot of the segment currently being written.
    #[must_use]
    pub fn current_segment(&self) -> SegmentInfo {
        self.inner.segments.lock().current_info()
    }

    /// The remote tier.
    #[must_use]
    pub fn replicator(&self) -> &RemoteReplicator {
        &self.inner.replicator
    }

    /// Assigns the next id to the entry and queues it for writing.
    ///
    /// An entry too large for one segment is split into parts with
    /// consecutive ids. Returns the id of the last part, which is the
    /// entry's own id when no split was needed.
    ///
    /// # Errors
    ///
    /// - [`CoreError::Validation`] if the entry cannot be split to fit; no id
    ///   is consumed
    /// - [`CoreError::Terminated`] after [`terminate`](Self::terminate)
    /// - Any replay error if the write cursor has not been recovered yet
    pub fn append(&self, builder: LogEntryBuilder) -> CoreResult<u64> {
        self.ensure_recovered()?;
        let capacity = self.inner.config.segment_capacity();

        let mut queue = self.inner.queue.lock();
        if queue.terminated {
            return Err(CoreError::Terminated);
        }
        let id = queue
            .max_entry_id
            .checked_add(1)
            .ok_or_else(|| CoreError::validation("entry id space exhausted"))?;
        let entry = builder.build(id);

        let last_id = if entry.encoded_len() <= capacity {
            queue.items.push(QueueItem::Entry(entry));
            id
        } else {
            let size = entry.encoded_len();
            let parts = split_entry(entry, capacity)?;
            let last_id = parts.last().map_or(id, LogEntry::id);
            debug!(first_id = id, last_id, size, parts = parts.len(), "split oversized entry");
            queue.items.extend(parts.into_iter().map(QueueItem::Entry));
            last_id
        };
        queue.max_entry_id = last_id;
        self.inner.changed.notify_all();
        Ok(last_id)
    }

    /// Blocks until every entry appended before this call has been written
    /// to the local tier.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Terminated`] after termination, or
    /// [`CoreError::WorkerPanicked`] if the writer died.
    pub fn flush(&self) -> CoreResult<()> {
        self.ensure_recovered()?;
        let (done_tx, done_rx) = mpsc::sync_channel(1);
        {
            let mut queue = self.inner.queue.lock();
            if queue.terminated {
                return Err(CoreError::Terminated);
            }
            queue.items.push(QueueItem::Flush(done_tx));
            self.inner.changed.notify_all();
        }
        done_rx
            .recv()
            .map_err(|_| CoreError::WorkerPanicked { worker: "writer" })
    }

    /// Replays every stored entry: the remote tier up to the first local
    /// segment, then the local tier.
    ///
    /// Draining the first replay to the end recovers the write cursor.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache directory cannot be listed. Errors met
    /// while reading are yielded by the iterator.
    pub fn read_all(&self) -> CoreResult<Replay> {
        let local_indices = self.inner.segments.lock().local_indices()?;
        let remote = match local_indices.first() {
            Some(0) => None,
            Some(&first) => Some(self.inner.replicator.read_all(Some(first - 1))),
            None => Some(self.inner.replicator.read_all(None)),
        };

        let last_local = Arc::new(Mutex::new(None::<SegmentInfo>));
        let observed = Arc::clone(&last_local);
        let inner = Arc::clone(&self.inner);
        let sink = move |info: SegmentInfo| {
            let previous = observed.lock().replace(info);
            // A segment followed by another is complete; make sure it gets
            // pushed in case a crash left it behind.
            if let Some(previous) = previous.filter(|p| p.index != info.index) {
                if !inner.queue.lock().recovered {
                    inner.replicator.enqueue(previous);
                }
            }
        };
        let local = SegmentStore::read_segments(
            &self.inner.segments,
            local_indices,
            Some(self.inner.replicator.fetcher()),
            sink,
        );

        Ok(Replay {
            inner: Arc::clone(&self.inner),
            remote,
            local,
            last_local,
            done: false,
        })
    }

    /// Deletes remote segments whose entries all precede
    /// `min_entry_id_to_retain`. See [`RemoteReplicator::remove_segments`].
    ///
    /// # Errors
    ///
    /// Returns the first storage error that persists after retries.
    pub fn remove_segments(&self, min_entry_id_to_retain: u64) -> CoreResult<usize> {
        self.inner.replicator.remove_segments(min_entry_id_to_retain)
    }

    /// Stops accepting entries, writes everything queued, then waits for
    /// the remote tier to drain. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::WorkerPanicked`] if a worker panicked.
    pub fn terminate(&self) -> CoreResult<()> {
        {
            let mut queue = self.inner.queue.lock();
            queue.terminated = true;
            self.inner.changed.notify_all();
        }
        if let Some(writer) = self.writer.lock().take() {
            writer
                .join()
                .map_err(|_| CoreError::WorkerPanicked { worker: "writer" })?;
            debug!("writer stopped");
        }
        self.inner.replicator.terminate()?;
        info!(max_entry_id = self.max_entry_id(), "WAL terminated");
        Ok(())
    }

    fn ensure_recovered(&self) -> CoreResult<()> {
        if self.check_recovered()? {
            return Ok(());
        }
        let _guard = self.inner.recovery.lock();
        if self.check_recovered()? {
            return Ok(());
        }
        info!("no replay completed yet, recovering write cursor");
        let mut discarded = 0u64;
        for entry in self.read_all()? {
            entry?;
            discarded += 1;
        }
        debug!(entries = discarded, "recovery replay finished");
        Ok(())
    }

    fn check_recovered(&self) -> CoreResult<bool> {
        let queue = self.inner.queue.lock();
        if queue.terminated {
            return Err(CoreError::Terminated);
        }
        Ok(queue.recovered)
    }
}

impl Drop for WalCoordinator {
    fn drop(&mut self) {
        if let Err(e) = self.terminate() {
            error!(error = %e, "failed to terminate WAL");
        }
    }
}

/// Replay iterator returned by [`WalCoordinator::read_all`].
///
/// Yields remote entries first, then local ones. Fused after the first
/// error.
pub struct Replay {
    inner: Arc<Inner>,
    remote: Option<HistoryReader>,
    local: HistoryReader,
    last_local: Arc<Mutex<Option<SegmentInfo>>>,
    done: bool,
}

impl Replay {
    fn observe(&self, entry: &LogEntry) {
        let mut queue = self.inner.queue.lock();
        if !queue.recovered && entry.id() > queue.max_entry_id {
            queue.max_entry_id = entry.id();
        }
    }

    fn finish(&mut self) {
        let last = self.last_local.lock().take();
        let mut queue = self.inner.queue.lock();
        if queue.recovered {
            return;
        }
        let current = {
            let mut segments = self.inner.segments.lock();
            segments.finish_recovery(last);
            segments.current_info()
        };
        if let Some(info) = last {
            self.inner.replicator.enqueue(info);
        }
        queue.recovered = true;
        info!(
            max_entry_id = queue.max_entry_id,
            index = current.index,
            size = current.size_bytes,
            "recovered write cursor"
        );
    }
}

impl Iterator for Replay {
    type Item = CoreResult<LogEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if let Some(remote) = self.remote.as_mut() {
            match remote.next() {
                Some(Ok(entry)) => {
                    self.observe(&entry);
                    return Some(Ok(entry));
                }
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(e));
                }
                None => self.remote = None,
            }
        }
        match self.local.next() {
            Some(Ok(entry)) => {
                self.observe(&entry);
                Some(Ok(entry))
            }
            Some(Err(e)) => {
                self.done = true;
                Some(Err(e))
            }
            None => {
                self.done = true;
                self.finish();
                None
            }
        }
    }
}

fn run_writer(inner: &Inner) {
    let config = &inner.config;
    let mut backoff = Backoff::new(config.writer_initial_backoff, config.writer_max_backoff);
    loop {
        let batch = {
            let mut queue = inner.queue.lock();
            while queue.items.is_empty() && !queue.terminated {
                inner.changed.wait(&mut queue);
            }
            if queue.items.is_empty() {
                return;
            }
            std::mem::take(&mut queue.items)
        };

        let mut entries = Vec::with_capacity(batch.len());
        let mut flushes = Vec::new();
        for item in batch {
            match item {
                QueueItem::Entry(entry) => entries.push(entry),
                QueueItem::Flush(done) => flushes.push(done),
            }
        }

        write_entries(inner, &entries, &mut backoff);

        for done in flushes {
            // The flusher may have given up waiting.
            let _ = done.send(());
        }
    }
}

/// Writes `entries` to the local tier, retrying failed writes until they
/// succeed.
fn write_entries(inner: &Inner, entries: &[LogEntry], backoff: &mut Backoff) {
    let mut remaining = entries;
    while !remaining.is_empty() {
        let result = {
            let mut segments = inner.segments.lock();
            let before = segments.current_index();
            segments
                .write(remaining)
                .map(|consumed| (consumed, before, segments.current_info()))
        };

        match result {
            Ok((consumed, before, info)) => {
                if backoff.failures() > 0 {
                    info!(failures = backoff.failures(), "local write recovered");
                    backoff.reset();
                }
                inner.replicator.enqueue(info);
                if info.index != before {
                    let pending = inner.replicator.pending_count();
                    if pending > inner.config.pending_push_warn_threshold {
                        warn!(
                            pending,
                            threshold = inner.config.pending_push_warn_threshold,
                            "remote tier is falling behind"
                        );
                    }
                }
                remaining = &remaining[consumed..];
            }
            Err(e) => {
                let delay = backoff.fail();
                if backoff.should_log() {
                    warn!(
                        failures = backoff.failures(),
                        error = %e,
                        ?delay,
                        "local write failed, retrying"
                    );
                }
                thread::sleep(delay);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryConfig;
    use crate::wal::format::HEADER_LEN;
    use std::time::Duration;
    use tablewal_codec::{Record, Value};
    use tablewal_storage::InMemoryObjectStore;
    use tempfile::tempdir;

    fn config(dir: &std::path::Path) -> WalConfig {
        WalConfig::new(dir)
            .max_segment_size(1024)
            .remote_prefix("wal/")
            .retry(
                RetryConfig::new(3)
                    .with_initial_delay(Duration::from_millis(1))
                    .with_max_delay(Duration::from_millis(2)),
            )
            .sync_on_write(false)
            .push_failure_delay(Duration::from_millis(5))
    }

    fn row(key: i64, payload: usize) -> LogEntryBuilder {
        LogEntryBuilder::update("t").record(Record::new(vec![
            Value::Int(key),
            Value::Bytes(vec![1; payload]),
        ]))
    }

    fn replay_ids(wal: &WalCoordinator) -> Vec<u64> {
        wal.read_all().unwrap().map(|r| r.unwrap().id()).collect()
    }

    #[test]
    fn append_assigns_consecutive_ids() {
        let tmp = tempdir().unwrap();
        let wal = WalCoordinator::open(config(tmp.path()), Arc::new(InMemoryObjectStore::new()))
            .unwrap();
        assert!(replay_ids(&wal).is_empty());

        let ids: Vec<u64> = (0..5).map(|k| wal.append(row(k, 8)).unwrap()).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
        assert_eq!(wal.max_entry_id(), 5);
        wal.flush().unwrap();
        assert_eq!(replay_ids(&wal), ids);
    }

    #[test]
    fn append_recovers_implicitly() {
        let tmp = tempdir().unwrap();
        let store = Arc::new(InMemoryObjectStore::new());
        {
            let wal = WalCoordinator::open(config(tmp.path()), store.clone()).unwrap();
            for k in 0..3 {
                wal.append(row(k, 8)).unwrap();
            }
            wal.terminate().unwrap();
        }
        let wal = WalCoordinator::open(config(tmp.path()), store).unwrap();
        assert_eq!(wal.append(row(9, 8)).unwrap(), 4);
        wal.flush().unwrap();
        assert_eq!(replay_ids(&wal), vec![1, 2, 3, 4]);
    }

    #[test]
    fn oversized_entry_split_on_append() {
        let tmp = tempdir().unwrap();
        let wal = WalCoordinator::open(config(tmp.path()), Arc::new(InMemoryObjectStore::new()))
            .unwrap();
        let big = LogEntryBuilder::update("t")
            .records((0..30).map(|k| Record::new(vec![Value::Int(k), Value::Bytes(vec![2; 100])])));
        let last = wal.append(big).unwrap();
        assert!(last > 3);
        assert_eq!(wal.max_entry_id(), last);
        wal.flush().unwrap();

        let entries: Vec<LogEntry> = wal.read_all().unwrap().map(Result::unwrap).collect();
        assert_eq!(entries.len() as u64, last);
        assert_eq!(entries.iter().map(|e| e.records().len()).sum::<usize>(), 30);
        assert!(entries.iter().all(|e| e.encoded_len() <= 1024 - HEADER_LEN));
    }

    #[test]
    fn rejected_entry_consumes_no_id() {
        let tmp = tempdir().unwrap();
        let wal = WalCoordinator::open(config(tmp.path()), Arc::new(InMemoryObjectStore::new()))
            .unwrap();
        assert_eq!(wal.append(row(1, 8)).unwrap(), 1);
        assert!(matches!(
            wal.append(row(2, 5000)),
            Err(CoreError::Validation { .. })
        ));
        assert_eq!(wal.max_entry_id(), 1);
        assert_eq!(wal.append(row(3, 8)).unwrap(), 2);
    }

    #[test]
    fn terminated_wal_rejects_producers() {
        let tmp = tempdir().unwrap();
        let wal = WalCoordinator::open(config(tmp.path()), Arc::new(InMemoryObjectStore::new()))
            .unwrap();
        wal.append(row(1, 8)).unwrap();
        wal.terminate().unwrap();
        wal.terminate().unwrap();
        assert!(matches!(wal.append(row(2, 8)), Err(CoreError::Terminated)));
        assert!(matches!(wal.flush(), Err(CoreError::Terminated)));
    }

    #[test]
    fn start_index_follows_remote_tier() {
        let tmp = tempdir().unwrap();
        let store = Arc::new(InMemoryObjectStore::new());
        store.put("wal/wal.log.6", b"TWL\0").unwrap();

        let wal = WalCoordinator::open(config(tmp.path()), store.clone()).unwrap();
        assert_eq!(wal.current_segment().index, 7);
        drop(wal);

        let other = tempdir().unwrap();
        let wal = WalCoordinator::open(
            config(other.path()).suggested_first_index(40),
            store,
        )
        .unwrap();
        assert_eq!(wal.current_segment().index, 40);
    }

    #[test]
    fn invalid_config_rejected() {
        let tmp = tempdir().unwrap();
        let result = WalCoordinator::open(
            config(tmp.path()).max_segment_size(4),
            Arc::new(InMemoryObjectStore::new()),
        );
        assert!(matches!(result, Err(CoreError::InvalidConfig { .. })));
    }
}
