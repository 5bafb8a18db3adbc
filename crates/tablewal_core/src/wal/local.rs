//! Local segment cache.
//!
//! Segments live as `wal.log.<index>` files in the cache directory. Only the
//! highest-index segment is written to; older ones wait to be pushed to the
//! remote tier and are deleted by the replicator once a successor is
//! confirmed remotely.

use crate::error::{CoreError, CoreResult};
use crate::wal::format::{
    parse_segment_index, segment_header, segment_name, Compression, SegmentInfo, HEADER_LEN,
};
use crate::wal::reader::{HistoryReader, SegmentFetch, SegmentObserver};
use bytes::Bytes;
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tablewal_codec::LogEntry;
use tracing::{debug, error, info};

/// Handle to the directory holding local segment files.
///
/// Cheap to clone; shared between the writer and the replicator.
#[derive(Debug, Clone)]
pub struct SegmentDir {
    path: PathBuf,
}

impl SegmentDir {
    /// Creates a handle for `path`. The directory must already exist.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the directory path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of segment `index`.
    #[must_use]
    pub fn segment_path(&self, index: u64) -> PathBuf {
        self.path.join(segment_name("", index))
    }

    /// Lists segment indices present in the directory, ascending.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be read.
    pub fn list_indices(&self) -> CoreResult<Vec<u64>> {
        let mut indices = Vec::new();
        for entry in fs::read_dir(&self.path)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(index) = entry
                .file_name()
                .to_str()
                .and_then(|name| parse_segment_index("", name))
            {
                indices.push(index);
            }
        }
        indices.sort_unstable();
        Ok(indices)
    }

    /// Reads segment `index`, or only its first `len` bytes when given.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file is missing or shorter than `len`.
    pub fn read_segment(&self, index: u64, len: Option<u64>) -> CoreResult<Bytes> {
        let mut file = File::open(self.segment_path(index))?;
        let mut data = Vec::new();
        match len {
            Some(len) => {
                data.reserve(usize::try_from(len).unwrap_or(0));
                file.take(len).read_to_end(&mut data)?;
                if (data.len() as u64) < len {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        format!("segment {index} holds {} of {len} bytes", data.len()),
                    )
                    .into());
                }
            }
            None => {
                file.read_to_end(&mut data)?;
            }
        }
        Ok(Bytes::from(data))
    }

    /// Deletes segment `index`. A missing file is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be removed.
    pub fn delete_segment(&self, index: u64) -> CoreResult<()> {
        match fs::remove_file(self.segment_path(index)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Returns a reader over `indices` that tolerates a torn final segment.
    #[must_use]
    pub fn reader(&self, indices: Vec<u64>) -> HistoryReader {
        let dir = self.clone();
        HistoryReader::new(indices, Box::new(move |index| dir.read_segment(index, None)))
            .ignore_trailing_corruption(true)
    }
}

/// A [`SegmentStore`] shared between the writer and replay.
pub type SharedSegmentStore = Arc<Mutex<SegmentStore>>;

/// Writer for the local tier.
///
/// Appends batches of entries to the current segment, rotating to the next
/// index when an entry does not fit. The current segment is opened lazily on
/// the first write, so that replay can first hand over the cursor of a
/// segment left behind by a previous process.
pub struct SegmentStore {
    dir: SegmentDir,
    max_segment_size: u64,
    sync_on_write: bool,
    current: SegmentInfo,
    file: Option<File>,
    /// Set once this store has opened the current segment for writing.
    opened: bool,
    /// Set when `current` was taken over from replay.
    adopted: bool,
    /// Set once recovery has fixed the cursor; later replays leave it alone.
    sealed: bool,
}

impl SegmentStore {
    /// Creates a store that will write to segment `start_index`.
    pub fn new(dir: SegmentDir, start_index: u64, max_segment_size: u64, sync_on_write: bool) -> Self {
        Self {
            dir,
            max_segment_size,
            sync_on_write,
            current: SegmentInfo::empty(start_index),
            file: None,
            opened: false,
            adopted: false,
            sealed: false,
        }
    }

    /// Snapshot of the current segment.
    #[must_use]
    pub fn current_info(&self) -> SegmentInfo {
        self.current
    }

    /// Index of the current segment.
    #[must_use]
    pub fn current_index(&self) -> u64 {
        self.current.index
    }

    /// The directory handle.
    #[must_use]
    pub fn dir(&self) -> &SegmentDir {
        &self.dir
    }

    /// Lists local segment indices.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be read.
    pub fn local_indices(&self) -> CoreResult<Vec<u64>> {
        self.dir.list_indices()
    }

    /// Takes over the cursor observed by replay for the current segment.
    ///
    /// Ignored once the segment has been opened for writing, after
    /// [`SegmentStore::finish_recovery`], or if `info` describes another
    /// segment.
    pub fn adopt(&mut self, info: SegmentInfo) {
        if self.opened || self.sealed || info.index != self.current.index {
            return;
        }
        self.current = info;
        self.adopted = true;
    }

    /// Fixes the cursor from the last segment seen by a complete replay and
    /// stops further adoption.
    pub fn finish_recovery(&mut self, last_observed: Option<SegmentInfo>) {
        if let Some(info) = last_observed {
            self.adopt(info);
        }
        self.sealed = true;
    }

    /// Replays all local segments, reporting progress to `sink` and adopting
    /// the cursor of the current segment.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache directory cannot be listed.
    pub fn read_all(
        store: &SharedSegmentStore,
        sink: impl FnMut(SegmentInfo) + Send + 'static,
    ) -> CoreResult<HistoryReader> {
        let indices = store.lock().local_indices()?;
        Ok(Self::read_segments(store, indices, None, sink))
    }

    /// Replays the given local segments.
    ///
    /// A segment whose file has disappeared since `indices` was listed is
    /// read through `fallback` instead, if one is given.
    pub fn read_segments(
        store: &SharedSegmentStore,
        indices: Vec<u64>,
        mut fallback: Option<SegmentFetch>,
        mut sink: impl FnMut(SegmentInfo) + Send + 'static,
    ) -> HistoryReader {
        let dir = store.lock().dir.clone();
        let fetch: SegmentFetch = Box::new(move |index| match dir.read_segment(index, None) {
            Err(CoreError::Io(e)) if e.kind() == io::ErrorKind::NotFound => match fallback.as_mut() {
                Some(fallback) => {
                    debug!(index, "local segment gone, reading remote copy");
                    fallback(index)
                }
                None => Err(e.into()),
            },
            other => other,
        });
        let shared = Arc::clone(store);
        let observer: SegmentObserver = Box::new(move |info: SegmentInfo| {
            shared.lock().adopt(info);
            sink(info);
        });
        HistoryReader::new(indices, fetch)
            .ignore_trailing_corruption(true)
            .with_observer(observer)
    }

    /// Writes entries in order and returns how many were consumed.
    ///
    /// Stops early when the current segment fills up; the caller resubmits
    /// the remainder. An entry larger than a whole segment is dropped.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the segment cannot be opened or written. The
    /// segment keeps its last good size and the next call starts from there.
    pub fn write(&mut self, entries: &[LogEntry]) -> CoreResult<usize> {
        if entries.is_empty() {
            return Ok(0);
        }
        self.ensure_open()?;

        let capacity = self.max_segment_size.saturating_sub(HEADER_LEN as u64);
        let mut buf = Vec::new();
        let mut size = self.current.size_bytes;
        let mut last_id = None;
        let mut consumed = 0;

        for entry in entries {
            let len = entry.encoded_len() as u64;
            if len > capacity {
                error!(
                    id = entry.id(),
                    table = entry.table_name(),
                    size = len,
                    capacity,
                    "dropping entry larger than a segment"
                );
                consumed += 1;
                continue;
            }
            if size + len > self.max_segment_size {
                if !buf.is_empty() {
                    break;
                }
                self.rotate()?;
                size = self.current.size_bytes;
            }
            entry.encode_delimited(&mut buf);
            size += len;
            last_id = Some(entry.id());
            consumed += 1;
        }

        if !buf.is_empty() {
            if let Err(e) = self.append(&buf) {
                self.file = None;
                return Err(e);
            }
        }

        self.current.size_bytes = size;
        if let Some(id) = last_id {
            self.current.max_entry_id = id;
        }
        debug!(
            index = self.current.index,
            entries = consumed,
            size = self.current.size_bytes,
            "wrote batch"
        );
        Ok(consumed)
    }

    fn append(&mut self, buf: &[u8]) -> CoreResult<()> {
        let sync = self.sync_on_write;
        let file = self.open_file()?;
        file.write_all(buf)?;
        if sync {
            file.sync_data()?;
        }
        Ok(())
    }

    fn open_file(&mut self) -> CoreResult<&mut File> {
        if self.file.is_none() {
            self.ensure_open()?;
        }
        self.file
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "segment not open").into())
    }

    /// Opens the current segment, discarding anything past the last good size.
    fn ensure_open(&mut self) -> CoreResult<()> {
        if self.file.is_some() {
            return Ok(());
        }
        let path = self.dir.segment_path(self.current.index);

        if self.opened || (self.adopted && path.exists()) {
            let mut file = OpenOptions::new().write(true).open(&path)?;
            let on_disk = file.metadata()?.len();
            if on_disk != self.current.size_bytes {
                info!(
                    index = self.current.index,
                    on_disk,
                    kept = self.current.size_bytes,
                    "truncating segment to last good size"
                );
            }
            file.set_len(self.current.size_bytes)?;
            file.seek(SeekFrom::End(0))?;
            if self.sync_on_write {
                file.sync_data()?;
            }
            self.file = Some(file);
        } else {
            if path.exists() {
                info!(index = self.current.index, "resetting segment with no replayed entries");
            }
            self.create(self.current.index)?;
        }
        self.opened = true;
        Ok(())
    }

    fn create(&mut self, index: u64) -> CoreResult<()> {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(self.dir.segment_path(index))?;
        file.write_all(&segment_header(Compression::None))?;
        if self.sync_on_write {
            file.sync_data()?;
        }
        self.current = SegmentInfo::empty(index);
        self.file = Some(file);
        Ok(())
    }

    fn rotate(&mut self) -> CoreResult<()> {
        let next = self.current.index + 1;
        self.file = None;
        self.create(next)?;
        self.adopted = false;
        info!(index = next, "rotated local segment");
        Ok(())
    }
}
