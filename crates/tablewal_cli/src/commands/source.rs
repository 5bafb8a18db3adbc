//! Where the commands read segments from.

use bytes::Bytes;
use std::path::PathBuf;
use std::sync::Arc;
use tablewal_core::wal::{parse_segment_index, segment_name, HistoryReader, SegmentDir};
use tablewal_core::CoreResult;
use tablewal_storage::{DirectoryObjectStore, ObjectStore};

/// A set of segments: a local cache or a remote prefix.
#[derive(Clone)]
pub enum Source {
    /// Segment files in a cache directory.
    Cache(SegmentDir),
    /// Segment objects under a prefix.
    Remote {
        /// The store.
        store: Arc<DirectoryObjectStore>,
        /// Key prefix.
        prefix: String,
    },
}

impl Source {
    /// Picks the source from the global arguments.
    pub fn open(
        cache_dir: Option<PathBuf>,
        remote_dir: Option<PathBuf>,
        prefix: String,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        match (cache_dir, remote_dir) {
            (Some(path), None) => {
                if !path.is_dir() {
                    return Err(format!("cache directory not found: {}", path.display()).into());
                }
                Ok(Self::Cache(SegmentDir::new(path)))
            }
            (None, Some(path)) => {
                if !path.is_dir() {
                    return Err(format!("remote directory not found: {}", path.display()).into());
                }
                Ok(Self::Remote {
                    store: Arc::new(DirectoryObjectStore::open(&path)?),
                    prefix,
                })
            }
            (None, None) => Err("one of --cache-dir or --remote-dir is required".into()),
            (Some(_), Some(_)) => Err("--cache-dir and --remote-dir are exclusive".into()),
        }
    }

    /// Human-readable location.
    pub fn describe(&self) -> String {
        match self {
            Self::Cache(dir) => format!("cache {}", dir.path().display()),
            Self::Remote { store, prefix } => {
                format!("remote {} (prefix {prefix:?})", store.root().display())
            }
        }
    }

    /// Whether a torn final entry is expected here after a crash.
    pub fn may_have_torn_tail(&self) -> bool {
        matches!(self, Self::Cache(_))
    }

    /// Segment indices, ascending.
    pub fn indices(&self) -> CoreResult<Vec<u64>> {
        match self {
            Self::Cache(dir) => dir.list_indices(),
            Self::Remote { store, prefix } => {
                let mut indices: Vec<u64> = store
                    .list(prefix)?
                    .iter()
                    .filter_map(|key| parse_segment_index(prefix, key))
                    .collect();
                indices.sort_unstable();
                Ok(indices)
            }
        }
    }

    /// Stored bytes of one segment.
    pub fn fetch(&self, index: u64) -> CoreResult<Bytes> {
        match self {
            Self::Cache(dir) => dir.read_segment(index, None),
            Self::Remote { store, prefix } => Ok(store.get(&segment_name(prefix, index))?),
        }
    }

    /// Reader over `indices`.
    pub fn reader(&self, indices: Vec<u64>, ignore_torn_tail: bool) -> HistoryReader {
        let source = self.clone();
        HistoryReader::new(indices, Box::new(move |index: u64| source.fetch(index)))
            .ignore_trailing_corruption(ignore_torn_tail)
    }
}
