//! Cache directory management.
//!
//! ```text
//! <cache_dir>/
//! ├─ LOCK              # Advisory lock for single-writer
//! ├─ wal.log.<n>       # Local segments awaiting push
//! └─ wal.log.<n+1>     # Current segment
//! ```
//!
//! The LOCK file ensures only one process writes to a cache directory.

use crate::error::{CoreError, CoreResult};
use crate::wal::SegmentDir;
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::debug;

const LOCK_FILE: &str = "LOCK";

/// Holds the exclusive lock on a cache directory.
///
/// The lock is released when the value is dropped.
#[derive(Debug)]
pub struct CacheDir {
    path: PathBuf,
    _lock_file: File,
}

impl CacheDir {
    /// Opens or creates a cache directory and locks it.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The path exists but is not a directory
    /// - Another process holds the lock (returns `CacheLocked`)
    /// - I/O errors occur
    pub fn open(path: &Path) -> CoreResult<Self> {
        if path.exists() && !path.is_dir() {
            return Err(CoreError::invalid_config(format!(
                "cache path is not a directory: {}",
                path.display()
            )));
        }
        fs::create_dir_all(path)?;

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(CoreError::CacheLocked {
                path: path.to_path_buf(),
            });
        }
        debug!(path = %path.display(), "locked cache directory");

        Ok(Self {
            path: path.to_path_buf(),
            _lock_file: lock_file,
        })
    }

    /// Returns the cache directory path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Handle for the segment files in this directory.
    #[must_use]
    pub fn segment_dir(&self) -> SegmentDir {
        SegmentDir::new(&self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn open_creates_directory() {
        let temp = tempdir().unwrap();
        let cache = temp.path().join("nested").join("cache");

        let dir = CacheDir::open(&cache).unwrap();
        assert!(cache.is_dir());
        assert!(cache.join(LOCK_FILE).exists());
        assert_eq!(dir.segment_dir().path(), cache.as_path());
    }

    #[test]
    fn lock_prevents_second_open() {
        let temp = tempdir().unwrap();
        let _first = CacheDir::open(temp.path()).unwrap();

        let result = CacheDir::open(temp.path());
        assert!(matches!(result, Err(CoreError::CacheLocked { .. })));
    }

    #[test]
    fn lock_released_on_drop() {
        let temp = tempdir().unwrap();
        {
            let _dir = CacheDir::open(temp.path()).unwrap();
        }
        let _again = CacheDir::open(temp.path()).unwrap();
    }

    #[test]
    fn file_path_rejected() {
        let temp = tempdir().unwrap();
        let file = temp.path().join("plain");
        fs::write(&file, b"").unwrap();
        assert!(matches!(
            CacheDir::open(&file),
            Err(CoreError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn lock_file_not_listed_as_segment() {
        let temp = tempdir().unwrap();
        let dir = CacheDir::open(temp.path()).unwrap();
        assert!(dir.segment_dir().list_indices().unwrap().is_empty());
    }
}
