//! Directory-backed object store.

use crate::backend::ObjectStore;
use crate::error::{StorageError, StorageResult};
use bytes::Bytes;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

const TEMP_SUFFIX: &str = ".partial";

/// An object store that maps keys to files below a root directory.
///
/// Key segments separated by `/` become subdirectories. Objects are written
/// to a sibling temp file, synced, and renamed into place, so a reader never
/// observes a half-written object.
///
/// # Example
///
/// ```no_run
/// use tablewal_storage::{DirectoryObjectStore, ObjectStore};
/// use std::path::Path;
///
/// let store = DirectoryObjectStore::open(Path::new("remote")).unwrap();
/// store.put("logs/wal.log.1", b"segment").unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct DirectoryObjectStore {
    root: PathBuf,
}

impl DirectoryObjectStore {
    /// Opens a store rooted at `root`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn open(root: &Path) -> StorageResult<Self> {
        fs::create_dir_all(root)?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    /// Returns the root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> StorageResult<PathBuf> {
        if key.is_empty() || key.contains('\\') {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        let mut path = self.root.clone();
        for part in key.split('/') {
            // Dot-prefixed names are reserved for temp files.
            if part.is_empty() || part.starts_with('.') {
                return Err(StorageError::InvalidKey(key.to_string()));
            }
            path.push(part);
        }
        Ok(path)
    }

    fn collect_keys(dir: &Path, relative: &str, out: &mut Vec<String>) -> io::Result<()> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e),
        };
        for entry in entries {
            let entry = entry?;
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if name.starts_with('.') {
                continue;
            }
            let key = if relative.is_empty() {
                name
            } else {
                format!("{relative}/{name}")
            };
            if entry.file_type()?.is_dir() {
                Self::collect_keys(&entry.path(), &key, out)?;
            } else {
                out.push(key);
            }
        }
        Ok(())
    }
}

impl ObjectStore for DirectoryObjectStore {
    fn get(&self, key: &str) -> StorageResult<Bytes> {
        let path = self.path_for(key)?;
        match fs::read(&path) {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(StorageError::not_found(key)),
            Err(e) => Err(e.into()),
        }
    }

    fn put(&self, key: &str, data: &[u8]) -> StorageResult<()> {
        let path = self.path_for(key)?;
        let parent = path.parent().unwrap_or(&self.root);
        fs::create_dir_all(parent)?;

        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| StorageError::InvalidKey(key.to_string()))?;
        let temp = parent.join(format!(".{file_name}{TEMP_SUFFIX}"));

        let mut file = File::create(&temp)?;
        file.write_all(data)?;
        file.sync_all()?;
        drop(file);
        fs::rename(&temp, &path)?;
        Ok(())
    }

    fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let mut keys = Vec::new();
        Self::collect_keys(&self.root, "", &mut keys)?;
        keys.retain(|key| key.starts_with(prefix));
        keys.sort();
        Ok(keys)
    }

    fn delete(&self, key: &str) -> StorageResult<()> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn put_get_roundtrip() {
        let dir = tempdir().unwrap();
        let store = DirectoryObjectStore::open(dir.path()).unwrap();
        store.put("logs/wal.log.7", b"payload").unwrap();
        assert_eq!(&store.get("logs/wal.log.7").unwrap()[..], b"payload");
        assert!(dir.path().join("logs").join("wal.log.7").exists());
    }

    #[test]
    fn persists_across_reopen() {
        let dir = tempdir().unwrap();
        DirectoryObjectStore::open(dir.path())
            .unwrap()
            .put("wal.log.1", b"abc")
            .unwrap();
        let store = DirectoryObjectStore::open(dir.path()).unwrap();
        assert_eq!(&store.get("wal.log.1").unwrap()[..], b"abc");
    }

    #[test]
    fn list_is_sorted_and_prefixed() {
        let dir = tempdir().unwrap();
        let store = DirectoryObjectStore::open(dir.path()).unwrap();
        for key in ["p/wal.log.3", "p/wal.log.10", "q/wal.log.1", "p/wal.log.1"] {
            store.put(key, b"x").unwrap();
        }
        assert_eq!(
            store.list("p/").unwrap(),
            vec!["p/wal.log.1", "p/wal.log.10", "p/wal.log.3"]
        );
        assert_eq!(store.list("").unwrap().len(), 4);
    }

    #[test]
    fn temp_files_are_not_listed() {
        let dir = tempdir().unwrap();
        let store = DirectoryObjectStore::open(dir.path()).unwrap();
        fs::write(dir.path().join(".wal.log.1.partial"), b"torn").unwrap();
        assert!(store.list("").unwrap().is_empty());
    }

    #[test]
    fn missing_and_delete() {
        let dir = tempdir().unwrap();
        let store = DirectoryObjectStore::open(dir.path()).unwrap();
        assert!(matches!(store.get("wal.log.1"), Err(StorageError::NotFound { .. })));
        store.put("wal.log.1", b"x").unwrap();
        store.delete("wal.log.1").unwrap();
        store.delete("wal.log.1").unwrap();
        assert!(store.list("").unwrap().is_empty());
    }

    #[test]
    fn rejects_escaping_keys() {
        let dir = tempdir().unwrap();
        let store = DirectoryObjectStore::open(dir.path()).unwrap();
        for key in ["", "../x", "a//b", "/abs", ".hidden", "a\\b"] {
            assert!(
                matches!(store.put(key, b"x"), Err(StorageError::InvalidKey(_))),
                "key {key:?}"
            );
        }
    }
}
