//! Object store trait definition.

use crate::error::StorageResult;
use bytes::Bytes;

/// A flat key/blob store, such as a bucket in a cloud object service.
///
/// Keys are `/`-separated strings. Objects are written whole and never
/// appended to.
///
/// # Invariants
///
/// - `get` returns exactly the bytes of the last successful `put`
/// - `list` returns keys in ascending byte order
/// - `delete` of a missing key succeeds
/// - Stores must be `Send + Sync` for use from background workers
///
/// # Implementors
///
/// - [`super::InMemoryObjectStore`] - For testing
/// - [`super::DirectoryObjectStore`] - For a local directory
/// - [`super::FaultyObjectStore`] - For failure injection
pub trait ObjectStore: Send + Sync {
    /// Fetches the object stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::NotFound`] if the key does not exist,
    /// or another error if the store cannot be read.
    fn get(&self, key: &str) -> StorageResult<Bytes>;

    /// Stores `data` under `key`, replacing any previous object.
    ///
    /// # Errors
    ///
    /// Returns an error if the object cannot be written.
    fn put(&self, key: &str, data: &[u8]) -> StorageResult<()>;

    /// Lists all keys starting with `prefix`, sorted ascending.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be listed.
    fn list(&self, prefix: &str) -> StorageResult<Vec<String>>;

    /// Deletes the object under `key`. Deleting a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the object cannot be removed.
    fn delete(&self, key: &str) -> StorageResult<()>;
}
