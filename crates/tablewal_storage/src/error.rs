//! Error types for object store operations.

use std::io;
use thiserror::Error;

/// Result type for object store operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during object store operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The requested key does not exist.
    #[error("object not found: {key}")]
    NotFound {
        /// The missing key.
        key: String,
    },

    /// The store is temporarily unreachable.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The key cannot be represented by this store.
    #[error("invalid key: {0}")]
    InvalidKey(String),
}

impl StorageError {
    /// Creates a not-found error.
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound { key: key.into() }
    }

    /// Returns true if retrying the operation may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Unavailable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(StorageError::Unavailable("down".into()).is_retryable());
        assert!(StorageError::Io(io::Error::new(io::ErrorKind::TimedOut, "slow")).is_retryable());
        assert!(!StorageError::not_found("k").is_retryable());
        assert!(!StorageError::InvalidKey("../k".into()).is_retryable());
    }

    #[test]
    fn error_display() {
        assert_eq!(
            StorageError::not_found("wal.log.3").to_string(),
            "object not found: wal.log.3"
        );
    }
}
