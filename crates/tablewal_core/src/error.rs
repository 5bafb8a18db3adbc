//! Error types for tablewal core.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in WAL operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Object store error.
    #[error("storage error: {0}")]
    Storage(#[from] tablewal_storage::StorageError),

    /// Entry codec error.
    #[error("codec error: {0}")]
    Codec(#[from] tablewal_codec::CodecError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A segment could not be parsed.
    #[error("segment {index} corrupted: {message}")]
    SegmentCorruption {
        /// Index of the corrupted segment.
        index: u64,
        /// Description of the corruption.
        message: String,
    },

    /// An entry cannot be stored.
    #[error("invalid entry: {message}")]
    Validation {
        /// Why the entry was rejected.
        message: String,
    },

    /// The WAL has been terminated.
    #[error("WAL is terminated")]
    Terminated,

    /// Configuration is invalid.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the problem.
        message: String,
    },

    /// Another process holds the cache directory.
    #[error("cache directory locked: {}", path.display())]
    CacheLocked {
        /// The locked directory.
        path: PathBuf,
    },

    /// A background worker panicked.
    #[error("{worker} worker panicked")]
    WorkerPanicked {
        /// Name of the worker.
        worker: &'static str,
    },
}

impl CoreError {
    /// Creates a segment corruption error.
    pub fn segment_corruption(index: u64, message: impl Into<String>) -> Self {
        Self::SegmentCorruption {
            index,
            message: message.into(),
        }
    }

    /// Creates a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Creates an invalid configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Returns true if retrying the failed operation may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Storage(e) => e.is_retryable(),
            Self::Io(_) => true,
            _ => false,
        }
    }
}
