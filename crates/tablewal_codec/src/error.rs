//! Error types for the codec crate.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while decoding log entries.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The input ended before a complete item was read.
    #[error("unexpected end of input")]
    UnexpectedEof,

    /// The input is structurally invalid.
    #[error("malformed entry: {message}")]
    Malformed {
        /// Description of the structural error.
        message: String,
    },

    /// A string field is not valid UTF-8.
    #[error("invalid UTF-8 string")]
    InvalidUtf8,

    /// Unrecognized entry type code.
    #[error("unknown entry type {0}")]
    UnknownEntryType(u8),

    /// Unrecognized value tag.
    #[error("unknown value tag {0}")]
    UnknownValueTag(u8),

    /// Unrecognized column type code.
    #[error("unknown column type {0}")]
    UnknownColumnType(u8),

    /// A varint does not fit in 64 bits.
    #[error("varint overflows 64 bits")]
    VarintOverflow,
}

impl CodecError {
    /// Create a malformed entry error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
        }
    }

    /// Returns true if the input was cut short rather than invalid.
    ///
    /// A torn write at the end of a segment shows up as truncation.
    #[must_use]
    pub fn is_truncation(&self) -> bool {
        matches!(self, Self::UnexpectedEof)
    }
}
