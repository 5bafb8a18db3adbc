//! # tablewal Codec
//!
//! Binary message format for tablewal log entries.
//!
//! Every entry is written as a length-delimited message so that segments can
//! hold entries back to back and a reader can tell a torn tail apart from a
//! malformed entry. Sizes are computable without encoding:
//!
//! - [`LogEntry::encoded_len`] is the full delimited size
//! - [`LogEntry::header_len`] covers everything but the records
//! - [`Record::framed_len`] is one record including its length prefix
//!
//! ## Usage
//!
//! ```
//! use tablewal_codec::{LogEntry, LogEntryBuilder, Record, Value};
//!
//! let entry = LogEntryBuilder::update("metrics")
//!     .record(Record::new(vec![Value::Int(1), Value::Float(0.5)]))
//!     .build(1);
//!
//! let bytes = entry.to_delimited_bytes();
//! assert_eq!(bytes.len(), entry.encoded_len());
//!
//! let mut buf = bytes.as_slice();
//! let decoded = LogEntry::decode_delimited(&mut buf).unwrap();
//! assert_eq!(decoded, entry);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod decoder;
mod encoder;
mod entry;
mod error;
mod value;

pub use decoder::Decoder;
pub use encoder::{delimited_len, varint_len, Encoder, MAX_VARINT_LEN};
pub use entry::{Column, EntryType, LogEntry, LogEntryBuilder, Record, Schema};
pub use error::{CodecError, CodecResult};
pub use value::{ColumnType, Value};
