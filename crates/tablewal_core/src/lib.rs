//! # tablewal Core
//!
//! Two-tier write-ahead log for table mutations.
//!
//! This crate provides:
//! - A local segment cache written by a single background writer
//! - Replication of finished segments to any [`ObjectStore`]
//! - Replay of both tiers in entry-id order
//! - Transparent splitting of entries too large for one segment
//! - Retention of old remote segments
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tablewal_codec::{LogEntryBuilder, Record, Value};
//! use tablewal_core::{WalConfig, WalCoordinator};
//! use tablewal_storage::DirectoryObjectStore;
//!
//! # fn main() -> tablewal_core::CoreResult<()> {
//! let store = Arc::new(DirectoryObjectStore::open("remote".as_ref())?);
//! let wal = WalCoordinator::open(WalConfig::new("cache"), store)?;
//!
//! for entry in wal.read_all()? {
//!     let entry = entry?;
//!     println!("{} {}", entry.id(), entry.table_name());
//! }
//!
//! wal.append(LogEntryBuilder::update("users").record(Record::new(vec![Value::Int(1)])))?;
//! wal.flush()?;
//! wal.terminate()?;
//! # Ok(())
//! # }
//! ```
//!
//! [`ObjectStore`]: tablewal_storage::ObjectStore

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod dir;
mod error;
mod retry;
pub mod wal;

pub use config::{RetryConfig, WalConfig};
pub use dir::CacheDir;
pub use error::{CoreError, CoreResult};
pub use retry::{with_retries, Backoff};
pub use wal::{HistoryReader, RemoteReplicator, Replay, SegmentInfo, WalCoordinator};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
