//! # tablewal Storage
//!
//! Object store abstraction used as the remote tier of the tablewal WAL.
//!
//! Object stores are **opaque key/blob stores**. They do not interpret the
//! segments they hold; the WAL owns naming, compression and framing.
//!
//! ## Available Stores
//!
//! - [`InMemoryObjectStore`] - For testing and ephemeral use
//! - [`DirectoryObjectStore`] - Keys mapped to files under a root directory
//! - [`FaultyObjectStore`] - Wrapper that injects failures for testing
//!
//! ## Example
//!
//! ```rust
//! use tablewal_storage::{InMemoryObjectStore, ObjectStore};
//!
//! let store = InMemoryObjectStore::new();
//! store.put("logs/wal.log.1", b"hello").unwrap();
//! assert_eq!(&store.get("logs/wal.log.1").unwrap()[..], b"hello");
//! assert_eq!(store.list("logs/").unwrap(), vec!["logs/wal.log.1".to_string()]);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod directory;
mod error;
mod faulty;
mod memory;

pub use backend::ObjectStore;
pub use directory::DirectoryObjectStore;
pub use error::{StorageError, StorageResult};
pub use faulty::{FaultyObjectStore, OpCounts};
pub use memory::InMemoryObjectStore;
