//! Two-tier write-ahead log.
//!
//! Entries are appended to numbered segments in a local cache directory and
//! then copied, one segment at a time, to an object store. Replay reads the
//! remote tier first and the local tier after it, yielding entries in id
//! order.
//!
//! ## Segment Format
//!
//! ```text
//! | "TWL" (3) | compression (1) | entry | entry | ... |
//! ```
//!
//! Each entry is a varint length followed by the encoded [`LogEntry`]. Local
//! segments are always uncompressed; remote copies may be zstd-compressed as a
//! whole (everything after the header).
//!
//! [`LogEntry`]: tablewal_codec::LogEntry
//!
//! ## Recovery Policy
//!
//! ### Tolerated
//!
//! - **Torn tail of the last local segment**: a crash in the middle of the
//!   final write leaves a partial entry. Replay stops at the last complete
//!   entry and the writer truncates the file back to it.
//!
//! ### Fatal (returned from the replay iterator)
//!
//! - Any decode failure in a remote segment
//! - Any decode failure in a local segment that is not the last one
//! - A segment that cannot be fetched after retries
//!
//! ## Invariants
//!
//! - Entry ids are assigned under one lock and written in that order
//! - No local segment grows past `max_segment_size`
//! - Segment indices are contiguous; the remote tier only loses its lowest
//!   segments to retention
//! - A local segment is deleted only after a later segment is confirmed
//!   remotely

mod coordinator;
mod format;
mod local;
mod reader;
mod remote;
mod split;

pub use coordinator::{Replay, WalCoordinator};
pub use format::{
    compress_segment, decode_segment, parse_segment_index, segment_header, segment_name,
    Compression, SegmentInfo, HEADER_LEN, SEGMENT_BASENAME, SEGMENT_MAGIC,
};
pub use local::{SegmentDir, SegmentStore, SharedSegmentStore};
pub use reader::{HistoryReader, SegmentFetch, SegmentObserver};
pub use remote::RemoteReplicator;
pub use split::split_entry;
