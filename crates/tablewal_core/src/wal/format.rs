//! Segment file layout and naming.
//!
//! ```text
//! | magic "TWL" (3) | compression (1) | payload ... |
//! ```
//!
//! The payload is a run of length-delimited log entries. When the
//! compression code is [`Compression::Zstd`] the payload is a single zstd
//! frame. Local segments are always written uncompressed; compression is
//! decided per segment at push time.

use crate::error::{CoreError, CoreResult};
use bytes::Bytes;

/// Magic marker at the start of every segment.
pub const SEGMENT_MAGIC: [u8; 3] = *b"TWL";

/// Size of the segment header in bytes.
pub const HEADER_LEN: usize = 4;

/// zstd level used at push time; favours speed over ratio.
const COMPRESSION_LEVEL: i32 = 1;

/// Common part of every segment name.
pub const SEGMENT_BASENAME: &str = "wal.log.";

/// Payload encoding recorded in the segment header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Compression {
    /// Raw delimited entries.
    None = 0,
    /// One zstd frame.
    Zstd = 1,
}

impl Compression {
    /// Converts a header code to a compression kind.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(Self::None),
            1 => Some(Self::Zstd),
            _ => None,
        }
    }

    /// Converts the compression kind to its header code.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }
}

/// Immutable snapshot of a segment's progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SegmentInfo {
    /// Segment index.
    pub index: u64,
    /// Id of the last entry in the segment, or 0 if it has none.
    pub max_entry_id: u64,
    /// Uncompressed size including the header.
    pub size_bytes: u64,
}

impl SegmentInfo {
    /// A segment holding only its header.
    #[must_use]
    pub const fn empty(index: u64) -> Self {
        Self {
            index,
            max_entry_id: 0,
            size_bytes: HEADER_LEN as u64,
        }
    }

    /// Returns true if at least one entry has been written.
    #[must_use]
    pub const fn has_entries(&self) -> bool {
        self.max_entry_id != 0
    }
}

/// Builds a segment header.
#[must_use]
pub fn segment_header(compression: Compression) -> [u8; HEADER_LEN] {
    let [a, b, c] = SEGMENT_MAGIC;
    [a, b, c, compression.as_byte()]
}

/// Name of segment `index` under `prefix`.
#[must_use]
pub fn segment_name(prefix: &str, index: u64) -> String {
    format!("{prefix}{SEGMENT_BASENAME}{index}")
}

/// Parses the index out of a segment name, or returns `None` if `name` is
/// not a segment under `prefix`.
#[must_use]
pub fn parse_segment_index(prefix: &str, name: &str) -> Option<u64> {
    name.strip_prefix(prefix)?
        .strip_prefix(SEGMENT_BASENAME)?
        .parse()
        .ok()
}

/// Compresses an uncompressed segment image if that makes it smaller.
///
/// `raw` must start with a [`Compression::None`] header. Anything else is
/// returned unchanged.
#[must_use]
pub fn compress_segment(raw: Bytes) -> Bytes {
    if raw.len() <= HEADER_LEN || raw[..HEADER_LEN] != segment_header(Compression::None) {
        return raw;
    }
    let compressed = match zstd::bulk::compress(&raw[HEADER_LEN..], COMPRESSION_LEVEL) {
        Ok(compressed) if HEADER_LEN + compressed.len() < raw.len() => compressed,
        _ => return raw,
    };
    let mut out = Vec::with_capacity(HEADER_LEN + compressed.len());
    out.extend_from_slice(&segment_header(Compression::Zstd));
    out.extend_from_slice(&compressed);
    Bytes::from(out)
}

/// Validates the header of segment `index` and returns its decoded payload.
///
/// # Errors
///
/// Returns [`CoreError::SegmentCorruption`] if the header is short, the magic
/// does not match, the compression code is unknown, or decompression fails.
pub fn decode_segment(index: u64, data: Bytes) -> CoreResult<(Compression, Bytes)> {
    if data.len() < HEADER_LEN {
        return Err(CoreError::segment_corruption(
            index,
            format!("truncated header: {} bytes", data.len()),
        ));
    }
    if data[..SEGMENT_MAGIC.len()] != SEGMENT_MAGIC {
        return Err(CoreError::segment_corruption(index, "invalid magic"));
    }
    let code = data[SEGMENT_MAGIC.len()];
    let compression = Compression::from_byte(code).ok_or_else(|| {
        CoreError::segment_corruption(index, format!("unknown compression code {code}"))
    })?;
    let payload = match compression {
        Compression::None => data.slice(HEADER_LEN..),
        Compression::Zstd => zstd::decode_all(&data[HEADER_LEN..])
            .map(Bytes::from)
            .map_err(|e| CoreError::segment_corruption(index, format!("decompression failed: {e}")))?,
    };
    Ok((compression, payload))
}
