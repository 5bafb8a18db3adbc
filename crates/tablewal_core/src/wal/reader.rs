//! Pull-based replay over a sequence of segments.

use crate::error::{CoreError, CoreResult};
use crate::wal::format::{decode_segment, SegmentInfo, HEADER_LEN};
use bytes::Bytes;
use std::collections::VecDeque;
use tablewal_codec::LogEntry;
use tracing::warn;

/// Fetches the stored bytes of a segment by index.
pub type SegmentFetch = Box<dyn FnMut(u64) -> CoreResult<Bytes> + Send>;

/// Receives segment progress as entries are consumed.
pub type SegmentObserver = Box<dyn FnMut(SegmentInfo) + Send>;

struct OpenSegment {
    info: SegmentInfo,
    payload: Bytes,
    pos: usize,
}

/// Iterator over the entries of an ordered list of segments.
///
/// Segments are fetched lazily, one at a time, through the injected fetch
/// function, so the same reader serves both the local and the remote tier.
///
/// # Error Handling
///
/// - Fetch failures are always returned
/// - A bad header, failed decompression or undecodable entry is returned as
///   [`CoreError::SegmentCorruption`]
/// - With [`HistoryReader::ignore_trailing_corruption`] set, a decode
///   failure in the last segment ends iteration instead; this is the
///   residue of a crash in the middle of the final write
///
/// After the first error the iterator yields `None`.
pub struct HistoryReader {
    indices: VecDeque<u64>,
    fetch: SegmentFetch,
    observer: Option<SegmentObserver>,
    ignore_trailing: bool,
    current: Option<OpenSegment>,
    current_index: Option<u64>,
    finished: bool,
}

impl HistoryReader {
    /// Creates a reader over `indices`, in the given order.
    pub fn new(indices: Vec<u64>, fetch: SegmentFetch) -> Self {
        Self {
            indices: indices.into(),
            fetch,
            observer: None,
            ignore_trailing: false,
            current: None,
            current_index: None,
            finished: false,
        }
    }

    /// Sets whether a corrupt tail in the last segment ends iteration
    /// silently.
    #[must_use]
    pub fn ignore_trailing_corruption(mut self, ignore: bool) -> Self {
        self.ignore_trailing = ignore;
        self
    }

    /// Installs a callback that sees each segment when it is opened and
    /// after every entry read from it.
    #[must_use]
    pub fn with_observer(mut self, observer: SegmentObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Index of the segment most recently opened.
    #[must_use]
    pub fn current_index(&self) -> Option<u64> {
        self.current_index
    }

    fn observe(&mut self, info: SegmentInfo) {
        if let Some(observer) = self.observer.as_mut() {
            observer(info);
        }
    }

    /// Ends iteration on a decode failure, or reports it.
    fn corruption(&mut self, index: u64, message: String) -> Option<CoreResult<LogEntry>> {
        self.finished = true;
        self.current = None;
        if self.ignore_trailing && self.indices.is_empty() {
            warn!(index, reason = %message, "ignoring corrupt tail of last segment");
            return None;
        }
        Some(Err(CoreError::segment_corruption(index, message)))
    }

    fn open_next(&mut self) -> Option<CoreResult<()>> {
        let index = self.indices.pop_front()?;
        self.current_index = Some(index);

        let data = match (self.fetch)(index) {
            Ok(data) => data,
            Err(e) => return Some(Err(e)),
        };
        let payload = match decode_segment(index, data) {
            Ok((_, payload)) => payload,
            Err(e) => return Some(Err(e)),
        };

        let info = SegmentInfo::empty(index);
        self.current = Some(OpenSegment {
            info,
            payload,
            pos: 0,
        });
        self.observe(info);
        Some(Ok(()))
    }
}

impl Iterator for HistoryReader {
    type Item = CoreResult<LogEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.finished {
                return None;
            }

            if self.current.is_none() {
                match self.open_next() {
                    None => {
                        self.finished = true;
                        return None;
                    }
                    Some(Ok(())) => {}
                    Some(Err(CoreError::SegmentCorruption { index, message })) => {
                        return self.corruption(index, message);
                    }
                    Some(Err(e)) => {
                        self.finished = true;
                        return Some(Err(e));
                    }
                }
            }
            let Some(segment) = self.current.as_mut() else {
                continue;
            };

            if segment.pos >= segment.payload.len() {
                self.current = None;
                continue;
            }

            let mut buf = &segment.payload[segment.pos..];
            let before = buf.len();
            match LogEntry::decode_delimited(&mut buf) {
                Ok(entry) => {
                    let consumed = before - buf.len();
                    segment.pos += consumed;
                    segment.info.size_bytes += consumed as u64;
                    segment.info.max_entry_id = entry.id();
                    let info = segment.info;
                    self.observe(info);
                    return Some(Ok(entry));
                }
                Err(e) => {
                    let index = segment.info.index;
                    let offset = HEADER_LEN + segment.pos;
                    return self.corruption(index, format!("{e} at offset {offset}"));
                }
            }
        }
    }
}
