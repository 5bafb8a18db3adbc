//! Shared helpers for WAL integration tests.

#![allow(dead_code)]

use bytes::Bytes;
use std::fs;
use std::ops::RangeInclusive;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tablewal_codec::{LogEntry, LogEntryBuilder, Record, Value};
use tablewal_core::wal::{compress_segment, segment_header, segment_name, Compression, SegmentDir};
use tablewal_core::{RetryConfig, WalConfig, WalCoordinator};
use tablewal_storage::ObjectStore;

pub const PREFIX: &str = "wal/";
pub const MAX_SEGMENT_SIZE: u64 = 512;

/// Small segments and fast retries.
pub fn config(cache: &Path) -> WalConfig {
    WalConfig::new(cache)
        .max_segment_size(MAX_SEGMENT_SIZE)
        .remote_prefix(PREFIX)
        .retry(
            RetryConfig::new(3)
                .with_initial_delay(Duration::from_millis(1))
                .with_max_delay(Duration::from_millis(4)),
        )
        .sync_on_write(false)
        .writer_backoff(Duration::from_millis(1), Duration::from_millis(5))
        .push_failure_delay(Duration::from_millis(5))
}

pub fn row(key: i64) -> LogEntryBuilder {
    LogEntryBuilder::update("events").record(Record::new(vec![
        Value::Int(key),
        Value::Text(format!("event-{key:04}-{}", "x".repeat(32))),
    ]))
}

pub fn entry(id: u64) -> LogEntry {
    row(id as i64).build(id)
}

/// Opens a WAL and drains its first replay.
pub fn open(cache: &Path, store: Arc<dyn ObjectStore>) -> WalCoordinator {
    open_with(config(cache), store)
}

pub fn open_with(config: WalConfig, store: Arc<dyn ObjectStore>) -> WalCoordinator {
    let wal = WalCoordinator::open(config, store).unwrap();
    for entry in wal.read_all().unwrap() {
        entry.unwrap();
    }
    wal
}

pub fn replay(wal: &WalCoordinator) -> Vec<LogEntry> {
    wal.read_all().unwrap().map(Result::unwrap).collect()
}

pub fn ids(entries: &[LogEntry]) -> Vec<u64> {
    entries.iter().map(LogEntry::id).collect()
}

/// Raw image of an uncompressed segment holding `ids`.
pub fn segment_bytes(ids: RangeInclusive<u64>) -> Vec<u8> {
    let mut data = segment_header(Compression::None).to_vec();
    for id in ids {
        entry(id).encode_delimited(&mut data);
    }
    data
}

pub fn write_local_segment(cache: &Path, index: u64, ids: RangeInclusive<u64>) {
    fs::create_dir_all(cache).unwrap();
    fs::write(SegmentDir::new(cache).segment_path(index), segment_bytes(ids)).unwrap();
}

pub fn put_remote_segment(store: &dyn ObjectStore, index: u64, ids: RangeInclusive<u64>) {
    let stored = compress_segment(Bytes::from(segment_bytes(ids)));
    store.put(&segment_name(PREFIX, index), &stored).unwrap();
}
