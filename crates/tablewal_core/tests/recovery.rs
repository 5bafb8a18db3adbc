//! Write, restart and replay against the local tier.

mod common;

use common::*;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;
use tablewal_codec::{Column, ColumnType, EntryType, LogEntryBuilder, Record, Schema, Value};
use tablewal_core::wal::{decode_segment, parse_segment_index, HistoryReader, SegmentDir, SegmentFetch, HEADER_LEN};
use tablewal_core::{CoreError, WalCoordinator};
use tablewal_storage::{InMemoryObjectStore, ObjectStore};
use tempfile::tempdir;

#[test]
fn ids_stay_monotonic_across_restarts() {
    let cache = tempdir().unwrap();
    let store = Arc::new(InMemoryObjectStore::new());
    {
        let wal = open(cache.path(), store.clone());
        for k in 0..20 {
            assert_eq!(wal.append(row(k)).unwrap(), k as u64 + 1);
        }
        wal.terminate().unwrap();
    }

    let wal = open(cache.path(), store);
    assert_eq!(wal.max_entry_id(), 20);
    assert_eq!(wal.append(row(20)).unwrap(), 21);
    wal.flush().unwrap();
    assert_eq!(ids(&replay(&wal)), (1..=21).collect::<Vec<_>>());
}

#[test]
fn concurrent_producers_get_distinct_ordered_ids() {
    let cache = tempdir().unwrap();
    let wal = Arc::new(open(cache.path(), Arc::new(InMemoryObjectStore::new())));

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let wal = Arc::clone(&wal);
            thread::spawn(move || {
                (0..50)
                    .map(|k| wal.append(row(t * 100 + k)).unwrap())
                    .collect::<Vec<u64>>()
            })
        })
        .collect();

    let mut all = Vec::new();
    for handle in handles {
        let ids = handle.join().unwrap();
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
        all.extend(ids);
    }
    all.sort_unstable();
    assert_eq!(all, (1..=200).collect::<Vec<_>>());

    wal.flush().unwrap();
    assert_eq!(ids(&replay(&wal)), all);
}

#[test]
fn segments_never_exceed_max_size() {
    let cache = tempdir().unwrap();
    let store = Arc::new(InMemoryObjectStore::new());
    let wal = open(cache.path(), store.clone());

    for k in 0..100 {
        wal.append(row(k)).unwrap();
    }
    wal.flush().unwrap();
    wal.replicator().wait_idle();

    let dir = SegmentDir::new(cache.path());
    for index in dir.list_indices().unwrap() {
        let len = fs::metadata(dir.segment_path(index)).unwrap().len();
        assert!(len <= MAX_SEGMENT_SIZE, "local segment {index} is {len} bytes");
    }

    assert!(store.len() > 5);
    for key in store.keys() {
        let index = parse_segment_index(PREFIX, &key).unwrap();
        let (_, payload) = decode_segment(index, store.get(&key).unwrap()).unwrap();
        assert!((HEADER_LEN + payload.len()) as u64 <= MAX_SEGMENT_SIZE);
    }
}

#[test]
fn entries_round_trip() {
    let cache = tempdir().unwrap();
    let store = Arc::new(InMemoryObjectStore::new());
    let wal = open(cache.path(), store.clone());

    let schema = Schema::new(vec![
        Column::new("id", ColumnType::Int),
        Column::new("name", ColumnType::Text),
        Column::new("score", ColumnType::Float),
        Column::new("active", ColumnType::Bool),
        Column::new("avatar", ColumnType::Bytes),
    ]);
    let builders = vec![
        LogEntryBuilder::update("users")
            .schema(schema)
            .record(Record::new(vec![
                Value::Int(1),
                Value::Text("ada".into()),
                Value::Float(9.5),
                Value::Bool(true),
                Value::Bytes(vec![0, 1, 2]),
            ]))
            .record(Record::new(vec![
                Value::Int(2),
                Value::Null,
                Value::Float(-0.25),
                Value::Bool(false),
                Value::Bytes(Vec::new()),
            ])),
        LogEntryBuilder::new("users", EntryType::Delete).record(Record::new(vec![Value::Int(2)])),
        LogEntryBuilder::new("sessions", EntryType::Truncate),
        LogEntryBuilder::update("users").record(Record::new(vec![
            Value::Int(3),
            Value::Text("grace".into()),
            Value::Float(7.0),
            Value::Bool(true),
            Value::Null,
        ])),
    ];

    let mut expected = Vec::new();
    for builder in builders {
        let id = wal.append(builder.clone()).unwrap();
        expected.push(builder.build(id));
    }
    wal.flush().unwrap();
    assert_eq!(replay(&wal), expected);
    wal.terminate().unwrap();

    // The same entries come back from the remote tier alone.
    let fresh = tempdir().unwrap();
    let other = open(fresh.path(), store);
    assert_eq!(replay(&other), expected);
}

#[test]
fn torn_tail_is_truncated_on_restart() {
    let cache = tempdir().unwrap();
    let store = Arc::new(InMemoryObjectStore::new());
    {
        let wal = open(cache.path(), store.clone());
        for k in 0..10 {
            wal.append(row(k)).unwrap();
        }
        wal.terminate().unwrap();
    }

    let dir = SegmentDir::new(cache.path());
    let last = *dir.list_indices().unwrap().last().unwrap();
    let torn = entry(11).to_delimited_bytes();
    let mut file = OpenOptions::new().append(true).open(dir.segment_path(last)).unwrap();
    file.write_all(&torn[..torn.len() / 2]).unwrap();
    drop(file);

    let wal = open(cache.path(), store);
    assert_eq!(wal.max_entry_id(), 10);
    assert_eq!(wal.append(row(10)).unwrap(), 11);
    wal.flush().unwrap();
    assert_eq!(ids(&replay(&wal)), (1..=11).collect::<Vec<_>>());
    wal.terminate().unwrap();

    // Nothing of the torn write is left behind.
    let indices = dir.list_indices().unwrap();
    let reader_dir = dir.clone();
    let fetch: SegmentFetch = Box::new(move |index: u64| reader_dir.read_segment(index, None));
    let strict = HistoryReader::new(indices, fetch);
    assert!(strict.collect::<Result<Vec<_>, _>>().is_ok());
}

#[test]
fn torn_tail_with_both_reader_modes() {
    let cache = tempdir().unwrap();
    let mut data = segment_bytes(1..=5);
    let torn = entry(6).to_delimited_bytes();
    data.extend_from_slice(&torn[..torn.len() - 2]);
    let dir = SegmentDir::new(cache.path());
    fs::write(dir.segment_path(1), &data).unwrap();

    let lenient: Vec<u64> = dir.reader(vec![1]).map(|r| r.unwrap().id()).collect();
    assert_eq!(lenient, vec![1, 2, 3, 4, 5]);

    let strict_dir = dir.clone();
    let fetch: SegmentFetch = Box::new(move |index: u64| strict_dir.read_segment(index, None));
    let results: Vec<_> = HistoryReader::new(vec![1], fetch)
        .ignore_trailing_corruption(false)
        .collect();
    assert_eq!(results.len(), 6);
    assert!(results[..5].iter().all(Result::is_ok));
    assert!(matches!(
        results[5],
        Err(CoreError::SegmentCorruption { index: 1, .. })
    ));
}

#[test]
fn corruption_before_last_local_segment_is_fatal() {
    let cache = tempdir().unwrap();
    let mut first = segment_bytes(1..=5);
    first.truncate(first.len() - 3);
    fs::create_dir_all(cache.path()).unwrap();
    fs::write(SegmentDir::new(cache.path()).segment_path(1), first).unwrap();
    write_local_segment(cache.path(), 2, 6..=8);

    let wal = WalCoordinator::open(config(cache.path()), Arc::new(InMemoryObjectStore::new()))
        .unwrap();
    let results: Vec<_> = wal.read_all().unwrap().collect();
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 4);
    assert!(matches!(
        results.last(),
        Some(Err(CoreError::SegmentCorruption { index: 1, .. }))
    ));

    // The write cursor cannot be recovered past the damage.
    assert!(matches!(
        wal.append(row(1)),
        Err(CoreError::SegmentCorruption { index: 1, .. })
    ));
}

#[test]
fn failed_local_write_is_retried_without_loss() {
    let cache = tempdir().unwrap();
    let wal = Arc::new(open(cache.path(), Arc::new(InMemoryObjectStore::new())));
    let next = wal.current_segment().index + 1;
    let blocker = SegmentDir::new(cache.path()).segment_path(next);
    fs::create_dir(&blocker).unwrap();

    for k in 0..30 {
        wal.append(row(k)).unwrap();
    }
    let (done_tx, done_rx) = mpsc::channel();
    let flusher = {
        let wal = Arc::clone(&wal);
        thread::spawn(move || done_tx.send(wal.flush()).unwrap())
    };

    // The writer cannot rotate while the next segment path is a directory.
    assert!(done_rx.recv_timeout(Duration::from_millis(200)).is_err());

    fs::remove_dir(&blocker).unwrap();
    done_rx.recv_timeout(Duration::from_secs(10)).unwrap().unwrap();
    flusher.join().unwrap();
    assert_eq!(ids(&replay(&wal)), (1..=30).collect::<Vec<_>>());
}

#[test]
fn flush_waits_for_queued_entries() {
    let cache = tempdir().unwrap();
    let wal = open(cache.path(), Arc::new(InMemoryObjectStore::new()));
    wal.flush().unwrap();

    for k in 0..100 {
        wal.append(row(k)).unwrap();
    }
    wal.flush().unwrap();
    assert_eq!(ids(&replay(&wal)), (1..=100).collect::<Vec<_>>());
    assert_eq!(wal.current_segment().max_entry_id, 100);
}

#[test]
fn terminated_wal_rejects_producers() {
    let cache = tempdir().unwrap();
    let wal = open(cache.path(), Arc::new(InMemoryObjectStore::new()));
    wal.append(row(1)).unwrap();
    wal.terminate().unwrap();

    assert!(matches!(wal.append(row(2)), Err(CoreError::Terminated)));
    assert!(matches!(wal.flush(), Err(CoreError::Terminated)));
    wal.terminate().unwrap();
}

#[test]
fn cache_directory_is_exclusive() {
    let cache = tempdir().unwrap();
    let store: Arc<dyn ObjectStore> = Arc::new(InMemoryObjectStore::new());

    let first = WalCoordinator::open(config(cache.path()), Arc::clone(&store)).unwrap();
    assert!(matches!(
        WalCoordinator::open(config(cache.path()), Arc::clone(&store)),
        Err(CoreError::CacheLocked { .. })
    ));

    drop(first);
    WalCoordinator::open(config(cache.path()), store).unwrap();
}
