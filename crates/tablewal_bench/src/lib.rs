//! Benchmark utilities.

use rand::Rng;
use tablewal_codec::{Column, ColumnType, LogEntryBuilder, Record, Schema, Value};

/// Generate random bytes of the specified size.
pub fn random_data(size: usize) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    (0..size).map(|_| rng.gen()).collect()
}

/// Schema used by [`sample_entry`].
pub fn sample_schema() -> Schema {
    Schema::new(vec![
        Column::new("id", ColumnType::Int),
        Column::new("name", ColumnType::Text),
        Column::new("score", ColumnType::Float),
        Column::new("payload", ColumnType::Bytes),
    ])
}

/// A row with a random payload of `payload_size` bytes.
pub fn sample_record(key: i64, payload_size: usize) -> Record {
    Record::new(vec![
        Value::Int(key),
        Value::Text(format!("user-{key}")),
        Value::Float(key as f64 * 0.5),
        Value::Bytes(random_data(payload_size)),
    ])
}

/// An update with `rows` rows, carrying the schema.
pub fn sample_entry(rows: usize, payload_size: usize) -> LogEntryBuilder {
    LogEntryBuilder::update("bench")
        .schema(sample_schema())
        .records((0..rows as i64).map(|k| sample_record(k, payload_size)))
}
