//! Splitting of entries too large for one segment.

use crate::error::{CoreError, CoreResult};
use tablewal_codec::{delimited_len, LogEntry, LogEntryBuilder, Record};

/// One part under construction.
struct Part {
    builder: LogEntryBuilder,
    id: u64,
    header_len: usize,
    records_len: usize,
    records: Vec<Record>,
}

impl Part {
    fn start(builder: LogEntryBuilder, id: u64, capacity: usize) -> CoreResult<Self> {
        let header_len = builder.header_len(id);
        if delimited_len(header_len) > capacity {
            return Err(CoreError::validation(format!(
                "entry header for table '{}' needs {} bytes, segment capacity is {capacity}",
                builder.table_name(),
                delimited_len(header_len),
            )));
        }
        Ok(Self {
            builder,
            id,
            header_len,
            records_len: 0,
            records: Vec::new(),
        })
    }

    fn fits(&self, record: &Record, capacity: usize) -> bool {
        delimited_len(self.header_len + self.records_len + record.framed_len()) <= capacity
    }

    fn push(&mut self, record: Record) {
        self.records_len += record.framed_len();
        self.records.push(record);
    }

    fn finish(self) -> LogEntry {
        self.builder.records(self.records).build(self.id)
    }
}

/// Splits `entry` into consecutive-id parts that each encode to at most
/// `capacity` bytes.
///
/// The first part keeps the entry's id and schema; every later part takes
/// the next id and carries no schema. Record order is preserved.
///
/// # Errors
///
/// Returns [`CoreError::Validation`] if the schema-bearing header alone, or
/// any single record alone, cannot fit in `capacity`.
pub fn split_entry(entry: LogEntry, capacity: usize) -> CoreResult<Vec<LogEntry>> {
    let (first_id, mut template) = entry.into_parts();
    let records = template.take_records();
    let schema = template.take_schema();

    let mut parts = Vec::new();
    let mut part = Part::start(template.clone().with_schema(schema), first_id, capacity)?;

    for record in records {
        if !part.fits(&record, capacity) {
            if part.records.is_empty() && !part.builder.has_schema() {
                return Err(record_too_large(&record, part.builder.table_name(), capacity));
            }
            let next_id = part
                .id
                .checked_add(1)
                .ok_or_else(|| CoreError::validation("entry id space exhausted"))?;
            parts.push(part.finish());
            part = Part::start(template.clone(), next_id, capacity)?;
            if !part.fits(&record, capacity) {
                return Err(record_too_large(&record, part.builder.table_name(), capacity));
            }
        }
        part.push(record);
    }
    parts.push(part.finish());

    Ok(parts)
}

fn record_too_large(record: &Record, table: &str, capacity: usize) -> CoreError {
    CoreError::validation(format!(
        "record of {} bytes for table '{table}' cannot fit in segment capacity {capacity}",
        record.framed_len()
    ))
}
