//! Dump command implementation.

use super::source::Source;
use serde::Serialize;
use tablewal_codec::{EntryType, LogEntry};

/// Entry representation for output.
#[derive(Debug, Serialize)]
pub struct EntryInfo {
    /// Segment the entry was read from.
    pub segment: u64,
    /// Entry id.
    pub id: u64,
    /// Entry type.
    pub entry_type: String,
    /// Table name.
    pub table: String,
    /// Whether the entry carries a schema.
    pub has_schema: bool,
    /// Number of records.
    pub records: usize,
    /// Encoded size in bytes, length prefix included.
    pub size: usize,
}

impl EntryInfo {
    fn new(segment: u64, entry: &LogEntry) -> Self {
        let entry_type = match entry.entry_type() {
            EntryType::Update => "UPDATE",
            EntryType::Delete => "DELETE",
            EntryType::Truncate => "TRUNCATE",
        };
        Self {
            segment,
            id: entry.id(),
            entry_type: entry_type.to_string(),
            table: entry.table_name().to_string(),
            has_schema: entry.schema().is_some(),
            records: entry.records().len(),
            size: entry.encoded_len(),
        }
    }
}

/// Runs the dump command.
pub fn run(
    source: &Source,
    limit: Option<usize>,
    table: Option<&str>,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let entries = collect(source, limit, table)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&entries)?);
        }
        _ => {
            for entry in &entries {
                println!(
                    "{:>10}  seg={:<6} {:<8} table={} records={} size={}{}",
                    entry.id,
                    entry.segment,
                    entry.entry_type,
                    entry.table,
                    entry.records,
                    entry.size,
                    if entry.has_schema { " +schema" } else { "" }
                );
            }
            println!("{} entries", entries.len());
        }
    }

    Ok(())
}

/// Reads entries in replay order, keeping those for `table` if given.
pub fn collect(
    source: &Source,
    limit: Option<usize>,
    table: Option<&str>,
) -> Result<Vec<EntryInfo>, Box<dyn std::error::Error>> {
    let max = limit.unwrap_or(usize::MAX);
    let mut reader = source.reader(source.indices()?, source.may_have_torn_tail());
    let mut entries = Vec::new();

    while entries.len() < max {
        let Some(entry) = reader.next() else {
            break;
        };
        let entry = entry?;
        if table.map_or(true, |t| entry.table_name() == t) {
            let segment = reader.current_index().unwrap_or_default();
            entries.push(EntryInfo::new(segment, &entry));
        }
    }

    Ok(entries)
}
