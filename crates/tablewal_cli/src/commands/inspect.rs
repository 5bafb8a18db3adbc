//! Inspect command implementation.

use super::source::Source;
use serde::Serialize;
use std::collections::BTreeSet;
use tablewal_codec::LogEntry;
use tablewal_core::wal::{decode_segment, Compression};

/// Statistics for one segment.
#[derive(Debug, Serialize)]
pub struct SegmentReport {
    /// Segment index.
    pub index: u64,
    /// Size as stored, in bytes.
    pub stored_bytes: u64,
    /// Compression of the stored image.
    pub compression: String,
    /// Number of decodable entries.
    pub entries: usize,
    /// First entry id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_id: Option<u64>,
    /// Last entry id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_id: Option<u64>,
    /// Tables touched by the segment.
    pub tables: Vec<String>,
    /// Why decoding stopped early, if it did.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Where the segments were read from.
    pub source: String,
    /// Total stored bytes.
    pub total_bytes: u64,
    /// Total decodable entries.
    pub total_entries: usize,
    /// Per-segment details.
    pub segments: Vec<SegmentReport>,
}

/// Runs the inspect command.
pub fn run(source: &Source, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let result = inspect(source)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

/// Collects statistics for every segment in `source`.
pub fn inspect(source: &Source) -> Result<InspectResult, Box<dyn std::error::Error>> {
    let mut segments = Vec::new();
    for index in source.indices()? {
        let stored = source.fetch(index)?;
        segments.push(inspect_segment(index, stored));
    }

    Ok(InspectResult {
        source: source.describe(),
        total_bytes: segments.iter().map(|s| s.stored_bytes).sum(),
        total_entries: segments.iter().map(|s| s.entries).sum(),
        segments,
    })
}

fn inspect_segment(index: u64, stored: bytes::Bytes) -> SegmentReport {
    let mut report = SegmentReport {
        index,
        stored_bytes: stored.len() as u64,
        compression: "unknown".to_string(),
        entries: 0,
        first_id: None,
        max_id: None,
        tables: Vec::new(),
        error: None,
    };

    let payload = match decode_segment(index, stored) {
        Ok((compression, payload)) => {
            report.compression = match compression {
                Compression::None => "none",
                Compression::Zstd => "zstd",
            }
            .to_string();
            payload
        }
        Err(e) => {
            report.error = Some(e.to_string());
            return report;
        }
    };

    let mut tables = BTreeSet::new();
    let mut buf = &payload[..];
    while !buf.is_empty() {
        match LogEntry::decode_delimited(&mut buf) {
            Ok(entry) => {
                report.entries += 1;
                if report.first_id.is_none() {
                    report.first_id = Some(entry.id());
                }
                report.max_id = Some(entry.id());
                tables.insert(entry.table_name().to_string());
            }
            Err(e) => {
                let offset = payload.len() - buf.len();
                report.error = Some(format!("{e} at payload offset {offset}"));
                break;
            }
        }
    }
    report.tables = tables.into_iter().collect();
    report
}

fn print_text_output(result: &InspectResult) {
    println!("Source: {}", result.source);
    println!(
        "Segments: {}  Entries: {}  Stored: {} bytes",
        result.segments.len(),
        result.total_entries,
        result.total_bytes
    );
    println!();
    println!(
        "{:>8} {:>10} {:>5} {:>8} {:>10} {:>10}  tables",
        "index", "bytes", "comp", "entries", "first", "max"
    );
    for segment in &result.segments {
        let id = |v: Option<u64>| v.map_or_else(|| "-".to_string(), |v| v.to_string());
        println!(
            "{:>8} {:>10} {:>5} {:>8} {:>10} {:>10}  {}",
            segment.index,
            segment.stored_bytes,
            segment.compression,
            segment.entries,
            id(segment.first_id),
            id(segment.max_id),
            segment.tables.join(",")
        );
        if let Some(error) = &segment.error {
            println!("{:>8} ! {error}", "");
        }
    }
}
