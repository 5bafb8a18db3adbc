//! Verify command implementation.

use super::source::Source;
use tracing::debug;

/// Verification result.
#[derive(Debug, Default)]
pub struct VerifyResult {
    /// Number of segments opened.
    pub segments_checked: usize,
    /// Number of entries decoded.
    pub entries_checked: usize,
    /// Highest entry id seen.
    pub max_id: Option<u64>,
    /// Problems found.
    pub errors: Vec<String>,
}

impl VerifyResult {
    fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Runs the verify command.
pub fn run(source: &Source, allow_torn_tail: bool) -> Result<(), Box<dyn std::error::Error>> {
    println!("Verifying {}", source.describe());
    println!();

    let result = verify(source, allow_torn_tail)?;
    println!("Segments checked: {}", result.segments_checked);
    println!("Entries checked:  {}", result.entries_checked);
    if let Some(max) = result.max_id {
        println!("Max entry id:     {max}");
    }
    for error in &result.errors {
        println!("  ✗ {error}");
    }

    println!();
    if result.is_ok() {
        println!("✓ Verification passed");
        Ok(())
    } else {
        println!("✗ Verification failed");
        Err("Verification failed".into())
    }
}

/// Replays every segment and checks that ids increase by one from entry to
/// entry. Stops at the first decode failure.
pub fn verify(
    source: &Source,
    allow_torn_tail: bool,
) -> Result<VerifyResult, Box<dyn std::error::Error>> {
    let indices = source.indices()?;
    let mut result = VerifyResult::default();
    let mut reader = source.reader(indices.clone(), allow_torn_tail);
    let mut previous: Option<u64> = None;

    for entry in reader.by_ref() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                result.errors.push(e.to_string());
                break;
            }
        };
        result.entries_checked += 1;
        let id = entry.id();

        if let Some(prev) = previous {
            if id <= prev {
                result
                    .errors
                    .push(format!("entry {id} follows {prev}: ids must increase"));
            } else if id != prev + 1 {
                result
                    .errors
                    .push(format!("ids {} to {} are missing", prev + 1, id - 1));
            }
        }
        previous = Some(id);
        result.max_id = Some(result.max_id.map_or(id, |max| max.max(id)));
    }

    // Empty segments yield no entries, so count what the reader opened.
    result.segments_checked = match reader.current_index() {
        Some(last) => indices.iter().filter(|&&i| i <= last).count(),
        None => 0,
    };
    debug!(
        segments = result.segments_checked,
        entries = result.entries_checked,
        errors = result.errors.len(),
        "verification finished"
    );

    Ok(result)
}
