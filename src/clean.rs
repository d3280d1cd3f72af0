use anyhow::{Context, Result};
use arrow::datatypes::SchemaRef;
use std::{path::Path, time::Instant};
use tracing::{debug, info, warn};

use crate::{
    config::{BATCH_ROWS, MAX_FIELD_CHARS},
    table::{self, CsvWriter, Record, Row},
};

/// What the cleaner decided for a single row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowOutcome {
    Keep,
    /// Some field exceeded `MAX_FIELD_CHARS`; the row is dropped.
    Oversized,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CleanStats {
    pub written: u64,
    pub skipped: u64,
}

fn is_oversized(value: &str) -> bool {
    // cheap byte check first; char count only matters for long multi-byte values
    value.len() > MAX_FIELD_CHARS && value.chars().count() > MAX_FIELD_CHARS
}

fn normalize_bool(value: &mut String) {
    match value.as_str() {
        "TRUE" => *value = "true".to_string(),
        "FALSE" => *value = "false".to_string(),
        _ => {}
    }
}

/// Apply the cleaning rules to `row` in place.
///
/// Oversized rows are reported before anything is modified, so a dropped row
/// is left exactly as it was read.
pub fn clean_row(row: &mut Row) -> RowOutcome {
    if row.values().iter().any(|v| is_oversized(v)) {
        return RowOutcome::Oversized;
    }

    row.set("user_id", "");
    row.values_mut().iter_mut().for_each(normalize_bool);

    RowOutcome::Keep
}

/// Stream `input` into `output`, dropping oversized rows and normalizing the rest.
///
/// Malformed records (more fields than the header, invalid UTF-8) are logged,
/// skipped and counted; they never stop the run or affect neighbouring rows.
pub fn clean_csv(input: &Path, output: &Path) -> Result<CleanStats> {
    let start = Instant::now();
    info!(input = %input.display(), output = %output.display(), "cleaning CSV");

    // both checks happen before the output file is touched
    let schema = table::read_header(input)?;
    let records = table::open_rows(input, &schema)?;

    let mut writer = table::create_writer(output, &schema)?;
    let mut stats = CleanStats::default();
    let mut kept = Vec::with_capacity(BATCH_ROWS);

    for record in records {
        let mut row = match record.with_context(|| format!("reading {}", input.display()))? {
            Record::Row(row) => row,
            Record::Malformed { line, reason } => {
                warn!(line, "skipping malformed record: {}", reason);
                stats.skipped += 1;
                continue;
            }
        };

        match clean_row(&mut row) {
            RowOutcome::Keep => kept.push(row),
            RowOutcome::Oversized => {
                debug!(id = row.get("id").unwrap_or(""), "dropping oversized row");
                stats.skipped += 1;
            }
        }

        if kept.len() >= BATCH_ROWS {
            stats.written += write_rows(&mut writer, &schema, &mut kept, output)?;
        }
    }
    stats.written += write_rows(&mut writer, &schema, &mut kept, output)?;

    table::finish_writer(writer)?;
    info!(
        written = stats.written,
        skipped = stats.skipped,
        elapsed = ?start.elapsed(),
        "cleaned CSV"
    );
    Ok(stats)
}

fn write_rows(
    writer: &mut CsvWriter,
    schema: &SchemaRef,
    rows: &mut Vec<Row>,
    output: &Path,
) -> Result<u64> {
    if rows.is_empty() {
        return Ok(0);
    }
    let batch = table::rows_to_batch(schema, rows)?;
    writer
        .write(&batch)
        .with_context(|| format!("writing rows to {}", output.display()))?;
    let n = rows.len() as u64;
    rows.clear();
    Ok(n)
}
