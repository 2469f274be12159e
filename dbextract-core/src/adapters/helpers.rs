//! Shared helper utilities for extractor adapters.
//!
//! The CSV sink and watermark tracker here are used by every live adapter so
//! that file handling and max-value semantics are identical across engines.

use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveDateTime};

use crate::error::{ExtractorError, Result};
use crate::models::{Watermark, WatermarkType, sanitize_name};

/// Classifies a driver error as transient connectivity loss or a permanent
/// query failure, based on the lost-connection signature list.
#[cfg(feature = "sqlx")]
pub fn map_driver_error(context: &str, err: &sqlx::Error) -> ExtractorError {
    let message = err.to_string();
    if crate::retry::is_transient_signature(&message) {
        ExtractorError::connectivity(format!("{}: {}", context, message))
    } else {
        ExtractorError::query_failed(format!("{}: {}", context, message))
    }
}

/// Output CSV path for an export within the data directory.
pub fn output_csv_path(out_dir: &Path, output_table: &str) -> PathBuf {
    out_dir.join(format!("{}.csv", sanitize_name(output_table)))
}

/// CSV writer that creates its file lazily on the first row.
///
/// A zero-row export must leave nothing behind, so the file is not touched
/// until a record arrives. Rows are written without a header; column names
/// travel in the manifest.
pub struct CsvSink {
    path: PathBuf,
    writer: Option<csv::Writer<std::fs::File>>,
    rows: u64,
}

impl CsvSink {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            writer: None,
            rows: 0,
        }
    }

    /// Appends one record, creating the output file if this is the first.
    pub fn write_record(&mut self, fields: &[String]) -> Result<()> {
        if self.writer.is_none() {
            let file = std::fs::File::create(&self.path)
                .map_err(|e| ExtractorError::io(format!("creating {}", self.path.display()), e))?;
            self.writer = Some(
                csv::WriterBuilder::new()
                    .has_headers(false)
                    .from_writer(file),
            );
        }

        // Writer is set just above.
        if let Some(writer) = self.writer.as_mut() {
            writer
                .write_record(fields)
                .map_err(|e| ExtractorError::query_failed(format!("writing CSV row: {}", e)))?;
        }
        self.rows += 1;
        Ok(())
    }

    /// Flushes and closes the sink, returning the number of rows written.
    pub fn finish(mut self) -> Result<u64> {
        if let Some(writer) = self.writer.take() {
            writer
                .into_inner()
                .map_err(|e| ExtractorError::query_failed(format!("flushing CSV output: {}", e)))?
                .sync_all()
                .map_err(|e| ExtractorError::io(format!("flushing {}", self.path.display()), e))?;
        }
        Ok(self.rows)
    }

    /// Removes any partially-written output after a mid-stream failure.
    ///
    /// Keyed on writer creation, not the row count: a failure on the very
    /// first record has already created the file.
    pub fn discard(mut self) {
        if self.writer.take().is_some() {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

/// Running maximum of the incremental-fetching column, observed row by row
/// while streaming.
///
/// The sequence of observed maxima is monotonically non-decreasing under the
/// column kind's ordering: numeric values compare numerically, timestamps
/// and dates compare by parsed calendar value with a lexical fallback for
/// unparseable driver renderings.
pub struct MaxTracker {
    kind: WatermarkType,
    current: Option<String>,
}

impl MaxTracker {
    pub fn new(kind: WatermarkType) -> Self {
        Self {
            kind,
            current: None,
        }
    }

    /// Observes one value; NULLs are skipped by passing `None`.
    pub fn observe(&mut self, value: Option<&str>) {
        let Some(value) = value else { return };
        match &self.current {
            None => self.current = Some(value.to_string()),
            Some(current) => {
                if compare(self.kind, value, current) == std::cmp::Ordering::Greater {
                    self.current = Some(value.to_string());
                }
            }
        }
    }

    /// Final maximum as a watermark, or `None` when no non-NULL value was
    /// seen.
    pub fn into_watermark(self) -> Option<Watermark> {
        self.current
            .map(|raw| Watermark::from_raw(self.kind, &raw))
    }
}

fn compare(kind: WatermarkType, a: &str, b: &str) -> std::cmp::Ordering {
    match kind {
        // Integers compare exactly; f64 collapses neighbors above 2^53.
        WatermarkType::Numeric => match (a.parse::<i64>(), b.parse::<i64>()) {
            (Ok(x), Ok(y)) => x.cmp(&y),
            _ => match (a.parse::<f64>(), b.parse::<f64>()) {
                (Ok(x), Ok(y)) => x.partial_cmp(&y).unwrap_or(std::cmp::Ordering::Equal),
                _ => a.cmp(b),
            },
        },
        WatermarkType::Timestamp => match (parse_datetime(a), parse_datetime(b)) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => a.cmp(b),
        },
        WatermarkType::Date => match (parse_date(a), parse_date(b)) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => a.cmp(b),
        },
    }
}

fn parse_datetime(raw: &str) -> Option<NaiveDateTime> {
    const FORMATS: &[&str] = &[
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
    ];
    FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| parse_date(raw).and_then(|d| d.and_hms_opt(0, 0, 0)))
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()
}
