//! Streaming CSV export and max-value probes for MySQL.
//!
//! Rows are pulled through a server-side cursor and written straight to the
//! CSV sink; the result set is never buffered in memory. A mid-stream
//! failure discards the partial file so a retry re-runs the whole query.

use std::path::Path;

use futures::TryStreamExt;
use sqlx::{Column as SqlxColumn, MySqlPool, Row};

use crate::Result;
use crate::adapters::helpers::{CsvSink, MaxTracker, map_driver_error};
use crate::adapters::TrackedColumn;
use crate::models::ExportResult;

/// Runs a `SELECT MAX(...)` probe, rendering the value as text.
pub async fn fetch_max_value(pool: &MySqlPool, query: &str) -> Result<Option<String>> {
    let row = sqlx::query(query)
        .fetch_optional(pool)
        .await
        .map_err(|e| map_driver_error("Failed to fetch watermark maximum", &e))?;

    Ok(row.and_then(|r| value_to_string(&r, 0)))
}

/// Streams the query's rows into a CSV file.
pub async fn export(
    pool: &MySqlPool,
    query: &str,
    out_path: &Path,
    tracked: Option<&TrackedColumn>,
) -> Result<ExportResult> {
    let mut sink = CsvSink::new(out_path.to_path_buf());
    let mut tracker = tracked.map(|t| (t.name.as_str(), MaxTracker::new(t.kind)));

    let mut stream = sqlx::query(query).fetch(pool);
    let mut tracked_index: Option<usize> = None;

    loop {
        let row = match stream.try_next().await {
            Ok(Some(row)) => row,
            Ok(None) => break,
            Err(e) => {
                sink.discard();
                return Err(map_driver_error("Export query failed", &e));
            }
        };

        if let Some((name, _)) = &tracker
            && tracked_index.is_none()
        {
            tracked_index = row.columns().iter().position(|c| c.name() == *name);
        }

        let mut fields = Vec::with_capacity(row.columns().len());
        for i in 0..row.columns().len() {
            let value = value_to_string(&row, i);
            if Some(i) == tracked_index
                && let Some((_, tracker)) = tracker.as_mut()
            {
                tracker.observe(value.as_deref());
            }
            // NULL is rendered as an empty field.
            fields.push(value.unwrap_or_default());
        }

        if let Err(e) = sink.write_record(&fields) {
            sink.discard();
            return Err(e);
        }
    }

    let rows_count = sink.finish()?;
    if rows_count == 0 {
        tracing::warn!(path = %out_path.display(), "Export produced no rows, no output file written");
    }

    Ok(ExportResult {
        rows_count,
        inc_fetching_col_max_value: if rows_count > 0 {
            tracker.and_then(|(_, t)| t.into_watermark())
        } else {
            None
        },
        is_sliced: false,
    })
}

/// Renders one column value as text, trying decode types in order of
/// likelihood. Unsupported types come back as `None` and export as empty
/// fields.
fn value_to_string(row: &sqlx::mysql::MySqlRow, index: usize) -> Option<String> {
    if let Ok(v) = row.try_get::<Option<String>, _>(index) {
        return v;
    }
    if let Ok(v) = row.try_get::<Option<i64>, _>(index) {
        return v.map(|n| n.to_string());
    }
    if let Ok(v) = row.try_get::<Option<u64>, _>(index) {
        return v.map(|n| n.to_string());
    }
    if let Ok(v) = row.try_get::<Option<f64>, _>(index) {
        return v.map(|n| n.to_string());
    }
    // DECIMAL/NUMERIC only decodes through rust_decimal; the text and float
    // decodes above reject it.
    if let Ok(v) = row.try_get::<Option<rust_decimal::Decimal>, _>(index) {
        return v.map(|d| d.to_string());
    }
    if let Ok(v) = row.try_get::<Option<bool>, _>(index) {
        return v.map(|b| if b { "1" } else { "0" }.to_string());
    }
    if let Ok(v) = row.try_get::<Option<chrono::NaiveDateTime>, _>(index) {
        return v.map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string());
    }
    if let Ok(v) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(index) {
        return v.map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string());
    }
    if let Ok(v) = row.try_get::<Option<chrono::NaiveDate>, _>(index) {
        return v.map(|d| d.format("%Y-%m-%d").to_string());
    }
    if let Ok(v) = row.try_get::<Option<Vec<u8>>, _>(index) {
        return v.map(|bytes| String::from_utf8_lossy(&bytes).into_owned());
    }
    None
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::str::FromStr;

    use rust_decimal::Decimal;

    #[test]
    fn test_decimal_values_render_as_plain_decimal_text() {
        // CSV fields and watermark literals must never carry exponents or
        // locale formatting.
        let wide = Decimal::from_str("1234567890123456.7890").unwrap();
        assert_eq!(wide.to_string(), "1234567890123456.7890");

        let negative = Decimal::from_str("-0.0001").unwrap();
        assert_eq!(negative.to_string(), "-0.0001");
    }
}
