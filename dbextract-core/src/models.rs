//! Core data models for export configuration, catalog metadata, and
//! incremental-fetching state.
//!
//! These are the structures shared by every connector: the normalized
//! table/column catalog produced by metadata providers, the watermark value
//! persisted between runs, and the result of one export invocation. All
//! models are serializable.

use serde::{Deserialize, Serialize};

/// Supported database kinds.
///
/// The MySQL adapter doubles as the generic MySQL-compatible extractor
/// (MariaDB, Aurora MySQL and friends speak the same catalog and dialect).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DatabaseType {
    MySQL,
    Redshift,
    Snowflake,
    Oracle,
}

impl std::fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DatabaseType::MySQL => write!(f, "MySQL"),
            DatabaseType::Redshift => write!(f, "Redshift"),
            DatabaseType::Snowflake => write!(f, "Snowflake"),
            DatabaseType::Oracle => write!(f, "Oracle"),
        }
    }
}

/// Reference to a table by schema and name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    pub name: String,
}

impl TableRef {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: Some(schema.into()),
            name: name.into(),
        }
    }

    /// Case-insensitive match against a catalog entry. Source databases in
    /// this family treat unquoted identifiers case-insensitively.
    pub fn matches(&self, schema: Option<&str>, name: &str) -> bool {
        let name_ok = self.name.eq_ignore_ascii_case(name);
        let schema_ok = match (&self.schema, schema) {
            (Some(want), Some(have)) => want.eq_ignore_ascii_case(have),
            (None, _) => true,
            (Some(_), None) => false,
        };
        name_ok && schema_ok
    }
}

impl std::fmt::Display for TableRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{}.{}", schema, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Table kind as reported by the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TableType {
    #[serde(rename = "table")]
    BaseTable,
    #[serde(rename = "view")]
    View,
}

/// Normalized table catalog entry produced by a metadata provider.
///
/// `columns` is empty when the caller asked for a bare table listing or when
/// the database user lacks column-introspection privilege for this table; a
/// missing column list is a degraded-but-successful result, not an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub catalog: Option<String>,
    #[serde(rename = "type")]
    pub table_type: TableType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_count: Option<u64>,
    #[serde(default)]
    pub columns: Vec<Column>,
}

impl Table {
    /// Finds a column by exact name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// Foreign-key reference attached to a column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyRef {
    pub constraint_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    pub table: String,
    pub column: String,
}

/// Normalized column catalog entry.
///
/// Multi-valued catalog rows (one row per constraint per column) are folded
/// into a single entry: the first occurrence initializes the column and
/// later occurrences only append constraint or foreign-key information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    /// Identifier made safe for the output column-naming scheme; computed
    /// the same way across all connectors.
    pub sanitized_name: String,
    pub ordinal_position: u32,
    /// Declared type name as reported by the catalog (e.g. `varchar`,
    /// `NUMBER`). Classification into base kinds is a dialect concern.
    pub data_type: String,
    pub nullable: bool,
    /// Character length or `precision,scale` rendering, when declared.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub length: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    pub primary_key: bool,
    pub unique_key: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_increment: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub foreign_key: Option<ForeignKeyRef>,
}

/// Watermark value of the incremental-fetching column, persisted as state
/// between runs. Deserialized untagged so that `4`, `4.5`, and
/// `"2024-01-01 00:00:00"` all round-trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Watermark {
    Int(i64),
    Float(f64),
    Text(String),
}

impl Watermark {
    /// Builds a watermark from a raw value string fetched from the database,
    /// keeping numeric values numeric so they serialize back into state
    /// without quotes.
    pub fn from_raw(kind: WatermarkType, raw: &str) -> Self {
        match kind {
            WatermarkType::Numeric => {
                if let Ok(i) = raw.parse::<i64>() {
                    Watermark::Int(i)
                } else if let Ok(f) = raw.parse::<f64>() {
                    Watermark::Float(f)
                } else {
                    Watermark::Text(raw.to_string())
                }
            }
            WatermarkType::Timestamp | WatermarkType::Date => Watermark::Text(raw.to_string()),
        }
    }
}

impl std::fmt::Display for Watermark {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Watermark::Int(i) => write!(f, "{}", i),
            Watermark::Float(v) => write!(f, "{}", v),
            Watermark::Text(s) => write!(f, "{}", s),
        }
    }
}

/// Comparison semantics of the incremental-fetching column, resolved once
/// per export from the declared column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WatermarkType {
    Numeric,
    Timestamp,
    Date,
}

/// Connector input/output state persisted across runs.
///
/// Once non-null, `last_fetched_row` is monotonically non-decreasing across
/// successful runs for a fixed incremental-fetching column: the next run's
/// WHERE clause re-includes rows `>=` the last value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IncrementalState {
    #[serde(
        rename = "lastFetchedRow",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub last_fetched_row: Option<Watermark>,
}

/// Result of one export adapter invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportResult {
    pub rows_count: u64,
    /// Maximum value of the incremental-fetching column observed while
    /// streaming; `None` when the export is not incremental, when the max
    /// was fetched separately up front, or when no rows were produced.
    pub inc_fetching_col_max_value: Option<Watermark>,
    /// True for multi-part (sliced) outputs.
    pub is_sliced: bool,
}

/// Makes an identifier safe for the output naming scheme.
///
/// Deterministic: every character outside `[A-Za-z0-9_]` is replaced with an
/// underscore, case is preserved, and an all-unsafe input falls back to a
/// non-empty placeholder.
pub fn sanitize_name(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();

    if sanitized.chars().all(|c| c == '_') {
        "empty_name".to_string()
    } else {
        sanitized
    }
}

/// Sanitizes a set of column names, keeping the result collision-safe within
/// one table by suffixing later duplicates with their ordinal position.
pub fn sanitize_column_names(names: &[(String, u32)]) -> Vec<String> {
    let mut seen: std::collections::HashSet<String> = std::collections::HashSet::new();
    let mut out = Vec::with_capacity(names.len());

    for (name, ordinal) in names {
        let mut candidate = sanitize_name(name);
        if !seen.insert(candidate.clone()) {
            candidate = format!("{}_{}", candidate, ordinal);
            seen.insert(candidate.clone());
        }
        out.push(candidate);
    }

    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_name_replaces_unsafe_characters() {
        assert_eq!(sanitize_name("_weird-I-d"), "_weird_I_d");
        assert_eq!(sanitize_name("weir%d i-d"), "weir_d_i_d");
        assert_eq!(sanitize_name("plain_name9"), "plain_name9");
    }

    #[test]
    fn test_sanitize_name_preserves_case() {
        assert_eq!(sanitize_name("CamelCase"), "CamelCase");
    }

    #[test]
    fn test_sanitize_name_non_empty_fallback() {
        assert_eq!(sanitize_name(""), "empty_name");
        assert_eq!(sanitize_name("%$#"), "empty_name");
    }

    #[test]
    fn test_sanitize_is_deterministic() {
        assert_eq!(sanitize_name("weir\"d"), sanitize_name("weir\"d"));
    }

    #[test]
    fn test_sanitize_column_names_collision_safe() {
        let names = vec![
            ("col a".to_string(), 1),
            ("col-a".to_string(), 2),
            ("other".to_string(), 3),
        ];
        let sanitized = sanitize_column_names(&names);
        assert_eq!(sanitized, vec!["col_a", "col_a_2", "other"]);
    }

    #[test]
    fn test_table_ref_matches_case_insensitive() {
        let wanted = TableRef::new("testSchema", "Test");
        assert!(wanted.matches(Some("TESTSCHEMA"), "test"));
        assert!(!wanted.matches(Some("other"), "test"));
        assert!(!wanted.matches(None, "test"));
    }

    #[test]
    fn test_watermark_from_raw_numeric() {
        assert_eq!(
            Watermark::from_raw(WatermarkType::Numeric, "42"),
            Watermark::Int(42)
        );
        assert_eq!(
            Watermark::from_raw(WatermarkType::Numeric, "4.5"),
            Watermark::Float(4.5)
        );
    }

    #[test]
    fn test_watermark_from_raw_timestamp_stays_text() {
        assert_eq!(
            Watermark::from_raw(WatermarkType::Timestamp, "2024-01-01 00:00:00"),
            Watermark::Text("2024-01-01 00:00:00".to_string())
        );
    }

    #[test]
    fn test_incremental_state_serde_round_trip() {
        let json = r#"{"lastFetchedRow": 4}"#;
        let state: IncrementalState = serde_json::from_str(json).unwrap();
        assert_eq!(state.last_fetched_row, Some(Watermark::Int(4)));

        let rendered = serde_json::to_string(&state).unwrap();
        assert_eq!(rendered, r#"{"lastFetchedRow":4}"#);
    }

    #[test]
    fn test_incremental_state_absent_watermark() {
        let state: IncrementalState = serde_json::from_str("{}").unwrap();
        assert_eq!(state.last_fetched_row, None);
        assert_eq!(serde_json::to_string(&state).unwrap(), "{}");
    }

    #[test]
    fn test_incremental_state_string_watermark() {
        let json = r#"{"lastFetchedRow": "2024-06-01 12:00:00"}"#;
        let state: IncrementalState = serde_json::from_str(json).unwrap();
        assert_eq!(
            state.last_fetched_row,
            Some(Watermark::Text("2024-06-01 12:00:00".to_string()))
        );
    }
}
