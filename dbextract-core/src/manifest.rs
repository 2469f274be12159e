//! Output manifest generation.
//!
//! Every successful non-empty export writes a `<name>.csv.manifest` sidecar
//! describing the destination table, primary key, and per-column type
//! metadata as `KBC.*` key/value pairs. The manifest is skipped entirely for
//! zero-row exports.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Serialize;

use crate::dialect::Dialect;
use crate::error::{ExtractorError, Result};
use crate::models::{Column, Table};

/// One `KBC.*` metadata key/value pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetadataEntry {
    pub key: String,
    pub value: String,
}

impl MetadataEntry {
    fn new(key: &str, value: impl Into<String>) -> Self {
        Self {
            key: key.to_string(),
            value: value.into(),
        }
    }
}

/// Sidecar manifest written next to the CSV output.
#[derive(Debug, Clone, Serialize)]
pub struct Manifest {
    pub destination: String,
    pub incremental: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub primary_key: Vec<String>,
    /// Sanitized column names, in ordinal order. Present because the CSV is
    /// written without a header row.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub columns: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub metadata: Vec<MetadataEntry>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub column_metadata: BTreeMap<String, Vec<MetadataEntry>>,
}

impl Manifest {
    /// Builds the manifest for a table-based export with full catalog
    /// metadata available.
    pub fn for_table(
        destination: &str,
        incremental: bool,
        primary_key: &[String],
        table: &Table,
        dialect: &dyn Dialect,
    ) -> Self {
        let mut metadata = vec![MetadataEntry::new("KBC.name", table.name.clone())];
        if let Some(schema) = &table.schema {
            metadata.push(MetadataEntry::new("KBC.schema", schema.clone()));
        }
        metadata.push(MetadataEntry::new(
            "KBC.type",
            match table.table_type {
                crate::models::TableType::BaseTable => "table",
                crate::models::TableType::View => "view",
            },
        ));
        if let Some(row_count) = table.row_count {
            metadata.push(MetadataEntry::new("KBC.rowCount", row_count.to_string()));
        }

        let mut columns = Vec::with_capacity(table.columns.len());
        let mut column_metadata = BTreeMap::new();
        for column in &table.columns {
            columns.push(column.sanitized_name.clone());
            column_metadata.insert(
                column.sanitized_name.clone(),
                column_entries(column, dialect),
            );
        }

        Self {
            destination: destination.to_string(),
            incremental,
            primary_key: primary_key.to_vec(),
            columns,
            metadata,
            column_metadata,
        }
    }

    /// Builds the manifest for a query-based export, where only the
    /// result-set column shape is known.
    pub fn for_query(
        destination: &str,
        incremental: bool,
        primary_key: &[String],
        columns: &[Column],
        dialect: &dyn Dialect,
    ) -> Self {
        let mut names = Vec::with_capacity(columns.len());
        let mut column_metadata = BTreeMap::new();
        for column in columns {
            names.push(column.sanitized_name.clone());
            column_metadata.insert(
                column.sanitized_name.clone(),
                column_entries(column, dialect),
            );
        }

        Self {
            destination: destination.to_string(),
            incremental,
            primary_key: primary_key.to_vec(),
            columns: names,
            metadata: Vec::new(),
            column_metadata,
        }
    }

    /// Persists the manifest next to the CSV at `csv_path`, as
    /// `<csv_path>.manifest`.
    pub async fn write_next_to(&self, csv_path: &Path) -> Result<()> {
        let manifest_path = manifest_path(csv_path);
        let body = serde_json::to_string_pretty(self)
            .map_err(|e| ExtractorError::serialization("encoding manifest", e))?;
        tokio::fs::write(&manifest_path, body).await.map_err(|e| {
            ExtractorError::io(
                format!("writing manifest {}", manifest_path.display()),
                e,
            )
        })
    }
}

/// Path of the manifest sidecar for a CSV output file.
pub fn manifest_path(csv_path: &Path) -> std::path::PathBuf {
    let mut name = csv_path.as_os_str().to_os_string();
    name.push(".manifest");
    std::path::PathBuf::from(name)
}

fn column_entries(column: &Column, dialect: &dyn Dialect) -> Vec<MetadataEntry> {
    let base = dialect.classify_type(&column.data_type);
    let mut entries = vec![
        MetadataEntry::new("KBC.datatype.type", column.data_type.clone()),
        MetadataEntry::new("KBC.datatype.basetype", base.as_manifest_str()),
        MetadataEntry::new("KBC.datatype.nullable", column.nullable.to_string()),
    ];
    if let Some(length) = &column.length {
        entries.push(MetadataEntry::new("KBC.datatype.length", length.clone()));
    }
    if let Some(default) = &column.default {
        entries.push(MetadataEntry::new("KBC.datatype.default", default.clone()));
    }
    entries.push(MetadataEntry::new(
        "KBC.primaryKey",
        column.primary_key.to_string(),
    ));
    entries.push(MetadataEntry::new(
        "KBC.uniqueKey",
        column.unique_key.to_string(),
    ));
    entries.push(MetadataEntry::new(
        "KBC.ordinalPosition",
        column.ordinal_position.to_string(),
    ));
    if let Some(auto_increment) = column.auto_increment {
        entries.push(MetadataEntry::new(
            "KBC.autoIncrement",
            auto_increment.to_string(),
        ));
    }
    if let Some(fk) = &column.foreign_key {
        entries.push(MetadataEntry::new(
            "KBC.foreignKeyName",
            fk.constraint_name.clone(),
        ));
        if let Some(schema) = &fk.schema {
            entries.push(MetadataEntry::new("KBC.foreignKeyRefSchema", schema.clone()));
        }
        entries.push(MetadataEntry::new("KBC.foreignKeyRefTable", fk.table.clone()));
        entries.push(MetadataEntry::new("KBC.foreignKeyRefColumn", fk.column.clone()));
    }
    entries
}
