//! MySQL extractor adapter with connection pooling.
//!
//! This adapter also serves MySQL-compatible engines (MariaDB, Aurora MySQL)
//! since they share the `information_schema` catalog and backtick dialect.
//!
//! # Module Structure
//! - `connection`: Connection pool management and URL validation
//! - `metadata`: Table and column catalog collection
//! - `export`: Streaming CSV export and max-value probes
//!
//! # Security Guarantees
//! - All operations are read-only (SELECT only)
//! - Connection strings are redacted in error messages

pub mod connection;
pub mod export;
pub mod metadata;

use std::path::Path;

use async_trait::async_trait;
use sqlx::MySqlPool;

use super::{ExtractorAdapter, TrackedColumn};
use crate::Result;
use crate::dialect::{Dialect, MySqlDialect};
use crate::error::ExtractorError;
use crate::models::{Column, DatabaseType, ExportResult, Table, TableRef};

/// MySQL extractor adapter.
pub struct MySqlExtractor {
    /// Connection pool for database operations
    pub pool: MySqlPool,
    // Kept private to prevent credential exposure
    connection_url: String,
}

impl std::fmt::Debug for MySqlExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MySqlExtractor")
            .field("pool_size", &self.pool.size())
            .field(
                "url",
                &crate::error::redact_database_url(&self.connection_url),
            )
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ExtractorAdapter for MySqlExtractor {
    async fn test_connection(&self) -> Result<()> {
        let probe: i32 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                ExtractorError::connectivity(format!(
                    "Cannot reach {}: {}",
                    crate::error::redact_database_url(&self.connection_url),
                    e
                ))
            })?;

        if probe != 1 {
            return Err(ExtractorError::connectivity(
                "Connectivity probe returned an unexpected result",
            ));
        }

        // Catalog access is required by every action beyond testConnection.
        let _: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM INFORMATION_SCHEMA.TABLES WHERE TABLE_SCHEMA = 'information_schema'",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            ExtractorError::query_failed(format!("Cannot access INFORMATION_SCHEMA: {}", e))
        })?;

        Ok(())
    }

    async fn list_tables(&self, whitelist: &[TableRef], load_columns: bool) -> Result<Vec<Table>> {
        metadata::list_tables(&self.pool, whitelist, load_columns).await
    }

    async fn get_table(&self, table: &TableRef) -> Result<Table> {
        metadata::get_table(&self.pool, table).await
    }

    async fn get_columns_info(&self, query: &str) -> Result<Vec<Column>> {
        metadata::get_columns_info(&self.pool, query).await
    }

    async fn fetch_max_value(&self, query: &str) -> Result<Option<String>> {
        export::fetch_max_value(&self.pool, query).await
    }

    async fn export(
        &self,
        query: &str,
        out_path: &Path,
        tracked: Option<&TrackedColumn>,
    ) -> Result<ExportResult> {
        export::export(&self.pool, query, out_path, tracked).await
    }

    fn dialect(&self) -> &dyn Dialect {
        &MySqlDialect
    }

    fn database_type(&self) -> DatabaseType {
        DatabaseType::MySQL
    }
}
