//! Redshift extractor adapter on the PostgreSQL wire protocol.
//!
//! Redshift speaks the Postgres protocol and exposes `information_schema`,
//! so the adapter runs on the Postgres driver. Catalog queries stick to
//! constructs Redshift actually supports.
//!
//! # Module Structure
//! - `connection`: Connection pool management and URL validation
//! - `metadata`: Table and column catalog collection
//! - `export`: Streaming CSV export and max-value probes

pub mod connection;
pub mod export;
pub mod metadata;

use std::path::Path;

use async_trait::async_trait;
use sqlx::PgPool;

use super::{ExtractorAdapter, TrackedColumn};
use crate::Result;
use crate::dialect::{Dialect, RedshiftDialect};
use crate::error::ExtractorError;
use crate::models::{Column, DatabaseType, ExportResult, Table, TableRef};

/// Redshift extractor adapter.
pub struct RedshiftExtractor {
    /// Connection pool for database operations
    pub pool: PgPool,
    // Kept private to prevent credential exposure
    connection_url: String,
}

impl std::fmt::Debug for RedshiftExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedshiftExtractor")
            .field("pool_size", &self.pool.size())
            .field(
                "url",
                &crate::error::redact_database_url(&self.connection_url),
            )
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ExtractorAdapter for RedshiftExtractor {
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

        let _: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM information_schema.tables WHERE table_schema = 'information_schema'",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            ExtractorError::query_failed(format!("Cannot access information_schema: {}", e))
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
        &RedshiftDialect
    }

    fn database_type(&self) -> DatabaseType {
        DatabaseType::Redshift
    }
}
