//! Placeholder extractor macro and dialect-only adapters.
//!
//! Snowflake and Oracle ship with a fully implemented SQL dialect (query
//! generation, type classification, watermark quoting) but no live driver
//! wiring yet. The macro generates an adapter whose database operations all
//! fail with a clear message while the dialect remains usable for query
//! generation and validation.

/// Generates a placeholder extractor adapter implementation.
///
/// # Parameters
///
/// - `$adapter_name`: The name of the adapter struct (e.g., `OracleExtractor`)
/// - `$display_name`: Human-readable name for error messages (e.g., `"Oracle"`)
/// - `$db_type`: The `DatabaseType` enum variant
/// - `$dialect`: The dialect value backing `dialect()`
#[macro_export]
macro_rules! define_placeholder_extractor {
    (
        $adapter_name:ident,
        $display_name:literal,
        $db_type:expr,
        $dialect:expr
    ) => {
        /// Placeholder extractor adapter (driver not yet wired up).
        ///
        /// The dialect is fully functional; every database operation returns
        /// an error.
        pub struct $adapter_name {
            dialect: &'static dyn $crate::dialect::Dialect,
        }

        impl $adapter_name {
            /// Creates a new placeholder adapter.
            pub async fn new(_connection_string: &str) -> $crate::Result<Self> {
                Ok(Self { dialect: $dialect })
            }

            fn unimplemented<T>() -> $crate::Result<T> {
                Err($crate::error::ExtractorError::configuration(concat!(
                    $display_name,
                    " extractor not yet implemented"
                )))
            }
        }

        #[async_trait::async_trait]
        impl $crate::adapters::ExtractorAdapter for $adapter_name {
            async fn test_connection(&self) -> $crate::Result<()> {
                Self::unimplemented()
            }

            async fn list_tables(
                &self,
                _whitelist: &[$crate::models::TableRef],
                _load_columns: bool,
            ) -> $crate::Result<Vec<$crate::models::Table>> {
                Self::unimplemented()
            }

            async fn get_table(
                &self,
                _table: &$crate::models::TableRef,
            ) -> $crate::Result<$crate::models::Table> {
                Self::unimplemented()
            }

            async fn get_columns_info(
                &self,
                _query: &str,
            ) -> $crate::Result<Vec<$crate::models::Column>> {
                Self::unimplemented()
            }

            async fn fetch_max_value(&self, _query: &str) -> $crate::Result<Option<String>> {
                Self::unimplemented()
            }

            async fn export(
                &self,
                _query: &str,
                _out_path: &std::path::Path,
                _tracked: Option<&$crate::adapters::TrackedColumn>,
            ) -> $crate::Result<$crate::models::ExportResult> {
                Self::unimplemented()
            }

            fn dialect(&self) -> &dyn $crate::dialect::Dialect {
                self.dialect
            }

            fn database_type(&self) -> $crate::models::DatabaseType {
                $db_type
            }
        }
    };
}

define_placeholder_extractor!(
    SnowflakeExtractor,
    "Snowflake",
    crate::models::DatabaseType::Snowflake,
    &crate::dialect::SnowflakeDialect
);

define_placeholder_extractor!(
    OracleExtractor,
    "Oracle",
    crate::models::DatabaseType::Oracle,
    &crate::dialect::OracleDialect
);

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::adapters::ExtractorAdapter;
    use crate::models::DatabaseType;

    #[tokio::test]
    async fn test_placeholder_operations_fail_with_clear_message() {
        let adapter = OracleExtractor::new("oracle://user@host:1521/svc")
            .await
            .unwrap();

        let err = adapter.test_connection().await.unwrap_err();
        assert!(err.to_string().contains("Oracle extractor not yet implemented"));

        let err = adapter.list_tables(&[], true).await.unwrap_err();
        assert!(err.to_string().contains("not yet implemented"));
    }

    #[tokio::test]
    async fn test_placeholder_dialect_is_live() {
        let adapter = SnowflakeExtractor::new("snowflake://account/db")
            .await
            .unwrap();

        assert_eq!(adapter.database_type(), DatabaseType::Snowflake);
        assert_eq!(adapter.dialect().quote_identifier("Id"), "\"Id\"");
    }
}
