//! Query generation for exports, including the incremental-fetching state
//! machine.
//!
//! An incremental export moves through `Unvalidated -> Validated ->
//! QueryBuilt`: the fetching column is first resolved against the table
//! catalog and classified by the dialect, then the SELECT is assembled with
//! the watermark clause. Query generation is deterministic: identical
//! `(config, prior state)` inputs produce byte-identical SQL.

use crate::config::ExportConfig;
use crate::dialect::{BaseType, Dialect};
use crate::error::{ExtractorError, Result};
use crate::models::{Table, Watermark, WatermarkType};

/// Builds dialect-correct SELECT statements for one export.
pub struct QueryFactory<'a> {
    dialect: &'a dyn Dialect,
}

impl<'a> QueryFactory<'a> {
    pub fn new(dialect: &'a dyn Dialect) -> Self {
        Self { dialect }
    }

    /// Validates the configured incremental-fetching column against the
    /// table catalog and resolves its comparison semantics.
    ///
    /// # Errors
    /// - `Configuration` when the export is query-based; a raw query has no
    ///   schema-bound sortable column.
    /// - `Schema` when the column is absent from the table, naming it.
    /// - `Schema` when the column's base type is not accepted by the
    ///   dialect for incremental fetching, naming the column.
    pub fn validate_incremental_fetching(
        &self,
        config: &ExportConfig,
        table: &Table,
    ) -> Result<WatermarkType> {
        if !config.has_table() {
            return Err(ExtractorError::configuration(
                "Incremental fetching is not supported for custom query",
            ));
        }

        let column_name = config.incremental_fetching_column.as_deref().ok_or_else(|| {
            ExtractorError::configuration(format!(
                "Export '{}' has no incremental fetching column configured",
                config.output_table
            ))
        })?;

        let column = table.column(column_name).ok_or_else(|| {
            ExtractorError::schema(format!(
                "Column [{}] specified in incremental fetching was not found in the table [{}]",
                column_name, table.name
            ))
        })?;

        let base = self.dialect.classify_type(&column.data_type);
        let accepted = self.dialect.incremental_base_types();
        if !accepted.contains(&base) {
            return Err(ExtractorError::schema(format!(
                "Column [{}] specified in incremental fetching is not a {} type column",
                column_name,
                accepted_kinds_phrase(accepted)
            )));
        }

        Ok(match base {
            BaseType::Numeric => WatermarkType::Numeric,
            BaseType::Timestamp => WatermarkType::Timestamp,
            BaseType::Date => WatermarkType::Date,
            // Unreachable: accepted lists only contain the three kinds above.
            BaseType::String | BaseType::Unsupported => WatermarkType::Numeric,
        })
    }

    /// Builds the SELECT statement for the export.
    ///
    /// The watermark comparison is intentionally inclusive (`>=`): a row
    /// exactly equal to the last watermark is re-fetched on the next run,
    /// and de-duplication of the boundary row is delegated to the
    /// downstream storage layer. ORDER BY is appended for every incremental
    /// export so the observed maximum is well-defined and any LIMIT selects
    /// a contiguous lowest-first slice.
    pub fn build_select(
        &self,
        config: &ExportConfig,
        watermark_type: Option<WatermarkType>,
        last_fetched: Option<&Watermark>,
    ) -> String {
        if let Some(query) = &config.query {
            return query.trim().to_string();
        }

        let mut sql = format!(
            "SELECT {} FROM {}",
            self.column_list(config),
            self.qualified_table(config)
        );

        if config.uses_incremental_fetching()
            && let Some(column) = config.incremental_fetching_column.as_deref()
        {
            if let (Some(kind), Some(watermark)) = (watermark_type, last_fetched) {
                sql.push_str(&format!(
                    " WHERE {} >= {}",
                    self.dialect.quote_identifier(column),
                    self.dialect.format_watermark(watermark, kind)
                ));
            }

            sql.push_str(&format!(
                " ORDER BY {}",
                self.dialect.quote_identifier(column)
            ));

            if let Some(limit) = config.incremental_fetching_limit
                && limit > 0
            {
                sql.push_str(&format!(" LIMIT {}", limit));
            }
        }

        sql
    }

    /// Whether the maximum watermark value can be fetched with a separate
    /// cheap query before the export.
    ///
    /// Unsound when a fetching limit is set: the true max is the max of
    /// exactly the limited row-set, which only streaming (or an ORDER
    /// BY/OFFSET probe) can observe.
    pub fn can_fetch_max_separately(&self, config: &ExportConfig) -> bool {
        config.has_table()
            && config.uses_incremental_fetching()
            && config.incremental_fetching_limit.unwrap_or(0) == 0
    }

    /// Builds the cheap `SELECT MAX(col)` probe issued before a full
    /// incremental export.
    pub fn build_max_value_query(
        &self,
        config: &ExportConfig,
        watermark_type: WatermarkType,
        last_fetched: Option<&Watermark>,
    ) -> Result<String> {
        if !self.can_fetch_max_separately(config) {
            return Err(ExtractorError::configuration(format!(
                "Export '{}' cannot fetch the watermark maximum separately",
                config.output_table
            )));
        }

        // can_fetch_max_separately established the column is configured.
        let column = config
            .incremental_fetching_column
            .as_deref()
            .unwrap_or_default();

        let mut sql = format!(
            "SELECT MAX({}) FROM {}",
            self.dialect.quote_identifier(column),
            self.qualified_table(config)
        );

        if let Some(watermark) = last_fetched {
            sql.push_str(&format!(
                " WHERE {} >= {}",
                self.dialect.quote_identifier(column),
                self.dialect.format_watermark(watermark, watermark_type)
            ));
        }

        Ok(sql)
    }

    fn column_list(&self, config: &ExportConfig) -> String {
        if config.columns.is_empty() {
            "*".to_string()
        } else {
            config
                .columns
                .iter()
                .map(|c| self.dialect.quote_identifier(c))
                .collect::<Vec<_>>()
                .join(", ")
        }
    }

    fn qualified_table(&self, config: &ExportConfig) -> String {
        match &config.table {
            Some(table) => match &table.schema {
                Some(schema) => format!(
                    "{}.{}",
                    self.dialect.quote_identifier(schema),
                    self.dialect.quote_identifier(&table.name)
                ),
                None => self.dialect.quote_identifier(&table.name),
            },
            None => String::new(),
        }
    }
}

fn accepted_kinds_phrase(accepted: &[BaseType]) -> String {
    let mut parts: Vec<&str> = Vec::new();
    if accepted.contains(&BaseType::Numeric) {
        parts.push("numeric");
    }
    if accepted.contains(&BaseType::Date) {
        parts.push("date");
    }
    if accepted.contains(&BaseType::Timestamp) {
        parts.push("timestamp");
    }
    match parts.len() {
        0 | 1 => parts.join(""),
        2 => parts.join(" or "),
        _ => format!(
            "{} or {}",
            parts[..parts.len() - 1].join(", "),
            parts[parts.len() - 1]
        ),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::dialect::{MySqlDialect, RedshiftDialect};
    use crate::models::{Column, TableType, sanitize_name};

    fn export(json: serde_json::Value) -> ExportConfig {
        serde_json::from_value(json).unwrap()
    }

    fn column(name: &str, data_type: &str, ordinal: u32) -> Column {
        Column {
            name: name.to_string(),
            sanitized_name: sanitize_name(name),
            ordinal_position: ordinal,
            data_type: data_type.to_string(),
            nullable: false,
            length: None,
            default: None,
            primary_key: false,
            unique_key: false,
            auto_increment: None,
            foreign_key: None,
        }
    }

    fn catalog_table(name: &str, columns: Vec<Column>) -> Table {
        Table {
            name: name.to_string(),
            schema: Some("test".to_string()),
            catalog: None,
            table_type: TableType::BaseTable,
            row_count: Some(100),
            columns,
        }
    }

    #[test]
    fn test_simple_table_query_double_quote_dialect() {
        let factory = QueryFactory::new(&RedshiftDialect);
        let cfg = export(serde_json::json!({
            "outputTable": "out",
            "table": {"schema": "testSchema", "name": "test"}
        }));
        assert_eq!(
            factory.build_select(&cfg, None, None),
            "SELECT * FROM \"testSchema\".\"test\""
        );
    }

    #[test]
    fn test_incremental_with_prior_state_backtick_dialect() {
        let factory = QueryFactory::new(&MySqlDialect);
        let cfg = export(serde_json::json!({
            "outputTable": "out",
            "table": {"schema": "test", "name": "auto_increment_timestamp"},
            "incrementalFetchingColumn": "_weird-I-d",
            "incrementalFetchingLimit": 10
        }));
        let sql = factory.build_select(
            &cfg,
            Some(WatermarkType::Numeric),
            Some(&Watermark::Int(4)),
        );
        assert_eq!(
            sql,
            "SELECT * FROM `test`.`auto_increment_timestamp` \
             WHERE `_weird-I-d` >= '4' \
             ORDER BY `_weird-I-d` LIMIT 10"
        );
    }

    #[test]
    fn test_query_generation_is_deterministic() {
        let factory = QueryFactory::new(&MySqlDialect);
        let cfg = export(serde_json::json!({
            "outputTable": "out",
            "table": {"schema": "test", "name": "t"},
            "columns": ["b", "a"],
            "incrementalFetchingColumn": "a",
            "incrementalFetchingLimit": 7
        }));
        let w = Watermark::Text("2024-01-01 00:00:00".to_string());
        let first = factory.build_select(&cfg, Some(WatermarkType::Timestamp), Some(&w));
        let second = factory.build_select(&cfg, Some(WatermarkType::Timestamp), Some(&w));
        assert_eq!(first, second);
    }

    #[test]
    fn test_column_list_is_explicit_and_order_preserving() {
        let factory = QueryFactory::new(&RedshiftDialect);
        let cfg = export(serde_json::json!({
            "outputTable": "out",
            "table": {"schema": "s", "name": "t"},
            "columns": ["z", "a", "m"]
        }));
        assert_eq!(
            factory.build_select(&cfg, None, None),
            "SELECT \"z\", \"a\", \"m\" FROM \"s\".\"t\""
        );
    }

    #[test]
    fn test_watermark_comparison_is_inclusive() {
        let factory = QueryFactory::new(&MySqlDialect);
        let cfg = export(serde_json::json!({
            "outputTable": "out",
            "table": {"schema": "s", "name": "t"},
            "incrementalFetchingColumn": "id"
        }));
        let sql = factory.build_select(
            &cfg,
            Some(WatermarkType::Numeric),
            Some(&Watermark::Int(10)),
        );
        assert!(sql.contains(">="), "boundary must be inclusive: {}", sql);
        assert!(!sql.contains("> '10'"));
    }

    #[test]
    fn test_no_watermark_clause_on_first_run() {
        let factory = QueryFactory::new(&MySqlDialect);
        let cfg = export(serde_json::json!({
            "outputTable": "out",
            "table": {"schema": "s", "name": "t"},
            "incrementalFetchingColumn": "id"
        }));
        let sql = factory.build_select(&cfg, Some(WatermarkType::Numeric), None);
        assert_eq!(sql, "SELECT * FROM `s`.`t` ORDER BY `id`");
    }

    #[test]
    fn test_zero_limit_emits_no_limit_clause() {
        let factory = QueryFactory::new(&MySqlDialect);
        let cfg = export(serde_json::json!({
            "outputTable": "out",
            "table": {"schema": "s", "name": "t"},
            "incrementalFetchingColumn": "id",
            "incrementalFetchingLimit": 0
        }));
        let sql = factory.build_select(&cfg, Some(WatermarkType::Numeric), None);
        assert!(!sql.contains("LIMIT"));
    }

    #[test]
    fn test_raw_query_passes_through() {
        let factory = QueryFactory::new(&MySqlDialect);
        let cfg = export(serde_json::json!({
            "outputTable": "out",
            "query": "  SELECT id, name FROM t WHERE id > 5  "
        }));
        assert_eq!(
            factory.build_select(&cfg, None, None),
            "SELECT id, name FROM t WHERE id > 5"
        );
    }

    #[test]
    fn test_validate_rejects_query_export() {
        let factory = QueryFactory::new(&MySqlDialect);
        let cfg = export(serde_json::json!({
            "outputTable": "out",
            "query": "SELECT 1"
        }));
        let table = catalog_table("t", vec![]);
        let err = factory
            .validate_incremental_fetching(&cfg, &table)
            .unwrap_err();
        assert!(
            err.to_string()
                .contains("not supported for custom query")
        );
    }

    #[test]
    fn test_validate_missing_column() {
        let factory = QueryFactory::new(&MySqlDialect);
        let cfg = export(serde_json::json!({
            "outputTable": "out",
            "table": {"schema": "test", "name": "t"},
            "incrementalFetchingColumn": "missing"
        }));
        let table = catalog_table("t", vec![column("id", "int", 1)]);
        let err = factory
            .validate_incremental_fetching(&cfg, &table)
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("Column [missing]"));
        assert!(msg.contains("was not found in the table"));
    }

    #[test]
    fn test_validate_rejects_string_column() {
        let factory = QueryFactory::new(&MySqlDialect);
        let cfg = export(serde_json::json!({
            "outputTable": "out",
            "table": {"schema": "test", "name": "t"},
            "incrementalFetchingColumn": "name"
        }));
        let table = catalog_table("t", vec![column("name", "varchar", 1)]);
        let err = factory
            .validate_incremental_fetching(&cfg, &table)
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("Column [name]"));
        assert!(msg.contains("is not a numeric or timestamp type column"));
    }

    #[test]
    fn test_validate_error_phrase_includes_date_for_redshift() {
        let factory = QueryFactory::new(&RedshiftDialect);
        let cfg = export(serde_json::json!({
            "outputTable": "out",
            "table": {"schema": "test", "name": "t"},
            "incrementalFetchingColumn": "payload"
        }));
        let table = catalog_table("t", vec![column("payload", "super", 1)]);
        let err = factory
            .validate_incremental_fetching(&cfg, &table)
            .unwrap_err();
        assert!(
            err.to_string()
                .contains("is not a numeric, date or timestamp type column")
        );
    }

    #[test]
    fn test_validate_resolves_watermark_types() {
        let factory = QueryFactory::new(&MySqlDialect);
        let table = catalog_table(
            "t",
            vec![column("id", "bigint", 1), column("seen_at", "datetime", 2)],
        );

        let numeric_cfg = export(serde_json::json!({
            "outputTable": "out",
            "table": {"schema": "test", "name": "t"},
            "incrementalFetchingColumn": "id"
        }));
        assert_eq!(
            factory
                .validate_incremental_fetching(&numeric_cfg, &table)
                .unwrap(),
            WatermarkType::Numeric
        );

        let ts_cfg = export(serde_json::json!({
            "outputTable": "out",
            "table": {"schema": "test", "name": "t"},
            "incrementalFetchingColumn": "seen_at"
        }));
        assert_eq!(
            factory
                .validate_incremental_fetching(&ts_cfg, &table)
                .unwrap(),
            WatermarkType::Timestamp
        );
    }

    #[test]
    fn test_max_query_only_without_limit() {
        let factory = QueryFactory::new(&MySqlDialect);
        let limited = export(serde_json::json!({
            "outputTable": "out",
            "table": {"schema": "s", "name": "t"},
            "incrementalFetchingColumn": "id",
            "incrementalFetchingLimit": 10
        }));
        assert!(!factory.can_fetch_max_separately(&limited));
        assert!(
            factory
                .build_max_value_query(&limited, WatermarkType::Numeric, None)
                .is_err()
        );

        let unlimited = export(serde_json::json!({
            "outputTable": "out",
            "table": {"schema": "s", "name": "t"},
            "incrementalFetchingColumn": "id"
        }));
        assert!(factory.can_fetch_max_separately(&unlimited));
        assert_eq!(
            factory
                .build_max_value_query(&unlimited, WatermarkType::Numeric, Some(&Watermark::Int(4)))
                .unwrap(),
            "SELECT MAX(`id`) FROM `s`.`t` WHERE `id` >= '4'"
        );
    }

    #[test]
    fn test_identifier_quote_characters_survive_in_sql() {
        let factory = QueryFactory::new(&RedshiftDialect);
        let cfg = export(serde_json::json!({
            "outputTable": "out",
            "table": {"schema": "s", "name": "t"},
            "incrementalFetchingColumn": "weir\"d"
        }));
        let sql = factory.build_select(&cfg, Some(WatermarkType::Numeric), None);
        assert!(sql.contains("\"weir\"\"d\""));
    }
}
