//! MySQL table and column catalog collection.
//!
//! Catalog access is batched: one query enumerates tables, one query fetches
//! the columns of every listed table at once. Per-table round trips do not
//! scale to schemas with thousands of tables.

use std::collections::HashMap;

use sqlx::{Column as SqlxColumn, Executor, MySqlPool, Row, TypeInfo};

use crate::Result;
use crate::adapters::helpers::map_driver_error;
use crate::error::ExtractorError;
use crate::models::{
    Column, ForeignKeyRef, Table, TableRef, TableType, sanitize_column_names, sanitize_name,
};

const SYSTEM_SCHEMAS: &[&str] = &["information_schema", "performance_schema", "mysql", "sys"];

/// Lists tables visible to the connected user.
///
/// A failing column query degrades the listing to tables without columns
/// instead of failing it; the caller still gets a usable table list when the
/// user lacks column-introspection privilege.
pub async fn list_tables(
    pool: &MySqlPool,
    whitelist: &[TableRef],
    load_columns: bool,
) -> Result<Vec<Table>> {
    let placeholders = SYSTEM_SCHEMAS
        .iter()
        .map(|_| "?")
        .collect::<Vec<_>>()
        .join(", ");
    // Cast to CHAR to avoid VARBINARY type issues in MySQL 8.0+
    let tables_query = format!(
        r#"
        SELECT
            CAST(TABLE_SCHEMA AS CHAR) as TABLE_SCHEMA,
            CAST(TABLE_NAME AS CHAR) as TABLE_NAME,
            CAST(TABLE_TYPE AS CHAR) as TABLE_TYPE,
            TABLE_ROWS,
            AUTO_INCREMENT
        FROM INFORMATION_SCHEMA.TABLES
        WHERE TABLE_SCHEMA NOT IN ({})
        AND TABLE_TYPE IN ('BASE TABLE', 'VIEW')
        ORDER BY TABLE_SCHEMA, TABLE_NAME
        "#,
        placeholders
    );

    let mut query = sqlx::query(&tables_query);
    for schema in SYSTEM_SCHEMAS {
        query = query.bind(*schema);
    }

    let rows = query
        .fetch_all(pool)
        .await
        .map_err(|e| map_driver_error("Failed to enumerate tables", &e))?;

    let mut tables = Vec::new();
    let mut auto_increments: HashMap<(String, String), u64> = HashMap::new();

    for row in &rows {
        let schema: String = row
            .try_get("TABLE_SCHEMA")
            .map_err(|e| map_driver_error("Failed to parse table schema", &e))?;
        let name: String = row
            .try_get("TABLE_NAME")
            .map_err(|e| map_driver_error("Failed to parse table name", &e))?;
        let table_type: String = row.try_get("TABLE_TYPE").unwrap_or_default();
        // TABLE_ROWS and AUTO_INCREMENT are BIGINT UNSIGNED.
        let estimated_rows: Option<u64> = row.try_get("TABLE_ROWS").ok().flatten();
        let auto_increment: Option<u64> = row.try_get("AUTO_INCREMENT").ok().flatten();

        if !whitelist.is_empty() && !whitelist.iter().any(|w| w.matches(Some(&schema), &name)) {
            continue;
        }

        if let Some(next) = auto_increment {
            auto_increments.insert((schema.clone(), name.clone()), next);
        }

        tables.push(Table {
            name,
            schema: Some(schema),
            catalog: None,
            table_type: if table_type == "VIEW" {
                TableType::View
            } else {
                TableType::BaseTable
            },
            row_count: estimated_rows,
            columns: Vec::new(),
        });
    }

    if load_columns && !tables.is_empty() {
        match load_all_columns(pool, &tables, &auto_increments).await {
            Ok(mut by_table) => {
                for table in &mut tables {
                    let key = (
                        table.schema.clone().unwrap_or_default(),
                        table.name.clone(),
                    );
                    table.columns = by_table.remove(&key).unwrap_or_default();
                }
            }
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    "Column introspection failed, returning tables without columns"
                );
            }
        }
    }

    Ok(tables)
}

/// Fetches one table's full catalog entry.
///
/// # Errors
/// Returns a schema error naming the table when it is not visible.
pub async fn get_table(pool: &MySqlPool, table: &TableRef) -> Result<Table> {
    let whitelist = [table.clone()];
    let mut tables = list_tables(pool, &whitelist, true).await?;

    if tables.is_empty() {
        return Err(ExtractorError::schema(format!(
            "Table [{}] was not found in the database",
            table
        )));
    }
    Ok(tables.remove(0))
}

/// Introspects the result-set shape of an ad-hoc query without running it to
/// completion. Used for manifest column naming of query-based exports.
pub async fn get_columns_info(pool: &MySqlPool, query: &str) -> Result<Vec<Column>> {
    let describe = pool
        .describe(query)
        .await
        .map_err(|e| map_driver_error("Failed to introspect query result shape", &e))?;

    let names: Vec<(String, u32)> = describe
        .columns()
        .iter()
        .enumerate()
        .map(|(i, c)| (c.name().to_string(), i as u32 + 1))
        .collect();
    let sanitized = sanitize_column_names(&names);

    Ok(describe
        .columns()
        .iter()
        .zip(sanitized)
        .enumerate()
        .map(|(i, (c, sanitized_name))| Column {
            name: c.name().to_string(),
            sanitized_name,
            ordinal_position: i as u32 + 1,
            data_type: c.type_info().name().to_lowercase(),
            nullable: describe.nullable(i).unwrap_or(true),
            length: None,
            default: None,
            primary_key: false,
            unique_key: false,
            auto_increment: None,
            foreign_key: None,
        })
        .collect())
}

/// One batched query for the columns of every listed table.
///
/// The LEFT JOIN to KEY_COLUMN_USAGE produces one row per column per
/// referencing constraint; rows are folded so each column appears once, with
/// foreign-key information appended by later rows.
async fn load_all_columns(
    pool: &MySqlPool,
    tables: &[Table],
    auto_increments: &HashMap<(String, String), u64>,
) -> Result<HashMap<(String, String), Vec<Column>>> {
    let pairs = tables
        .iter()
        .map(|_| "(?, ?)")
        .collect::<Vec<_>>()
        .join(", ");
    // Cast to CHAR to avoid VARBINARY type issues in MySQL 8.0+
    let columns_query = format!(
        r#"
        SELECT
            CAST(c.TABLE_SCHEMA AS CHAR) as TABLE_SCHEMA,
            CAST(c.TABLE_NAME AS CHAR) as TABLE_NAME,
            CAST(c.COLUMN_NAME AS CHAR) as COLUMN_NAME,
            CAST(c.DATA_TYPE AS CHAR) as DATA_TYPE,
            c.CHARACTER_MAXIMUM_LENGTH,
            c.NUMERIC_PRECISION,
            c.NUMERIC_SCALE,
            CAST(c.IS_NULLABLE AS CHAR) as IS_NULLABLE,
            CAST(c.COLUMN_DEFAULT AS CHAR) as COLUMN_DEFAULT,
            c.ORDINAL_POSITION,
            CAST(c.EXTRA AS CHAR) as EXTRA,
            CAST(c.COLUMN_KEY AS CHAR) as COLUMN_KEY,
            CAST(k.CONSTRAINT_NAME AS CHAR) as FK_NAME,
            CAST(k.REFERENCED_TABLE_SCHEMA AS CHAR) as FK_REF_SCHEMA,
            CAST(k.REFERENCED_TABLE_NAME AS CHAR) as FK_REF_TABLE,
            CAST(k.REFERENCED_COLUMN_NAME AS CHAR) as FK_REF_COLUMN
        FROM INFORMATION_SCHEMA.COLUMNS c
        LEFT JOIN INFORMATION_SCHEMA.KEY_COLUMN_USAGE k
            ON k.TABLE_SCHEMA = c.TABLE_SCHEMA
            AND k.TABLE_NAME = c.TABLE_NAME
            AND k.COLUMN_NAME = c.COLUMN_NAME
            AND k.REFERENCED_TABLE_NAME IS NOT NULL
        WHERE (c.TABLE_SCHEMA, c.TABLE_NAME) IN ({})
        ORDER BY c.TABLE_SCHEMA, c.TABLE_NAME, c.ORDINAL_POSITION
        "#,
        pairs
    );

    let mut query = sqlx::query(&columns_query);
    for table in tables {
        query = query
            .bind(table.schema.clone().unwrap_or_default())
            .bind(table.name.clone());
    }

    let rows = query
        .fetch_all(pool)
        .await
        .map_err(|e| map_driver_error("Failed to collect column metadata", &e))?;

    let mut by_table: HashMap<(String, String), Vec<Column>> = HashMap::new();
    let mut seen: HashMap<(String, String, String), (String, String, usize)> = HashMap::new();

    for row in &rows {
        let schema: String = row.try_get("TABLE_SCHEMA").unwrap_or_default();
        let table: String = row.try_get("TABLE_NAME").unwrap_or_default();
        let name: String = row
            .try_get("COLUMN_NAME")
            .map_err(|e| map_driver_error("Failed to parse column name", &e))?;

        let foreign_key = row
            .try_get::<Option<String>, _>("FK_NAME")
            .ok()
            .flatten()
            .map(|constraint_name| ForeignKeyRef {
                constraint_name,
                schema: row.try_get("FK_REF_SCHEMA").ok().flatten(),
                table: row
                    .try_get::<Option<String>, _>("FK_REF_TABLE")
                    .ok()
                    .flatten()
                    .unwrap_or_default(),
                column: row
                    .try_get::<Option<String>, _>("FK_REF_COLUMN")
                    .ok()
                    .flatten()
                    .unwrap_or_default(),
            });

        let key = (schema.clone(), table.clone(), name.clone());
        if let Some((s, t, idx)) = seen.get(&key) {
            // Constraint fan-out row; only enrich the existing column.
            if let Some(columns) = by_table.get_mut(&(s.clone(), t.clone()))
                && let Some(column) = columns.get_mut(*idx)
                && column.foreign_key.is_none()
            {
                column.foreign_key = foreign_key;
            }
            continue;
        }

        let data_type: String = row.try_get("DATA_TYPE").unwrap_or_default();
        let is_nullable: String = row.try_get("IS_NULLABLE").unwrap_or_default();
        let ordinal_position: u32 = row
            .try_get::<u64, _>("ORDINAL_POSITION")
            .ok()
            .and_then(|v| u32::try_from(v).ok())
            .unwrap_or(0);
        let extra: String = row.try_get("EXTRA").unwrap_or_default();
        let column_key: String = row.try_get("COLUMN_KEY").unwrap_or_default();

        let auto_increment = if extra.to_lowercase().contains("auto_increment") {
            auto_increments.get(&(schema.clone(), table.clone())).copied()
        } else {
            None
        };

        let column = Column {
            sanitized_name: sanitize_name(&name),
            name,
            ordinal_position,
            data_type,
            nullable: is_nullable.eq_ignore_ascii_case("YES"),
            length: column_length(row),
            default: row.try_get("COLUMN_DEFAULT").ok().flatten(),
            primary_key: column_key == "PRI",
            unique_key: column_key == "UNI",
            auto_increment,
            foreign_key,
        };

        let columns = by_table.entry((schema.clone(), table.clone())).or_default();
        seen.insert(key, (schema, table, columns.len()));
        columns.push(column);
    }

    Ok(by_table)
}

/// Length rendering: character maximum for text types, `precision,scale`
/// for numerics with a scale, plain precision otherwise.
fn column_length(row: &sqlx::mysql::MySqlRow) -> Option<String> {
    // These columns are BIGINT UNSIGNED in information_schema.
    let char_max: Option<u64> = row.try_get("CHARACTER_MAXIMUM_LENGTH").ok().flatten();
    if let Some(max) = char_max {
        return Some(max.to_string());
    }

    let precision: Option<u64> = row.try_get("NUMERIC_PRECISION").ok().flatten();
    let scale: Option<u64> = row.try_get("NUMERIC_SCALE").ok().flatten();
    match (precision, scale) {
        (Some(p), Some(s)) if s > 0 => Some(format!("{},{}", p, s)),
        (Some(p), _) => Some(p.to_string()),
        _ => None,
    }
}
