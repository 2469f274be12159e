//! Redshift table and column catalog collection.
//!
//! Catalog access is batched with `= ANY(...)` array binds: one query for
//! the table list, one for every listed table's columns, one for key
//! constraints. Row counts come from `pg_class.reltuples`, the planner's
//! estimate, because `COUNT(*)` per table is prohibitive on large clusters.

use std::collections::HashMap;

use sqlx::{Column as SqlxColumn, Executor, PgPool, Row, TypeInfo};

use crate::Result;
use crate::adapters::helpers::map_driver_error;
use crate::error::ExtractorError;
use crate::models::{
    Column, ForeignKeyRef, Table, TableRef, TableType, sanitize_column_names, sanitize_name,
};

const SYSTEM_SCHEMAS: &[&str] = &["pg_catalog", "information_schema", "pg_internal"];

/// Lists tables visible to the connected user.
///
/// Column-introspection failures degrade the listing to tables without
/// columns instead of failing it.
pub async fn list_tables(
    pool: &PgPool,
    whitelist: &[TableRef],
    load_columns: bool,
) -> Result<Vec<Table>> {
    let tables_query = r#"
        SELECT
            t.table_schema,
            t.table_name,
            t.table_type,
            c.reltuples::bigint AS row_estimate
        FROM information_schema.tables t
        LEFT JOIN pg_catalog.pg_namespace n ON n.nspname = t.table_schema
        LEFT JOIN pg_catalog.pg_class c ON c.relname = t.table_name AND c.relnamespace = n.oid
        WHERE t.table_schema <> ALL($1)
        AND t.table_type IN ('BASE TABLE', 'VIEW')
        ORDER BY t.table_schema, t.table_name
    "#;

    let system: Vec<String> = SYSTEM_SCHEMAS.iter().map(|s| s.to_string()).collect();
    let rows = sqlx::query(tables_query)
        .bind(&system)
        .fetch_all(pool)
        .await
        .map_err(|e| map_driver_error("Failed to enumerate tables", &e))?;

    let mut tables = Vec::new();
    for row in &rows {
        let schema: String = row
            .try_get("table_schema")
            .map_err(|e| map_driver_error("Failed to parse table schema", &e))?;
        let name: String = row
            .try_get("table_name")
            .map_err(|e| map_driver_error("Failed to parse table name", &e))?;
        let table_type: String = row.try_get("table_type").unwrap_or_default();
        let row_estimate: Option<i64> = row.try_get("row_estimate").ok().flatten();

        if !whitelist.is_empty() && !whitelist.iter().any(|w| w.matches(Some(&schema), &name)) {
            continue;
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
            row_count: row_estimate.and_then(|r| u64::try_from(r).ok()),
            columns: Vec::new(),
        });
    }

    if load_columns && !tables.is_empty() {
        match load_all_columns(pool, &tables).await {
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
pub async fn get_table(pool: &PgPool, table: &TableRef) -> Result<Table> {
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

/// Introspects the result-set shape of an ad-hoc query.
pub async fn get_columns_info(pool: &PgPool, query: &str) -> Result<Vec<Column>> {
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

async fn load_all_columns(
    pool: &PgPool,
    tables: &[Table],
) -> Result<HashMap<(String, String), Vec<Column>>> {
    let schemas: Vec<String> = tables
        .iter()
        .map(|t| t.schema.clone().unwrap_or_default())
        .collect();
    let names: Vec<String> = tables.iter().map(|t| t.name.clone()).collect();

    let columns_query = r#"
        SELECT
            table_schema,
            table_name,
            column_name,
            data_type,
            character_maximum_length,
            numeric_precision,
            numeric_scale,
            is_nullable,
            column_default,
            ordinal_position
        FROM information_schema.columns
        WHERE table_schema = ANY($1)
        AND table_name = ANY($2)
        ORDER BY table_schema, table_name, ordinal_position
    "#;

    let rows = sqlx::query(columns_query)
        .bind(&schemas)
        .bind(&names)
        .fetch_all(pool)
        .await
        .map_err(|e| map_driver_error("Failed to collect column metadata", &e))?;

    // ANY($1)/ANY($2) over-matches (schema, name) pairs that were never
    // listed; the keyed lookup below drops those.
    let listed: std::collections::HashSet<(String, String)> = tables
        .iter()
        .map(|t| (t.schema.clone().unwrap_or_default(), t.name.clone()))
        .collect();

    let mut by_table: HashMap<(String, String), Vec<Column>> = HashMap::new();
    for row in &rows {
        let schema: String = row.try_get("table_schema").unwrap_or_default();
        let table: String = row.try_get("table_name").unwrap_or_default();
        let key = (schema, table);
        if !listed.contains(&key) {
            continue;
        }

        let name: String = row
            .try_get("column_name")
            .map_err(|e| map_driver_error("Failed to parse column name", &e))?;
        let is_nullable: String = row.try_get("is_nullable").unwrap_or_default();
        let ordinal_position: u32 = row
            .try_get::<i32, _>("ordinal_position")
            .ok()
            .and_then(|v| u32::try_from(v).ok())
            .unwrap_or(0);

        by_table.entry(key).or_default().push(Column {
            sanitized_name: sanitize_name(&name),
            name,
            ordinal_position,
            data_type: row.try_get("data_type").unwrap_or_default(),
            nullable: is_nullable.eq_ignore_ascii_case("YES"),
            length: column_length(row),
            default: row.try_get("column_default").ok().flatten(),
            primary_key: false,
            unique_key: false,
            auto_increment: None,
            foreign_key: None,
        });
    }

    apply_key_constraints(pool, &schemas, &names, &mut by_table).await?;

    Ok(by_table)
}

/// Folds primary-key, unique, and foreign-key constraints into the column
/// entries. One row per constrained column; a column can appear under
/// several constraints, so rows only ever set flags or append FK info.
async fn apply_key_constraints(
    pool: &PgPool,
    schemas: &[String],
    names: &[String],
    by_table: &mut HashMap<(String, String), Vec<Column>>,
) -> Result<()> {
    let constraints_query = r#"
        SELECT
            tc.table_schema,
            tc.table_name,
            kcu.column_name,
            tc.constraint_type,
            tc.constraint_name,
            ccu.table_schema AS ref_schema,
            ccu.table_name AS ref_table,
            ccu.column_name AS ref_column
        FROM information_schema.table_constraints tc
        JOIN information_schema.key_column_usage kcu
            ON kcu.constraint_name = tc.constraint_name
            AND kcu.constraint_schema = tc.constraint_schema
        LEFT JOIN information_schema.referential_constraints rc
            ON rc.constraint_name = tc.constraint_name
            AND rc.constraint_schema = tc.constraint_schema
        LEFT JOIN information_schema.constraint_column_usage ccu
            ON ccu.constraint_name = rc.unique_constraint_name
            AND ccu.constraint_schema = rc.unique_constraint_schema
        WHERE tc.table_schema = ANY($1)
        AND tc.table_name = ANY($2)
        AND tc.constraint_type IN ('PRIMARY KEY', 'UNIQUE', 'FOREIGN KEY')
    "#;

    let rows = sqlx::query(constraints_query)
        .bind(schemas)
        .bind(names)
        .fetch_all(pool)
        .await
        .map_err(|e| map_driver_error("Failed to collect key constraints", &e))?;

    for row in &rows {
        let schema: String = row.try_get("table_schema").unwrap_or_default();
        let table: String = row.try_get("table_name").unwrap_or_default();
        let column_name: String = row.try_get("column_name").unwrap_or_default();
        let constraint_type: String = row.try_get("constraint_type").unwrap_or_default();

        let Some(columns) = by_table.get_mut(&(schema, table)) else {
            continue;
        };
        let Some(column) = columns.iter_mut().find(|c| c.name == column_name) else {
            continue;
        };

        match constraint_type.as_str() {
            "PRIMARY KEY" => column.primary_key = true,
            "UNIQUE" => column.unique_key = true,
            "FOREIGN KEY" => {
                if column.foreign_key.is_none() {
                    column.foreign_key = Some(ForeignKeyRef {
                        constraint_name: row.try_get("constraint_name").unwrap_or_default(),
                        schema: row.try_get("ref_schema").ok().flatten(),
                        table: row
                            .try_get::<Option<String>, _>("ref_table")
                            .ok()
                            .flatten()
                            .unwrap_or_default(),
                        column: row
                            .try_get::<Option<String>, _>("ref_column")
                            .ok()
                            .flatten()
                            .unwrap_or_default(),
                    });
                }
            }
            _ => {}
        }
    }

    Ok(())
}

fn column_length(row: &sqlx::postgres::PgRow) -> Option<String> {
    let char_max: Option<i32> = row.try_get("character_maximum_length").ok().flatten();
    if let Some(max) = char_max {
        return Some(max.to_string());
    }

    let precision: Option<i32> = row.try_get("numeric_precision").ok().flatten();
    let scale: Option<i32> = row.try_get("numeric_scale").ok().flatten();
    match (precision, scale) {
        (Some(p), Some(s)) if s > 0 => Some(format!("{},{}", p, s)),
        (Some(p), _) => Some(p.to_string()),
        _ => None,
    }
}
