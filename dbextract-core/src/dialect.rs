//! Per-database SQL dialect strategy objects.
//!
//! A dialect provides identifier quoting, literal quoting, and declared-type
//! classification for one database product. Dialects are pure: no side
//! effects, no connection. Everything above them (query factory, manifest
//! builder, incremental-fetch validation) is generic over this trait.

use crate::models::{Watermark, WatermarkType};

/// Base kind of a declared column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaseType {
    Numeric,
    Timestamp,
    Date,
    String,
    /// Type the dialect cannot classify (binary, spatial, vendor blobs).
    Unsupported,
}

impl BaseType {
    /// Name used in manifest `KBC.datatype.basetype` metadata.
    pub fn as_manifest_str(&self) -> &'static str {
        match self {
            BaseType::Numeric => "NUMERIC",
            BaseType::Timestamp => "TIMESTAMP",
            BaseType::Date => "DATE",
            BaseType::String | BaseType::Unsupported => "STRING",
        }
    }
}

/// SQL syntax, quoting, and type-naming conventions of one database product.
pub trait Dialect: Send + Sync {
    /// Human-readable dialect name for error messages.
    fn name(&self) -> &'static str;

    /// Quotes an identifier, escaping embedded quote characters by doubling
    /// them.
    fn quote_identifier(&self, ident: &str) -> String;

    /// Quotes a string literal, escaping single quotes by doubling them.
    fn quote_literal(&self, value: &str) -> String {
        format!("'{}'", value.replace('\'', "''"))
    }

    /// Classifies a vendor type name (e.g. `NUMBER(10,2)`, `varchar`) into a
    /// base kind.
    fn classify_type(&self, raw_type: &str) -> BaseType;

    /// Base kinds usable as an incremental-fetching column in this dialect.
    fn incremental_base_types(&self) -> &'static [BaseType];

    /// Renders a watermark value for use in a generated WHERE clause.
    ///
    /// The default keeps numeric watermarks unquoted and quotes
    /// timestamp/date watermarks; the MySQL-compatible dialect overrides
    /// this and re-quotes every value from state.
    fn format_watermark(&self, value: &Watermark, kind: WatermarkType) -> String {
        match kind {
            WatermarkType::Numeric => value.to_string(),
            WatermarkType::Timestamp | WatermarkType::Date => {
                self.quote_literal(&value.to_string())
            }
        }
    }
}

/// Strips a parenthesized length suffix and normalizes case, so that
/// `NUMBER(10,2)` classifies the same as `number`.
fn normalize_type(raw: &str) -> String {
    let bare = raw.split('(').next().unwrap_or(raw);
    bare.trim().to_ascii_lowercase()
}

/// Backtick-quoting dialect shared by MySQL and the MySQL-compatible family
/// (MariaDB, Aurora MySQL).
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlDialect;

impl Dialect for MySqlDialect {
    fn name(&self) -> &'static str {
        "MySQL"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        format!("`{}`", ident.replace('`', "``"))
    }

    fn classify_type(&self, raw_type: &str) -> BaseType {
        match normalize_type(raw_type).as_str() {
            "tinyint" | "smallint" | "mediumint" | "int" | "integer" | "bigint" | "decimal"
            | "numeric" | "dec" | "fixed" | "float" | "double" | "double precision" | "real"
            | "bit" | "year" => BaseType::Numeric,
            "datetime" | "timestamp" => BaseType::Timestamp,
            "date" => BaseType::Date,
            "char" | "varchar" | "tinytext" | "text" | "mediumtext" | "longtext" | "enum"
            | "set" | "time" | "json" => BaseType::String,
            _ => BaseType::Unsupported,
        }
    }

    fn incremental_base_types(&self) -> &'static [BaseType] {
        // DATE columns are not accepted here: MySQL DATE ordering loses the
        // intra-day resolution the watermark contract relies on.
        &[BaseType::Numeric, BaseType::Timestamp]
    }

    fn format_watermark(&self, value: &Watermark, _kind: WatermarkType) -> String {
        // State values are re-quoted regardless of kind; the server coerces
        // the literal back to the column type.
        self.quote_literal(&value.to_string())
    }
}

/// Double-quote dialect for Amazon Redshift.
#[derive(Debug, Clone, Copy, Default)]
pub struct RedshiftDialect;

impl Dialect for RedshiftDialect {
    fn name(&self) -> &'static str {
        "Redshift"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }

    fn classify_type(&self, raw_type: &str) -> BaseType {
        match normalize_type(raw_type).as_str() {
            "smallint" | "int2" | "integer" | "int" | "int4" | "bigint" | "int8" | "decimal"
            | "numeric" | "real" | "float4" | "double precision" | "float8" | "float" => {
                BaseType::Numeric
            }
            "timestamp" | "timestamp without time zone" | "timestamptz"
            | "timestamp with time zone" => BaseType::Timestamp,
            "date" => BaseType::Date,
            "character varying" | "varchar" | "character" | "char" | "nchar" | "nvarchar"
            | "bpchar" | "text" | "boolean" | "bool" | "time" | "timetz" | "super" => {
                BaseType::String
            }
            _ => BaseType::Unsupported,
        }
    }

    fn incremental_base_types(&self) -> &'static [BaseType] {
        &[BaseType::Numeric, BaseType::Date, BaseType::Timestamp]
    }
}

/// Double-quote dialect for Snowflake.
#[derive(Debug, Clone, Copy, Default)]
pub struct SnowflakeDialect;

impl Dialect for SnowflakeDialect {
    fn name(&self) -> &'static str {
        "Snowflake"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }

    fn classify_type(&self, raw_type: &str) -> BaseType {
        match normalize_type(raw_type).as_str() {
            "number" | "decimal" | "numeric" | "int" | "integer" | "bigint" | "smallint"
            | "tinyint" | "byteint" | "float" | "float4" | "float8" | "double"
            | "double precision" | "real" => BaseType::Numeric,
            "datetime" | "timestamp" | "timestamp_ntz" | "timestamp_ltz" | "timestamp_tz" => {
                BaseType::Timestamp
            }
            "date" => BaseType::Date,
            "varchar" | "char" | "character" | "string" | "text" | "boolean" | "time"
            | "variant" | "object" | "array" => BaseType::String,
            _ => BaseType::Unsupported,
        }
    }

    fn incremental_base_types(&self) -> &'static [BaseType] {
        &[BaseType::Numeric, BaseType::Date, BaseType::Timestamp]
    }
}

/// Double-quote dialect for Oracle.
#[derive(Debug, Clone, Copy, Default)]
pub struct OracleDialect;

impl Dialect for OracleDialect {
    fn name(&self) -> &'static str {
        "Oracle"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }

    fn classify_type(&self, raw_type: &str) -> BaseType {
        match normalize_type(raw_type).as_str() {
            "number" | "float" | "integer" | "int" | "smallint" | "decimal" | "numeric"
            | "binary_float" | "binary_double" => BaseType::Numeric,
            "timestamp" | "timestamp with time zone" | "timestamp with local time zone" => {
                BaseType::Timestamp
            }
            // Oracle DATE carries a time component but orders like a date.
            "date" => BaseType::Date,
            "varchar2" | "nvarchar2" | "varchar" | "char" | "nchar" | "clob" | "nclob"
            | "long" => BaseType::String,
            _ => BaseType::Unsupported,
        }
    }

    fn incremental_base_types(&self) -> &'static [BaseType] {
        &[BaseType::Numeric, BaseType::Date, BaseType::Timestamp]
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_mysql_identifier_quoting() {
        let d = MySqlDialect;
        assert_eq!(d.quote_identifier("auto_increment_timestamp"), "`auto_increment_timestamp`");
        assert_eq!(d.quote_identifier("_weird-I-d"), "`_weird-I-d`");
        assert_eq!(d.quote_identifier("back`tick"), "`back``tick`");
    }

    #[test]
    fn test_double_quote_identifier_escaping() {
        let d = RedshiftDialect;
        assert_eq!(d.quote_identifier("test"), "\"test\"");
        assert_eq!(d.quote_identifier("weir\"d"), "\"weir\"\"d\"");
        assert_eq!(d.quote_identifier("weir%d i-d"), "\"weir%d i-d\"");
    }

    #[test]
    fn test_quote_identifier_round_trip() {
        // Quoting the same raw identifier twice yields identical output,
        // including identifiers containing the dialect's quote character.
        for raw in ["weir\"d", "weir%d i-d", "plain"] {
            let d = SnowflakeDialect;
            assert_eq!(d.quote_identifier(raw), d.quote_identifier(raw));
        }
    }

    #[test]
    fn test_literal_quoting_doubles_single_quotes() {
        let d = MySqlDialect;
        assert_eq!(d.quote_literal("o'clock"), "'o''clock'");
        assert_eq!(d.quote_literal("4"), "'4'");
    }

    #[test]
    fn test_mysql_type_classification() {
        let d = MySqlDialect;
        assert_eq!(d.classify_type("int"), BaseType::Numeric);
        assert_eq!(d.classify_type("DECIMAL(10,2)"), BaseType::Numeric);
        assert_eq!(d.classify_type("datetime"), BaseType::Timestamp);
        assert_eq!(d.classify_type("TIMESTAMP"), BaseType::Timestamp);
        assert_eq!(d.classify_type("date"), BaseType::Date);
        assert_eq!(d.classify_type("varchar"), BaseType::String);
        assert_eq!(d.classify_type("geometry"), BaseType::Unsupported);
    }

    #[test]
    fn test_redshift_type_classification() {
        let d = RedshiftDialect;
        assert_eq!(d.classify_type("character varying"), BaseType::String);
        assert_eq!(d.classify_type("timestamp without time zone"), BaseType::Timestamp);
        assert_eq!(d.classify_type("int8"), BaseType::Numeric);
        assert_eq!(d.classify_type("date"), BaseType::Date);
    }

    #[test]
    fn test_snowflake_type_classification() {
        let d = SnowflakeDialect;
        assert_eq!(d.classify_type("NUMBER(38,0)"), BaseType::Numeric);
        assert_eq!(d.classify_type("TIMESTAMP_NTZ"), BaseType::Timestamp);
        assert_eq!(d.classify_type("VARIANT"), BaseType::String);
    }

    #[test]
    fn test_oracle_type_classification() {
        let d = OracleDialect;
        assert_eq!(d.classify_type("NUMBER(10,2)"), BaseType::Numeric);
        assert_eq!(d.classify_type("VARCHAR2"), BaseType::String);
        assert_eq!(d.classify_type("DATE"), BaseType::Date);
        assert_eq!(d.classify_type("BLOB"), BaseType::Unsupported);
    }

    #[test]
    fn test_mysql_watermark_is_always_requoted() {
        let d = MySqlDialect;
        assert_eq!(
            d.format_watermark(&Watermark::Int(4), WatermarkType::Numeric),
            "'4'"
        );
        assert_eq!(
            d.format_watermark(
                &Watermark::Text("2024-01-01 00:00:00".to_string()),
                WatermarkType::Timestamp
            ),
            "'2024-01-01 00:00:00'"
        );
    }

    #[test]
    fn test_redshift_numeric_watermark_unquoted() {
        let d = RedshiftDialect;
        assert_eq!(
            d.format_watermark(&Watermark::Int(42), WatermarkType::Numeric),
            "42"
        );
        assert_eq!(
            d.format_watermark(
                &Watermark::Text("2024-01-01".to_string()),
                WatermarkType::Date
            ),
            "'2024-01-01'"
        );
    }

    #[test]
    fn test_snowflake_watermark_quoting_matches_redshift_policy() {
        let d = SnowflakeDialect;
        assert_eq!(
            d.format_watermark(&Watermark::Float(4.5), WatermarkType::Numeric),
            "4.5"
        );
        assert_eq!(
            d.format_watermark(
                &Watermark::Text("2024-06-01 12:00:00".to_string()),
                WatermarkType::Timestamp
            ),
            "'2024-06-01 12:00:00'"
        );
    }

    #[test]
    fn test_incremental_base_types_per_dialect() {
        assert!(!MySqlDialect.incremental_base_types().contains(&BaseType::Date));
        assert!(RedshiftDialect.incremental_base_types().contains(&BaseType::Date));
        assert!(SnowflakeDialect.incremental_base_types().contains(&BaseType::Date));
    }

    #[test]
    fn test_manifest_base_type_names() {
        assert_eq!(BaseType::Numeric.as_manifest_str(), "NUMERIC");
        assert_eq!(BaseType::Timestamp.as_manifest_str(), "TIMESTAMP");
        assert_eq!(BaseType::Date.as_manifest_str(), "DATE");
        assert_eq!(BaseType::String.as_manifest_str(), "STRING");
        assert_eq!(BaseType::Unsupported.as_manifest_str(), "STRING");
    }
}
