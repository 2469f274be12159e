//! Core types and logic for the dbextract database-export connectors.
//!
//! This crate provides everything the CLI binary needs: the dialect
//! adapters, metadata providers, query factory, retry layer, and the
//! orchestrator that turns one export configuration plus prior state into
//! CSV files, manifests, and updated state.
//!
//! # Security Guarantees
//! - No credentials stored or logged in any data structures
//! - All database operations are read-only
//! - Connection strings are redacted in every error message
//!
//! # Architecture
//! The core library follows these patterns:
//! - Factory pattern for extractor adapter instantiation
//! - Dialect trait for per-engine SQL rendering
//! - Comprehensive error handling with credential sanitization

pub mod adapters;
pub mod config;
pub mod dialect;
pub mod error;
pub mod logging;
pub mod manifest;
pub mod models;
pub mod query;
pub mod retry;
pub mod runner;

// Re-export commonly used types
pub use adapters::{ExtractorAdapter, TrackedColumn, create_extractor, detect_database_type};
pub use config::{Action, ConnectionSettings, ExportConfig, ExtractorConfig};
pub use dialect::{BaseType, Dialect, MySqlDialect, OracleDialect, RedshiftDialect, SnowflakeDialect};
pub use error::{ExtractorError, Result};
pub use models::{
    Column, DatabaseType, ExportResult, ForeignKeyRef, IncrementalState, Table, TableRef,
    TableType, Watermark, WatermarkType,
};
pub use query::QueryFactory;
pub use retry::{RetryConfig, retry, retry_with_outcome};
pub use runner::{ImportedTable, RunOutput, Runner};
