//! Error types for the Martload conformance pipeline.
//!
//! This module defines a hierarchy of error types, one per pipeline stage:
//!
//! - [`TableError`] - tabular I/O and typing errors
//! - [`SourceError`] - raw source reading errors
//! - [`TransformError`] - dimensional transformation errors
//! - [`ValidationError`] - integrity validation failures
//! - [`LoadError`] - warehouse loading errors
//! - [`PipelineError`] - top-level orchestration errors
//!
//! Error conversion is automatic via `From` implementations,
//! allowing `?` to work across stage boundaries.
//!
//! Note the split the pipeline deliberately maintains: bad *data* is never
//! an error in the cleaning stage (it is imputed, defaulted, or clamped),
//! while structural and referential problems are always fatal.

use thiserror::Error;

// =============================================================================
// Tabular Errors
// =============================================================================

/// Errors while reading, writing, or typing a table.
#[derive(Debug, Error)]
pub enum TableError {
    /// Failed to read or write a file.
    #[error("Failed to read/write file: {0}")]
    IoError(#[from] std::io::Error),

    /// CSV-level error from the underlying reader/writer.
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    /// The file contained no header row.
    #[error("No headers found in '{0}'")]
    NoHeaders(String),

    /// A column the schema requires is absent.
    #[error("Table '{table}' is missing required column '{column}'")]
    MissingColumn { table: String, column: String },

    /// A persisted cell could not be parsed as its declared type.
    #[error("Table '{table}', column '{column}': value '{value}' is not a valid {expected}")]
    TypeError {
        table: String,
        column: String,
        value: String,
        expected: &'static str,
    },
}

// =============================================================================
// Source Reading Errors
// =============================================================================

/// Errors while extracting raw sources into the staging area.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Failed to read the raw file.
    #[error("Failed to read source file: {0}")]
    IoError(#[from] std::io::Error),

    /// The raw file is empty.
    #[error("Source file '{0}' is empty")]
    EmptyFile(String),

    /// Underlying table error (missing columns, CSV problems).
    #[error(transparent)]
    Table(#[from] TableError),
}

// =============================================================================
// Transformation Errors
// =============================================================================

/// Errors during dimensional transformation.
///
/// A foreign-key violation here is the integrity gate: it aborts the whole
/// transform and no partial output survives.
#[derive(Debug, Error)]
pub enum TransformError {
    /// A cleaned table is missing a column the transform projects.
    #[error(transparent)]
    Table(#[from] TableError),

    /// A fact row references a key absent from its dimension.
    #[error(
        "Foreign key violation: {violations} fact row(s) reference '{column}' values \
         absent from {dimension} (e.g. {example})"
    )]
    ForeignKeyViolation {
        column: String,
        dimension: String,
        violations: usize,
        example: String,
    },
}

// =============================================================================
// Validation Errors
// =============================================================================

/// Integrity validation failures.
///
/// Every variant is fatal: the validator has no recovery path and the
/// pipeline must stop with a hard error, never a warning.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// Underlying table error while re-reading persisted output.
    #[error(transparent)]
    Table(#[from] TableError),

    /// Null values found where none are allowed.
    #[error("{count} null value(s) found in {table}.{column}")]
    NullValues {
        table: String,
        column: String,
        count: usize,
    },

    /// A dimension's natural key is not unique.
    #[error("{count} duplicate key(s) found in {table}.{column}")]
    DuplicateKeys {
        table: String,
        column: String,
        count: usize,
    },

    /// A fact foreign key does not resolve in its dimension.
    #[error("{count} orphan value(s) in SalesFact.{column} not present in {dimension}")]
    OrphanForeignKey {
        column: String,
        dimension: String,
        count: usize,
    },

    /// A fact measure is negative.
    #[error("{count} negative value(s) found in SalesFact.{column}")]
    NegativeMeasure { column: String, count: usize },

    /// A column's declared type does not match its contents.
    #[error("Column {table}.{column} must be {expected}: value '{value}' does not conform")]
    TypeMismatch {
        table: String,
        column: String,
        expected: &'static str,
        value: String,
    },
}

// =============================================================================
// Warehouse Loading Errors
// =============================================================================

/// Errors during warehouse loading.
///
/// Per-row constraint violations are *not* errors here; they are skipped
/// and written to the side log. These variants cover structural failures.
#[derive(Debug, Error)]
pub enum LoadError {
    /// Database-level error (connection, DDL, commit).
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Failed to write the side log of skipped rows.
    #[error("Failed to write skipped-rows log: {0}")]
    IoError(#[from] std::io::Error),

    /// The transformed table's columns do not match the declared mapping.
    #[error("Column mapping mismatch for {table}: expected {expected:?}, found {found:?}")]
    ColumnMapping {
        table: String,
        expected: Vec<String>,
        found: Vec<String>,
    },

    /// Reconnection attempt failed.
    #[error("Lost connection to warehouse '{0}' and reconnect failed")]
    Reconnect(String),

    /// Underlying table error while reading transformed input.
    #[error(transparent)]
    Table(#[from] TableError),
}

// =============================================================================
// Pipeline Errors (top-level)
// =============================================================================

/// Top-level pipeline orchestration errors.
///
/// This is the main error type returned by [`crate::pipeline::run`].
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Source extraction error.
    #[error("Extract error: {0}")]
    Source(#[from] SourceError),

    /// Tabular error.
    #[error("Table error: {0}")]
    Table(#[from] TableError),

    /// Transformation error.
    #[error("Transform error: {0}")]
    Transform(#[from] TransformError),

    /// Validation failure.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Warehouse loading error.
    #[error("Load error: {0}")]
    Load(#[from] LoadError),

    /// Run-report serialization error.
    #[error("Report error: {0}")]
    Report(#[from] serde_json::Error),

    /// I/O error outside any specific stage.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for tabular operations.
pub type TableResult<T> = Result<T, TableError>;

/// Result type for source extraction.
pub type SourceResult<T> = Result<T, SourceError>;

/// Result type for transformation operations.
pub type TransformResult<T> = Result<T, TransformError>;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Result type for warehouse loading.
pub type LoadResult<T> = Result<T, LoadError>;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;
