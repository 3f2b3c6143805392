//! # Martload - Retail sales conformance pipeline
//!
//! Martload takes raw retail exports (customers, inventory, sales, shipping,
//! calendar) through a staged ETL pipeline and loads them into a star-schema
//! warehouse for reporting and forecasting.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  Raw CSVs   │────▶│    Clean    │────▶│  Transform  │────▶│  Warehouse  │
//! │ (auto-enc)  │     │ (impute...) │     │ (star join) │     │  (SQLite)   │
//! └─────────────┘     └─────────────┘     └──────┬──────┘     └─────────────┘
//!                                                │
//!                                           Validate (gate)
//! ```
//!
//! Two error philosophies coexist: the cleaning stage never fails on bad
//! *values* (it imputes, defaults, and clamps), while structural and
//! referential problems are always fatal.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use martload::pipeline::{self, DataPaths};
//! use martload::warehouse::WarehouseConfig;
//!
//! fn main() {
//!     let paths = DataPaths::under("data".as_ref());
//!     let warehouse = WarehouseConfig::new("warehouse.db", "skipped_rows.log");
//!     let report = pipeline::run(&paths, Some(warehouse)).unwrap();
//!     println!("loaded {} fact rows", report.validation.fact_rows);
//! }
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Hierarchical error types
//! - [`table`] - Typed in-memory tables and CSV persistence
//! - [`source`] - Raw source reading with encoding auto-detection
//! - [`clean`] - Imputation, clamping, and normalization
//! - [`transform`] - Star-schema construction
//! - [`validate`] - Standalone integrity validation
//! - [`warehouse`] - SQLite loading and feature queries
//! - [`pipeline`] - End-to-end orchestration

// Core modules
pub mod error;
pub mod table;

// Extraction
pub mod source;

// Cleaning
pub mod clean;

// Transformation
pub mod transform;

// Validation
pub mod validate;

// Warehouse
pub mod warehouse;

// Orchestration
pub mod pipeline;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    LoadError, PipelineError, SourceError, TableError, TransformError, ValidationError,
};

// =============================================================================
// Re-exports - Core types
// =============================================================================

pub use pipeline::{DataPaths, RunReport};
pub use source::SourceKind;
pub use table::{Cell, ColumnType, Table};
pub use warehouse::{LoadReport, WarehouseConfig, WarehouseLoader};
