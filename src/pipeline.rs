//! End-to-end pipeline orchestration.
//!
//! The pipeline is a fixed sequence of stages, each persisting its output
//! before the next stage starts, so every stage can also run standalone
//! against the previous stage's files:
//!
//! ```text
//! raw/ --extract--> staging/ --clean--> processed/ --transform--> transformed/
//!                                                        |
//!                                              validate (gate)
//!                                                        |
//!                                                  load --> warehouse.db
//! ```
//!
//! Validation is a hard gate: the warehouse load only runs after the
//! persisted star schema passes every integrity check.

use log::info;
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::clean::{self, CleanSummary};
use crate::error::PipelineResult;
use crate::source::{self, SourceKind};
use crate::table::Table;
use crate::transform::{self, TransformSummary};
use crate::validate::{self, ValidationReport};
use crate::warehouse::{LoadReport, WarehouseConfig, WarehouseLoader};

// =============================================================================
// Paths
// =============================================================================

/// Directory layout of one pipeline run.
#[derive(Debug, Clone)]
pub struct DataPaths {
    /// Raw upstream exports (input, never written).
    pub raw_dir: PathBuf,
    /// Untouched UTF-8 copies written by the extract stage.
    pub staging_dir: PathBuf,
    /// Cleaned per-source tables.
    pub processed_dir: PathBuf,
    /// Star-schema output of the transform stage.
    pub transformed_dir: PathBuf,
}

impl DataPaths {
    /// Conventional layout under a single data root.
    pub fn under(root: &Path) -> Self {
        Self {
            raw_dir: root.join("raw"),
            staging_dir: root.join("staging"),
            processed_dir: root.join("processed"),
            transformed_dir: root.join("transformed"),
        }
    }
}

/// Aggregated outcome of a full run, serializable as the run report.
#[derive(Debug, Serialize)]
pub struct RunReport {
    pub cleaned: Vec<CleanSummary>,
    pub transform: TransformSummary,
    pub validation: ValidationReport,
    /// Absent when the run was invoked without a warehouse target.
    pub load: Option<LoadReport>,
}

// =============================================================================
// Stages
// =============================================================================

/// Extract every raw source into the staging directory.
pub fn run_extract(paths: &DataPaths) -> PipelineResult<()> {
    let extracted = source::extract_all(&paths.raw_dir, &paths.staging_dir)?;
    info!("extracted {} sources", extracted.len());
    Ok(())
}

/// Clean every staged source and persist the results to the processed
/// directory.
pub fn run_clean(paths: &DataPaths) -> PipelineResult<Vec<CleanSummary>> {
    let mut summaries = Vec::with_capacity(SourceKind::ALL.len());
    for kind in SourceKind::ALL {
        let staged = source::read_staged(kind, &source::staged_path(&paths.staging_dir, kind))?;
        let (cleaned, summary) = clean::clean(kind, staged)?;
        cleaned.write_csv(&source::cleaned_path(&paths.processed_dir, kind))?;
        info!(
            "cleaned {}: {} rows, {} cell(s) imputed",
            summary.table, summary.rows, summary.imputed_cells
        );
        summaries.push(summary);
    }
    Ok(summaries)
}

/// Build the star schema from the cleaned tables and persist it.
pub fn run_transform(paths: &DataPaths) -> PipelineResult<TransformSummary> {
    let read = |kind: SourceKind| -> PipelineResult<Table> {
        Ok(source::read_staged(
            kind,
            &source::cleaned_path(&paths.processed_dir, kind),
        )?)
    };
    let customers = read(SourceKind::Customers)?;
    let products = read(SourceKind::Products)?;
    let sales = read(SourceKind::Sales)?;
    let shipping = read(SourceKind::Shipping)?;
    let time = read(SourceKind::Time)?;

    let (conformed, summary) = transform::transform(&customers, &products, &sales, &shipping, &time)?;
    conformed.write_all(&paths.transformed_dir)?;
    info!(
        "transformed: {} fact rows, {} synthesized date(s)",
        summary.fact_rows, summary.synthesized_dates
    );
    Ok(summary)
}

/// Validate the persisted star schema.
pub fn run_validate(paths: &DataPaths) -> PipelineResult<ValidationReport> {
    Ok(validate::validate_dir(&paths.transformed_dir)?)
}

/// Load the persisted star schema into the warehouse.
pub fn run_load(paths: &DataPaths, config: WarehouseConfig) -> PipelineResult<LoadReport> {
    let mut loader = WarehouseLoader::connect(config)?;
    Ok(loader.load_all(&paths.transformed_dir)?)
}

// =============================================================================
// Full Run
// =============================================================================

/// Run the whole pipeline in order. The warehouse load only happens when a
/// config is given, and never before validation has passed.
pub fn run(paths: &DataPaths, warehouse: Option<WarehouseConfig>) -> PipelineResult<RunReport> {
    run_extract(paths)?;
    let cleaned = run_clean(paths)?;
    let transform = run_transform(paths)?;
    let validation = run_validate(paths)?;

    let load = match warehouse {
        Some(config) => Some(run_load(paths, config)?),
        None => None,
    };

    info!("pipeline run complete");
    Ok(RunReport {
        cleaned,
        transform,
        validation,
        load,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{PipelineError, ValidationError};

    fn write_raw_sources(raw: &Path) {
        std::fs::create_dir_all(raw).unwrap();
        std::fs::write(
            raw.join("customer_data.csv"),
            "Customer ID,Customer Name,Segment,City,State,Country,Region\n\
             CU-1,alice doe,Consumer,Lyon,Rhone,france,south\n\
             CU-2,bob stone,Freelancer,Paris,Ile,france,north\n",
        )
        .unwrap();
        std::fs::write(
            raw.join("inventory_data.csv"),
            "Product ID,Product Name,Category,Sub-Category\n\
             PR-1,standing desk,Furniture,Tables\n",
        )
        .unwrap();
        std::fs::write(
            raw.join("sales_data.csv"),
            "Order ID,Product ID,Customer ID,Order Date,Sales,Profit,Quantity,Discount,Shipping Cost\n\
             OR-1,PR-1,CU-1,15-01-2023,100,10,1,0,5\n\
             OR-2,PR-1,CU-2,16-01-2023,50,5,-2,0.1,3\n",
        )
        .unwrap();
        std::fs::write(
            raw.join("shipping_data.csv"),
            "Order ID,Ship Date,Ship Mode,Delivery Days,Shipping Cost\n\
             OR-1,17-01-2023,First Class,2,5\n\
             OR-2,18-01-2023,Standard Class,4,3\n",
        )
        .unwrap();
        // OR-2's date is missing from the time source; the transform
        // synthesizes it
        std::fs::write(
            raw.join("time_data.csv"),
            "Order Date,order year,order month\n15-01-2023,2023,1\n",
        )
        .unwrap();
    }

    #[test]
    fn test_full_run_without_warehouse() {
        let dir = tempfile::tempdir().unwrap();
        let paths = DataPaths::under(dir.path());
        write_raw_sources(&paths.raw_dir);

        let report = run(&paths, None).unwrap();

        assert_eq!(report.cleaned.len(), 5);
        assert_eq!(report.transform.fact_rows, 2);
        assert_eq!(report.transform.synthesized_dates, 1);
        assert_eq!(report.validation.fact_rows, 2);
        assert_eq!(report.validation.time_rows, 2);
        assert!(report.load.is_none());

        // every stage left its files behind
        assert!(paths.staging_dir.join("sales_raw.csv").exists());
        assert!(paths.processed_dir.join("sales_cleaned.csv").exists());
        assert!(paths.transformed_dir.join("sales_fact.csv").exists());
    }

    #[test]
    fn test_full_run_with_warehouse() {
        let dir = tempfile::tempdir().unwrap();
        let paths = DataPaths::under(dir.path());
        write_raw_sources(&paths.raw_dir);

        let config = WarehouseConfig::new(
            dir.path().join("warehouse.db"),
            dir.path().join("skipped_rows.log"),
        );
        let report = run(&paths, Some(config.clone())).unwrap();

        let load = report.load.unwrap();
        assert_eq!(load.skipped, 0);
        let fact = load.tables.last().unwrap();
        assert_eq!(fact.table, "Sales_Fact");
        assert_eq!(fact.inserted, 2);

        // re-running the whole pipeline is idempotent at the warehouse
        let second = run(&paths, Some(config)).unwrap();
        let fact = second.load.unwrap().tables.last().unwrap().clone();
        assert_eq!(fact.inserted, 0);
        assert_eq!(fact.ignored, 2);
    }

    #[test]
    fn test_nan_measure_stops_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let paths = DataPaths::under(dir.path());
        write_raw_sources(&paths.raw_dir);
        // a textual NaN in a measure must not survive to the warehouse;
        // cleaning nulls it and the validation gate stops the run
        std::fs::write(
            paths.raw_dir.join("sales_data.csv"),
            "Order ID,Product ID,Customer ID,Order Date,Sales,Profit,Quantity,Discount,Shipping Cost\n\
             OR-1,PR-1,CU-1,15-01-2023,100,10,1,0,5\n\
             OR-2,PR-1,CU-2,16-01-2023,NaN,5,2,0.1,3\n",
        )
        .unwrap();

        let err = run(&paths, None).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Validation(ValidationError::NullValues { ref column, .. })
                if column == "Sales"
        ));
    }

    #[test]
    fn test_missing_raw_file_fails_extract() {
        let dir = tempfile::tempdir().unwrap();
        let paths = DataPaths::under(dir.path());
        std::fs::create_dir_all(&paths.raw_dir).unwrap();

        let err = run(&paths, None).unwrap_err();
        assert!(matches!(err, PipelineError::Source(_)));
    }

    #[test]
    fn test_report_serializes() {
        let dir = tempfile::tempdir().unwrap();
        let paths = DataPaths::under(dir.path());
        write_raw_sources(&paths.raw_dir);

        let report = run(&paths, None).unwrap();
        let json = serde_json::to_string_pretty(&report).unwrap();
        assert!(json.contains("\"fact_rows\""));
        assert!(json.contains("\"cleaned\""));
    }
}
