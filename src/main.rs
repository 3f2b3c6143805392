//! Martload CLI - Run the retail sales conformance pipeline
//!
//! # Main Commands
//!
//! ```bash
//! martload run                      # Full pipeline: extract → clean → transform → validate → load
//! martload run --skip-load          # Same, but stop after validation
//! ```
//!
//! # Stage Commands (for development)
//!
//! ```bash
//! martload extract                  # Stage raw sources as UTF-8 copies
//! martload clean                    # Clean staged sources
//! martload transform                # Build the star schema
//! martload validate                 # Validate the persisted star schema
//! martload load                     # Load into the warehouse
//! martload features                 # Print the daily sales aggregation as JSON
//! ```
//!
//! The data root defaults to `./data` and the warehouse database to
//! `./warehouse.db`; both can be overridden by flag or by the
//! `MARTLOAD_DATA_DIR` / `MARTLOAD_DB` environment variables.

use clap::{Parser, Subcommand};
use martload::pipeline::{self, DataPaths};
use martload::warehouse::{features, WarehouseConfig, WarehouseLoader};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "martload")]
#[command(about = "Retail sales conformance pipeline", long_about = None)]
struct Cli {
    /// Data root containing raw/, staging/, processed/, transformed/
    #[arg(long, env = "MARTLOAD_DATA_DIR", default_value = "data")]
    data_dir: PathBuf,

    /// Warehouse SQLite database file
    #[arg(long, env = "MARTLOAD_DB", default_value = "warehouse.db")]
    db: PathBuf,

    /// Side log for rows the warehouse rejects or skips
    #[arg(long, default_value = "skipped_rows.log")]
    skipped_log: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract raw sources into the staging directory
    Extract,

    /// Clean staged sources into the processed directory
    Clean,

    /// Build the star schema from cleaned sources
    Transform,

    /// Validate the persisted star schema
    Validate,

    /// Load the validated star schema into the warehouse
    Load,

    /// Print the daily sales aggregation as JSON
    Features,

    /// Run the full pipeline end to end
    Run {
        /// Stop after validation, do not touch the warehouse
        #[arg(long)]
        skip_load: bool,

        /// Write the run report as JSON to this file
        #[arg(short, long)]
        report: Option<PathBuf>,
    },
}

fn main() {
    // Load .env file (if present)
    dotenvy::dotenv().ok();
    env_logger::init();

    let cli = Cli::parse();
    let paths = DataPaths::under(&cli.data_dir);
    let warehouse = WarehouseConfig::new(&cli.db, &cli.skipped_log);

    let result = match cli.command {
        Commands::Extract => cmd_extract(&paths),
        Commands::Clean => cmd_clean(&paths),
        Commands::Transform => cmd_transform(&paths),
        Commands::Validate => cmd_validate(&paths),
        Commands::Load => cmd_load(&paths, warehouse),
        Commands::Features => cmd_features(warehouse),
        Commands::Run { skip_load, report } => {
            cmd_run(&paths, warehouse, skip_load, report.as_deref())
        }
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

fn cmd_extract(paths: &DataPaths) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("📄 Extracting raw sources from {}", paths.raw_dir.display());
    pipeline::run_extract(paths)?;
    eprintln!("✅ Staged sources in {}", paths.staging_dir.display());
    Ok(())
}

fn cmd_clean(paths: &DataPaths) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("🧹 Cleaning staged sources");
    let summaries = pipeline::run_clean(paths)?;
    for s in &summaries {
        eprintln!(
            "   {}: {} rows, {} imputed, {} clamped",
            s.table, s.rows, s.imputed_cells, s.clamped
        );
        for finding in &s.findings {
            eprintln!("   ⚠️  {}", finding);
        }
    }
    eprintln!("✅ Cleaned sources in {}", paths.processed_dir.display());
    Ok(())
}

fn cmd_transform(paths: &DataPaths) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("⭐ Building star schema");
    let summary = pipeline::run_transform(paths)?;
    eprintln!(
        "   {} fact rows ({} duplicate(s) collapsed, {} null-date row(s) dropped)",
        summary.fact_rows, summary.deduped_fact_rows, summary.dropped_null_dates
    );
    if summary.synthesized_dates > 0 {
        eprintln!(
            "   ⚠️  {} order date(s) synthesized into the time dimension",
            summary.synthesized_dates
        );
    }
    eprintln!("✅ Star schema in {}", paths.transformed_dir.display());
    Ok(())
}

fn cmd_validate(paths: &DataPaths) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("🔍 Validating star schema");
    let report = pipeline::run_validate(paths)?;
    eprintln!(
        "✅ Validation passed: {} fact rows over {} date(s)",
        report.fact_rows, report.time_rows
    );
    Ok(())
}

fn cmd_load(paths: &DataPaths, config: WarehouseConfig) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("🏭 Loading warehouse {}", config.db_path.display());
    let skipped_log = config.skipped_log.clone();
    let report = pipeline::run_load(paths, config)?;
    for t in &report.tables {
        eprintln!(
            "   {}: {} inserted, {} ignored, {} failed",
            t.table, t.inserted, t.ignored, t.failed
        );
    }
    if report.skipped > 0 {
        eprintln!(
            "   ⚠️  {} row(s) skipped, see {}",
            report.skipped,
            skipped_log.display()
        );
    }
    eprintln!("✅ Load complete");
    Ok(())
}

fn cmd_features(config: WarehouseConfig) -> Result<(), Box<dyn std::error::Error>> {
    let loader = WarehouseLoader::connect(config)?;
    // a fresh database has no tables yet; an empty warehouse should
    // produce an empty aggregation, not a missing-table error
    loader.ensure_schema()?;
    let daily = features::sales_by_date(loader.connection())?;
    println!("{}", serde_json::to_string_pretty(&daily)?);
    Ok(())
}

fn cmd_run(
    paths: &DataPaths,
    warehouse: WarehouseConfig,
    skip_load: bool,
    report_path: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("🚀 Running full pipeline from {}", paths.raw_dir.display());

    let target = if skip_load { None } else { Some(warehouse) };
    let report = pipeline::run(paths, target)?;

    eprintln!(
        "✅ Pipeline complete: {} fact rows validated",
        report.validation.fact_rows
    );
    if let Some(load) = &report.load {
        eprintln!("   warehouse: {} row(s) skipped", load.skipped);
    }

    if let Some(path) = report_path {
        let json = serde_json::to_string_pretty(&report)?;
        std::fs::write(path, json)?;
        eprintln!("📝 Run report written to {}", path.display());
    }
    Ok(())
}
