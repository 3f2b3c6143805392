//! Warehouse loading: idempotent schema creation and row-by-row loads.
//!
//! The warehouse is a SQLite database owned by an explicit
//! [`WarehouseConfig`]; nothing in this module reads process-wide state.
//! Schema creation uses `IF NOT EXISTS` throughout so re-running a load is
//! safe, and every insert goes through `INSERT OR IGNORE`: rows violating a
//! primary-key constraint are silently skipped, while rows the database
//! rejects outright (e.g. foreign-key failures) are collected and appended
//! to a side log with the error text rather than failing the batch.
//!
//! Each table commits independently after all its rows are attempted, and
//! the load order respects the star schema: all four dimensions before the
//! fact table.

pub mod features;

use log::{info, warn};
use rusqlite::Connection;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{LoadError, LoadResult};
use crate::table::{Cell, ColumnType, Table, DATE_FORMAT};
use crate::transform::{
    CUSTOMER_DIM_FILE, PRODUCT_DIM_FILE, SALES_FACT_FILE, SHIPPING_DIM_FILE, TIME_DIM_FILE,
};
use crate::validate::{
    CUSTOMER_DIM_SCHEMA, PRODUCT_DIM_SCHEMA, SALES_FACT_SCHEMA, SHIPPING_DIM_SCHEMA,
    TIME_DIM_SCHEMA,
};

/// Warehouse DDL. Dates are stored as `YYYY-MM-DD` text, money as REAL.
const CREATE_TABLES_SQL: &str = "
CREATE TABLE IF NOT EXISTS Customer_Dim (
    CustomerID TEXT PRIMARY KEY,
    CustomerName TEXT,
    Segment TEXT,
    City TEXT,
    State TEXT,
    Country TEXT,
    Region TEXT
);

CREATE TABLE IF NOT EXISTS Product_Dim (
    ProductID TEXT PRIMARY KEY,
    ProductName TEXT,
    Category TEXT,
    SubCategory TEXT
);

CREATE TABLE IF NOT EXISTS Time_Dim (
    OrderDate TEXT PRIMARY KEY,
    OrderYear INTEGER,
    OrderMonth INTEGER
);

CREATE TABLE IF NOT EXISTS Shipping_Dim (
    OrderID TEXT PRIMARY KEY,
    ShipDate TEXT,
    ShipMode TEXT,
    DeliveryDays INTEGER,
    ShippingCost REAL
);

CREATE TABLE IF NOT EXISTS Sales_Fact (
    OrderID TEXT,
    ProductID TEXT,
    CustomerID TEXT,
    OrderDate TEXT,
    Sales REAL,
    Profit REAL,
    Quantity INTEGER,
    Discount REAL,
    ShippingCost REAL,
    PRIMARY KEY (OrderID, ProductID, CustomerID, OrderDate),
    FOREIGN KEY (CustomerID) REFERENCES Customer_Dim(CustomerID),
    FOREIGN KEY (ProductID) REFERENCES Product_Dim(ProductID),
    FOREIGN KEY (OrderDate) REFERENCES Time_Dim(OrderDate),
    FOREIGN KEY (OrderID) REFERENCES Shipping_Dim(OrderID)
);
";

// =============================================================================
// Configuration
// =============================================================================

/// Explicit loader configuration; passed in, never read from the
/// environment inside the library.
#[derive(Debug, Clone)]
pub struct WarehouseConfig {
    /// Path of the SQLite database file.
    pub db_path: PathBuf,
    /// Path of the append-only side log for rejected rows.
    pub skipped_log: PathBuf,
}

impl WarehouseConfig {
    pub fn new(db_path: impl Into<PathBuf>, skipped_log: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            skipped_log: skipped_log.into(),
        }
    }
}

// =============================================================================
// Table Specs
// =============================================================================

/// Declarative description of one warehouse table: where its transformed
/// CSV lives, how its source columns are typed, and how they map onto the
/// warehouse's declared column names.
pub struct TableSpec {
    pub warehouse_table: &'static str,
    pub source_file: &'static str,
    pub schema: &'static [(&'static str, ColumnType)],
    pub mapping: &'static [(&'static str, &'static str)],
}

/// All five table specs, in foreign-key dependency order.
pub const TABLE_SPECS: [TableSpec; 5] = [
    TableSpec {
        warehouse_table: "Customer_Dim",
        source_file: CUSTOMER_DIM_FILE,
        schema: &CUSTOMER_DIM_SCHEMA,
        mapping: &[
            ("Customer ID", "CustomerID"),
            ("Customer Name", "CustomerName"),
            ("Segment", "Segment"),
            ("City", "City"),
            ("State", "State"),
            ("Country", "Country"),
            ("Region", "Region"),
        ],
    },
    TableSpec {
        warehouse_table: "Product_Dim",
        source_file: PRODUCT_DIM_FILE,
        schema: &PRODUCT_DIM_SCHEMA,
        mapping: &[
            ("Product ID", "ProductID"),
            ("Product Name", "ProductName"),
            ("Category", "Category"),
            ("Sub-Category", "SubCategory"),
        ],
    },
    TableSpec {
        warehouse_table: "Time_Dim",
        source_file: TIME_DIM_FILE,
        schema: &TIME_DIM_SCHEMA,
        mapping: &[
            ("Order Date", "OrderDate"),
            ("order year", "OrderYear"),
            ("order month", "OrderMonth"),
        ],
    },
    TableSpec {
        warehouse_table: "Shipping_Dim",
        source_file: SHIPPING_DIM_FILE,
        schema: &SHIPPING_DIM_SCHEMA,
        mapping: &[
            ("Order ID", "OrderID"),
            ("Ship Date", "ShipDate"),
            ("Ship Mode", "ShipMode"),
            ("Delivery Days", "DeliveryDays"),
            ("Shipping Cost", "ShippingCost"),
        ],
    },
    TableSpec {
        warehouse_table: "Sales_Fact",
        source_file: SALES_FACT_FILE,
        schema: &SALES_FACT_SCHEMA,
        mapping: &[
            ("Order ID", "OrderID"),
            ("Product ID", "ProductID"),
            ("Customer ID", "CustomerID"),
            ("Order Date", "OrderDate"),
            ("Sales", "Sales"),
            ("Profit", "Profit"),
            ("Quantity", "Quantity"),
            ("Discount", "Discount"),
            ("Shipping Cost", "ShippingCost"),
        ],
    },
];

/// Cross-check every spec's mapping against its schema. Run once when the
/// loader is built, so a drifted mapping fails before any insert.
pub fn validate_specs() -> LoadResult<()> {
    for spec in &TABLE_SPECS {
        let schema_cols: Vec<String> = spec.schema.iter().map(|(c, _)| c.to_string()).collect();
        let mapping_cols: Vec<String> = spec.mapping.iter().map(|(c, _)| c.to_string()).collect();
        if schema_cols != mapping_cols {
            return Err(LoadError::ColumnMapping {
                table: spec.warehouse_table.to_string(),
                expected: schema_cols,
                found: mapping_cols,
            });
        }
    }
    Ok(())
}

// =============================================================================
// Load Statistics
// =============================================================================

/// Outcome of loading one table.
#[derive(Debug, Clone, Serialize)]
pub struct TableLoadStats {
    pub table: String,
    /// Rows read from the transformed file.
    pub attempted: usize,
    /// Rows newly inserted.
    pub inserted: usize,
    /// Rows silently skipped by `INSERT OR IGNORE` (already present).
    pub ignored: usize,
    /// Rows the database rejected; written to the side log.
    pub failed: usize,
}

/// Outcome of a full warehouse load.
#[derive(Debug, Clone, Serialize)]
pub struct LoadReport {
    pub tables: Vec<TableLoadStats>,
    /// Total of ignored + failed rows across all tables.
    pub skipped: usize,
}

// =============================================================================
// Loader
// =============================================================================

/// Owns the warehouse connection for one pipeline run.
pub struct WarehouseLoader {
    config: WarehouseConfig,
    conn: Connection,
}

impl WarehouseLoader {
    /// Open (or create) the warehouse database and validate the table specs.
    pub fn connect(config: WarehouseConfig) -> LoadResult<Self> {
        validate_specs()?;
        let conn = open_connection(&config.db_path)?;
        info!("connected to warehouse at {}", config.db_path.display());
        Ok(Self { config, conn })
    }

    /// Create the five warehouse tables if they do not exist yet.
    pub fn ensure_schema(&self) -> LoadResult<()> {
        self.conn.execute_batch(CREATE_TABLES_SQL)?;
        info!("warehouse schema ensured ({} tables)", TABLE_SPECS.len());
        Ok(())
    }

    /// Verify the connection is alive; reopen once if it is not.
    fn ensure_open(&mut self) -> LoadResult<()> {
        let alive = self
            .conn
            .query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .is_ok();
        if alive {
            return Ok(());
        }
        warn!("warehouse connection not responding, reconnecting once");
        self.conn = open_connection(&self.config.db_path)
            .map_err(|_| LoadError::Reconnect(self.config.db_path.display().to_string()))?;
        Ok(())
    }

    /// Load every transformed table from `dir`, dimensions before the fact.
    pub fn load_all(&mut self, dir: &Path) -> LoadResult<LoadReport> {
        self.ensure_schema()?;

        let mut tables = Vec::with_capacity(TABLE_SPECS.len());
        for spec in &TABLE_SPECS {
            let stats = self.load_table(spec, dir)?;
            tables.push(stats);
        }

        let skipped = tables.iter().map(|t| t.ignored + t.failed).sum();
        if skipped > 0 {
            warn!(
                "{} row(s) skipped during load, see {}",
                skipped,
                self.config.skipped_log.display()
            );
        }
        Ok(LoadReport { tables, skipped })
    }

    /// Load one table: read its typed CSV, rename columns per the mapping,
    /// and insert row by row with skip-on-conflict semantics.
    pub fn load_table(&mut self, spec: &TableSpec, dir: &Path) -> LoadResult<TableLoadStats> {
        self.ensure_open()?;

        let table = Table::read_csv_typed(
            spec.warehouse_table,
            &dir.join(spec.source_file),
            spec.schema,
        )?;

        let warehouse_cols: Vec<&str> = spec.mapping.iter().map(|(_, w)| *w).collect();
        let placeholders: Vec<String> = (1..=warehouse_cols.len()).map(|i| format!("?{i}")).collect();
        let insert_sql = format!(
            "INSERT OR IGNORE INTO {} ({}) VALUES ({})",
            spec.warehouse_table,
            warehouse_cols.join(", "),
            placeholders.join(", ")
        );

        let mut stats = TableLoadStats {
            table: spec.warehouse_table.to_string(),
            attempted: table.len(),
            inserted: 0,
            ignored: 0,
            failed: 0,
        };
        let mut rejected: Vec<(String, String)> = Vec::new();

        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(&insert_sql)?;
            for row in &table.rows {
                let params = rusqlite::params_from_iter(row.iter().map(to_sql_value));
                match stmt.execute(params) {
                    Ok(0) => stats.ignored += 1,
                    Ok(_) => stats.inserted += 1,
                    Err(e) => {
                        stats.failed += 1;
                        let values: Vec<String> = row.iter().map(Cell::canonical).collect();
                        rejected.push((format!("({})", values.join(", ")), e.to_string()));
                    }
                }
            }
        }
        tx.commit()?;

        if !rejected.is_empty() {
            append_skipped_log(&self.config.skipped_log, spec.warehouse_table, &rejected)?;
        }
        info!(
            "{}: {} inserted, {} ignored, {} failed",
            stats.table, stats.inserted, stats.ignored, stats.failed
        );
        Ok(stats)
    }

    /// Borrow the underlying connection (used by the features query).
    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

fn open_connection(path: &Path) -> LoadResult<Connection> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let conn = Connection::open(path)?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    Ok(conn)
}

fn to_sql_value(cell: &Cell) -> rusqlite::types::Value {
    use rusqlite::types::Value;
    match cell {
        Cell::Null => Value::Null,
        Cell::Text(s) => Value::Text(s.clone()),
        Cell::Int(i) => Value::Integer(*i),
        Cell::Float(f) => Value::Real(*f),
        Cell::Date(d) => Value::Text(d.format(DATE_FORMAT).to_string()),
    }
}

/// Append rejected rows to the side log, one entry per row with the
/// database's error text.
fn append_skipped_log(
    path: &Path,
    table: &str,
    rejected: &[(String, String)],
) -> LoadResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    for (row, error) in rejected {
        writeln!(file, "Table: {table}\nRow: {row}\nError: {error}\n")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Cell;
    use chrono::NaiveDate;

    fn text(s: &str) -> Cell {
        Cell::Text(s.into())
    }

    fn date(y: i32, m: u32, d: u32) -> Cell {
        Cell::Date(NaiveDate::from_ymd_opt(y, m, d).unwrap())
    }

    fn write_star(dir: &Path) {
        let mut customer = Table::new(
            "CustomerDim",
            CUSTOMER_DIM_SCHEMA.iter().map(|(c, _)| c.to_string()).collect(),
        );
        customer.push_row(vec![
            text("CU-1"), text("Alice Doe"), text("Consumer"),
            text("Lyon"), text("Rhone"), text("FRANCE"), text("SOUTH"),
        ]);
        customer.write_csv(&dir.join(CUSTOMER_DIM_FILE)).unwrap();

        let mut product = Table::new(
            "ProductDim",
            PRODUCT_DIM_SCHEMA.iter().map(|(c, _)| c.to_string()).collect(),
        );
        product.push_row(vec![text("PR-1"), text("Desk"), text("Furniture"), text("Tables")]);
        product.write_csv(&dir.join(PRODUCT_DIM_FILE)).unwrap();

        let mut time = Table::new(
            "TimeDim",
            TIME_DIM_SCHEMA.iter().map(|(c, _)| c.to_string()).collect(),
        );
        time.push_row(vec![date(2023, 1, 1), Cell::Int(2023), Cell::Int(1)]);
        time.write_csv(&dir.join(TIME_DIM_FILE)).unwrap();

        let mut shipping = Table::new(
            "ShippingDim",
            SHIPPING_DIM_SCHEMA.iter().map(|(c, _)| c.to_string()).collect(),
        );
        shipping.push_row(vec![
            text("OR-1"), date(2023, 1, 3), text("First Class"), Cell::Int(2), Cell::Float(5.0),
        ]);
        shipping.write_csv(&dir.join(SHIPPING_DIM_FILE)).unwrap();

        let mut fact = Table::new(
            "SalesFact",
            SALES_FACT_SCHEMA.iter().map(|(c, _)| c.to_string()).collect(),
        );
        fact.push_row(vec![
            text("OR-1"), text("PR-1"), text("CU-1"), date(2023, 1, 1),
            Cell::Float(100.0), Cell::Float(10.0), Cell::Int(1),
            Cell::Float(0.0), Cell::Float(5.0),
        ]);
        fact.write_csv(&dir.join(SALES_FACT_FILE)).unwrap();
    }

    fn loader(dir: &Path) -> WarehouseLoader {
        let config = WarehouseConfig::new(dir.join("warehouse.db"), dir.join("skipped_rows.log"));
        WarehouseLoader::connect(config).unwrap()
    }

    #[test]
    fn test_specs_are_consistent() {
        validate_specs().unwrap();
    }

    #[test]
    fn test_schema_creation_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let loader = loader(dir.path());
        loader.ensure_schema().unwrap();
        loader.ensure_schema().unwrap();
    }

    #[test]
    fn test_load_all_inserts_every_table() {
        let dir = tempfile::tempdir().unwrap();
        write_star(dir.path());

        let mut loader = loader(dir.path());
        let report = loader.load_all(dir.path()).unwrap();

        assert_eq!(report.skipped, 0);
        for stats in &report.tables {
            assert_eq!(stats.inserted, 1, "table {}", stats.table);
            assert_eq!(stats.failed, 0);
        }

        let count: i64 = loader
            .connection()
            .query_row("SELECT COUNT(*) FROM Sales_Fact", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_reload_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        write_star(dir.path());

        let mut loader = loader(dir.path());
        loader.load_all(dir.path()).unwrap();
        let second = loader.load_all(dir.path()).unwrap();

        // every row already present: all ignored, nothing inserted, no error
        for stats in &second.tables {
            assert_eq!(stats.inserted, 0, "table {}", stats.table);
            assert_eq!(stats.ignored, 1);
        }

        let count: i64 = loader
            .connection()
            .query_row("SELECT COUNT(*) FROM Sales_Fact", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_rejected_rows_logged_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        write_star(dir.path());

        // append a fact row whose customer does not exist in any dimension;
        // the FK constraint rejects it at insert time
        let mut fact = Table::read_csv_typed(
            "SalesFact",
            &dir.path().join(SALES_FACT_FILE),
            &SALES_FACT_SCHEMA,
        )
        .unwrap();
        fact.push_row(vec![
            text("OR-1"), text("PR-1"), text("CU-404"), date(2023, 1, 1),
            Cell::Float(1.0), Cell::Float(0.5), Cell::Int(1),
            Cell::Float(0.0), Cell::Float(5.0),
        ]);
        fact.write_csv(&dir.path().join(SALES_FACT_FILE)).unwrap();

        let mut loader = loader(dir.path());
        let report = loader.load_all(dir.path()).unwrap();

        let fact_stats = report.tables.last().unwrap();
        assert_eq!(fact_stats.inserted, 1);
        assert_eq!(fact_stats.failed, 1);
        assert_eq!(report.skipped, 1);

        let log = std::fs::read_to_string(dir.path().join("skipped_rows.log")).unwrap();
        assert!(log.contains("CU-404"));
        assert!(log.contains("Error:"));
    }
}
