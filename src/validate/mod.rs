//! Standalone integrity validation of the persisted star schema.
//!
//! This is a second, independent gate: it re-reads the transformed CSV
//! files from disk rather than trusting the transformer's in-memory output,
//! so corruption introduced by the persistence hand-off is caught too.
//!
//! Checks, each fatal on failure:
//! - declared column types conform (key columns textual, the time key a
//!   genuine date, measures numeric)
//! - no nulls anywhere in any dimension or in the fact table
//! - no duplicate natural keys in any dimension
//! - every fact foreign key resolves in its dimension
//! - all five fact measures are non-negative
//!
//! There is no recovery path. The first failed check stops the pipeline.

use log::info;
use serde::Serialize;
use std::collections::HashSet;
use std::path::Path;

use crate::error::{ValidationError, ValidationResult};
use crate::table::{Cell, ColumnType, Table};
use crate::transform::{
    CUSTOMER_DIM_FILE, PRODUCT_DIM_FILE, SALES_FACT_FILE, SHIPPING_DIM_FILE, TIME_DIM_FILE,
};

/// Declared schema of each persisted conformed table.
pub const CUSTOMER_DIM_SCHEMA: [(&str, ColumnType); 7] = [
    ("Customer ID", ColumnType::Text),
    ("Customer Name", ColumnType::Text),
    ("Segment", ColumnType::Text),
    ("City", ColumnType::Text),
    ("State", ColumnType::Text),
    ("Country", ColumnType::Text),
    ("Region", ColumnType::Text),
];

pub const PRODUCT_DIM_SCHEMA: [(&str, ColumnType); 4] = [
    ("Product ID", ColumnType::Text),
    ("Product Name", ColumnType::Text),
    ("Category", ColumnType::Text),
    ("Sub-Category", ColumnType::Text),
];

pub const TIME_DIM_SCHEMA: [(&str, ColumnType); 3] = [
    ("Order Date", ColumnType::Date),
    ("order year", ColumnType::Int),
    ("order month", ColumnType::Int),
];

pub const SHIPPING_DIM_SCHEMA: [(&str, ColumnType); 5] = [
    ("Order ID", ColumnType::Text),
    ("Ship Date", ColumnType::Date),
    ("Ship Mode", ColumnType::Text),
    ("Delivery Days", ColumnType::Int),
    ("Shipping Cost", ColumnType::Float),
];

pub const SALES_FACT_SCHEMA: [(&str, ColumnType); 9] = [
    ("Order ID", ColumnType::Text),
    ("Product ID", ColumnType::Text),
    ("Customer ID", ColumnType::Text),
    ("Order Date", ColumnType::Date),
    ("Sales", ColumnType::Float),
    ("Profit", ColumnType::Float),
    ("Quantity", ColumnType::Int),
    ("Discount", ColumnType::Float),
    ("Shipping Cost", ColumnType::Float),
];

/// The five fact measures that must be non-negative.
const FACT_MEASURES: [&str; 5] = ["Sales", "Profit", "Quantity", "Discount", "Shipping Cost"];

/// Row counts of the validated tables, for the run report.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub customer_rows: usize,
    pub product_rows: usize,
    pub time_rows: usize,
    pub shipping_rows: usize,
    pub fact_rows: usize,
}

// =============================================================================
// Entry Point
// =============================================================================

/// Validate the persisted transformed output in `dir`.
pub fn validate_dir(dir: &Path) -> ValidationResult<ValidationReport> {
    let customer_dim = read_checked(dir.join(CUSTOMER_DIM_FILE), "CustomerDim", &CUSTOMER_DIM_SCHEMA)?;
    let product_dim = read_checked(dir.join(PRODUCT_DIM_FILE), "ProductDim", &PRODUCT_DIM_SCHEMA)?;
    let time_dim = read_checked(dir.join(TIME_DIM_FILE), "TimeDim", &TIME_DIM_SCHEMA)?;
    let shipping_dim = read_checked(dir.join(SHIPPING_DIM_FILE), "ShippingDim", &SHIPPING_DIM_SCHEMA)?;
    let sales_fact = read_checked(dir.join(SALES_FACT_FILE), "SalesFact", &SALES_FACT_SCHEMA)?;

    validate_tables(&customer_dim, &product_dim, &time_dim, &shipping_dim, &sales_fact)?;

    Ok(ValidationReport {
        customer_rows: customer_dim.len(),
        product_rows: product_dim.len(),
        time_rows: time_dim.len(),
        shipping_rows: shipping_dim.len(),
        fact_rows: sales_fact.len(),
    })
}

/// Run every structural check against already-typed tables.
///
/// Split out from [`validate_dir`] so the same assertions can run against
/// in-memory tables in tests.
pub fn validate_tables(
    customer_dim: &Table,
    product_dim: &Table,
    time_dim: &Table,
    shipping_dim: &Table,
    sales_fact: &Table,
) -> ValidationResult<()> {
    // 1. No nulls in any dimension.
    for dim in [customer_dim, product_dim, time_dim, shipping_dim] {
        check_no_nulls(dim)?;
    }

    // 2. Unique natural keys.
    check_unique_key(customer_dim, "Customer ID")?;
    check_unique_key(product_dim, "Product ID")?;
    check_unique_key(time_dim, "Order Date")?;
    check_unique_key(shipping_dim, "Order ID")?;

    // 3. No nulls in the fact table.
    check_no_nulls(sales_fact)?;

    // 4. Foreign keys resolve.
    check_foreign_key(sales_fact, "Customer ID", customer_dim)?;
    check_foreign_key(sales_fact, "Product ID", product_dim)?;
    check_foreign_key(sales_fact, "Order Date", time_dim)?;
    check_foreign_key(sales_fact, "Order ID", shipping_dim)?;

    // 5. Non-negative measures.
    for measure in FACT_MEASURES {
        check_non_negative(sales_fact, measure)?;
    }

    info!("integrity validation passed, no issues found");
    Ok(())
}

// =============================================================================
// Checks
// =============================================================================

/// Read a persisted table and enforce its declared types: every non-empty
/// field must parse as its column's type.
fn read_checked(
    path: std::path::PathBuf,
    name: &str,
    schema: &[(&str, ColumnType)],
) -> ValidationResult<Table> {
    let raw = Table::read_csv(name, &path).map_err(ValidationError::Table)?;

    let mut typed = Table::new(name, schema.iter().map(|(c, _)| c.to_string()).collect());
    let indices: Vec<usize> = schema
        .iter()
        .map(|(c, _)| raw.require_column(c).map_err(ValidationError::Table))
        .collect::<ValidationResult<_>>()?;

    for row in &raw.rows {
        let mut out = Vec::with_capacity(schema.len());
        for (&idx, (col, ty)) in indices.iter().zip(schema) {
            let field = row[idx].canonical();
            let cell = Cell::parse(&field, *ty).ok_or_else(|| ValidationError::TypeMismatch {
                table: name.to_string(),
                column: col.to_string(),
                expected: ty.name(),
                value: field.clone(),
            })?;
            out.push(cell);
        }
        typed.push_row(out);
    }
    Ok(typed)
}

fn check_no_nulls(table: &Table) -> ValidationResult<()> {
    for (idx, column) in table.columns.iter().enumerate() {
        let count = table.null_count(idx);
        if count > 0 {
            return Err(ValidationError::NullValues {
                table: table.name.clone(),
                column: column.clone(),
                count,
            });
        }
    }
    Ok(())
}

fn check_unique_key(table: &Table, key: &str) -> ValidationResult<()> {
    let idx = table.require_column(key).map_err(ValidationError::Table)?;
    let mut seen = HashSet::new();
    let duplicates = table
        .column_cells(idx)
        .filter(|c| !seen.insert(c.canonical()))
        .count();
    if duplicates > 0 {
        return Err(ValidationError::DuplicateKeys {
            table: table.name.clone(),
            column: key.to_string(),
            count: duplicates,
        });
    }
    Ok(())
}

fn check_foreign_key(fact: &Table, column: &str, dim: &Table) -> ValidationResult<()> {
    let fact_idx = fact.require_column(column).map_err(ValidationError::Table)?;
    let dim_idx = dim.require_column(column).map_err(ValidationError::Table)?;

    let keys: HashSet<String> = dim.column_cells(dim_idx).map(Cell::canonical).collect();
    let orphans = fact
        .column_cells(fact_idx)
        .filter(|c| !keys.contains(&c.canonical()))
        .count();
    if orphans > 0 {
        return Err(ValidationError::OrphanForeignKey {
            column: column.to_string(),
            dimension: dim.name.clone(),
            count: orphans,
        });
    }
    Ok(())
}

fn check_non_negative(fact: &Table, column: &str) -> ValidationResult<()> {
    let idx = fact.require_column(column).map_err(ValidationError::Table)?;
    let negatives = fact
        .column_cells(idx)
        .filter(|c| c.as_f64().map(|v| v < 0.0).unwrap_or(false))
        .count();
    if negatives > 0 {
        return Err(ValidationError::NegativeMeasure {
            column: column.to_string(),
            count: negatives,
        });
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

    fn valid_star() -> (Table, Table, Table, Table, Table) {
        let mut customer = Table::new(
            "CustomerDim",
            CUSTOMER_DIM_SCHEMA.iter().map(|(c, _)| c.to_string()).collect(),
        );
        customer.push_row(vec![
            text("CU-1"), text("Alice Doe"), text("Consumer"),
            text("Lyon"), text("Rhone"), text("FRANCE"), text("SOUTH"),
        ]);

        let mut product = Table::new(
            "ProductDim",
            PRODUCT_DIM_SCHEMA.iter().map(|(c, _)| c.to_string()).collect(),
        );
        product.push_row(vec![text("PR-1"), text("Desk"), text("Furniture"), text("Tables")]);

        let mut time = Table::new(
            "TimeDim",
            TIME_DIM_SCHEMA.iter().map(|(c, _)| c.to_string()).collect(),
        );
        time.push_row(vec![date(2023, 1, 1), Cell::Int(2023), Cell::Int(1)]);

        let mut shipping = Table::new(
            "ShippingDim",
            SHIPPING_DIM_SCHEMA.iter().map(|(c, _)| c.to_string()).collect(),
        );
        shipping.push_row(vec![
            text("OR-1"), date(2023, 1, 3), text("First Class"), Cell::Int(2), Cell::Float(5.0),
        ]);

        let mut fact = Table::new(
            "SalesFact",
            SALES_FACT_SCHEMA.iter().map(|(c, _)| c.to_string()).collect(),
        );
        fact.push_row(vec![
            text("OR-1"), text("PR-1"), text("CU-1"), date(2023, 1, 1),
            Cell::Float(100.0), Cell::Float(10.0), Cell::Int(1),
            Cell::Float(0.0), Cell::Float(5.0),
        ]);

        (customer, product, time, shipping, fact)
    }

    #[test]
    fn test_valid_star_passes() {
        let (c, p, t, s, f) = valid_star();
        assert!(validate_tables(&c, &p, &t, &s, &f).is_ok());
    }

    #[test]
    fn test_null_in_dimension_fails() {
        let (mut c, p, t, s, f) = valid_star();
        c.rows[0][2] = Cell::Null;
        let err = validate_tables(&c, &p, &t, &s, &f).unwrap_err();
        assert!(matches!(err, ValidationError::NullValues { .. }));
    }

    #[test]
    fn test_duplicate_key_fails() {
        let (mut c, p, t, s, f) = valid_star();
        let dup = c.rows[0].clone();
        c.push_row(dup);
        let err = validate_tables(&c, &p, &t, &s, &f).unwrap_err();
        assert!(matches!(err, ValidationError::DuplicateKeys { .. }));
    }

    #[test]
    fn test_orphan_foreign_key_fails() {
        let (c, p, t, s, mut f) = valid_star();
        f.rows[0][2] = text("CU-404");
        let err = validate_tables(&c, &p, &t, &s, &f).unwrap_err();
        match err {
            ValidationError::OrphanForeignKey { column, dimension, count } => {
                assert_eq!(column, "Customer ID");
                assert_eq!(dimension, "CustomerDim");
                assert_eq!(count, 1);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_negative_measure_fails() {
        let (c, p, t, s, mut f) = valid_star();
        f.rows[0][5] = Cell::Float(-1.0);
        let err = validate_tables(&c, &p, &t, &s, &f).unwrap_err();
        assert!(matches!(
            err,
            ValidationError::NegativeMeasure { ref column, .. } if column == "Profit"
        ));
    }

    #[test]
    fn test_validate_dir_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let (c, p, t, s, f) = valid_star();
        c.write_csv(&dir.path().join(CUSTOMER_DIM_FILE)).unwrap();
        p.write_csv(&dir.path().join(PRODUCT_DIM_FILE)).unwrap();
        t.write_csv(&dir.path().join(TIME_DIM_FILE)).unwrap();
        s.write_csv(&dir.path().join(SHIPPING_DIM_FILE)).unwrap();
        f.write_csv(&dir.path().join(SALES_FACT_FILE)).unwrap();

        let report = validate_dir(dir.path()).unwrap();
        assert_eq!(report.fact_rows, 1);
        assert_eq!(report.time_rows, 1);
    }

    #[test]
    fn test_non_finite_measure_fails_type_check() {
        let dir = tempfile::tempdir().unwrap();
        let (c, p, t, s, f) = valid_star();
        c.write_csv(&dir.path().join(CUSTOMER_DIM_FILE)).unwrap();
        p.write_csv(&dir.path().join(PRODUCT_DIM_FILE)).unwrap();
        t.write_csv(&dir.path().join(TIME_DIM_FILE)).unwrap();
        s.write_csv(&dir.path().join(SHIPPING_DIM_FILE)).unwrap();
        drop(f);
        // a NaN measure would pass both the null and non-negative checks
        // if it were allowed to parse as a float
        std::fs::write(
            dir.path().join(SALES_FACT_FILE),
            "Order ID,Product ID,Customer ID,Order Date,Sales,Profit,Quantity,Discount,Shipping Cost\n\
             OR-1,PR-1,CU-1,2023-01-01,NaN,10,1,0,5\n",
        )
        .unwrap();

        let err = validate_dir(dir.path()).unwrap_err();
        assert!(matches!(
            err,
            ValidationError::TypeMismatch { ref column, .. } if column == "Sales"
        ));
    }

    #[test]
    fn test_validate_dir_catches_persisted_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let (c, p, t, s, f) = valid_star();
        c.write_csv(&dir.path().join(CUSTOMER_DIM_FILE)).unwrap();
        p.write_csv(&dir.path().join(PRODUCT_DIM_FILE)).unwrap();
        s.write_csv(&dir.path().join(SHIPPING_DIM_FILE)).unwrap();
        f.write_csv(&dir.path().join(SALES_FACT_FILE)).unwrap();
        // corrupt the time dimension after the transform "wrote" it
        std::fs::write(
            dir.path().join(TIME_DIM_FILE),
            "Order Date,order year,order month\nnot-a-date,2023,1\n",
        )
        .unwrap();
        drop(t);

        let err = validate_dir(dir.path()).unwrap_err();
        assert!(matches!(err, ValidationError::TypeMismatch { .. }));
    }
}
