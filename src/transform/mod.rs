//! Dimensional transformation: cleaned sources into a star schema.
//!
//! Four dimension tables are column projections of their cleaned source,
//! deduplicated on their natural key (first occurrence wins). The time
//! dimension is then augmented with any order date that appears in sales but
//! not in the time source, deriving year and month from the date itself.
//! The fact table is a left join of sales to shipping on order id, followed
//! by full-row deduplication.
//!
//! Before the fact table is accepted, all four foreign-key relationships are
//! asserted. Any violation is fatal and aborts the transform; a star schema
//! with dangling references is worse than no output at all.

use chrono::{Datelike, NaiveDate};
use log::{info, warn};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;

use crate::error::{TransformError, TransformResult};
use crate::table::{Cell, Table, DATE_FORMAT};

/// Transformed output file names (the hand-off to the validator and loader).
pub const CUSTOMER_DIM_FILE: &str = "customer_dim.csv";
pub const PRODUCT_DIM_FILE: &str = "product_dim.csv";
pub const TIME_DIM_FILE: &str = "time_dim.csv";
pub const SHIPPING_DIM_FILE: &str = "shipping_dim.csv";
pub const SALES_FACT_FILE: &str = "sales_fact.csv";

// =============================================================================
// Output
// =============================================================================

/// The conformed star schema produced by one transform run.
#[derive(Debug, Clone)]
pub struct ConformedTables {
    pub customer_dim: Table,
    pub product_dim: Table,
    pub time_dim: Table,
    pub shipping_dim: Table,
    pub sales_fact: Table,
}

impl ConformedTables {
    /// Persist all five tables into the transformed directory.
    pub fn write_all(&self, dir: &Path) -> TransformResult<()> {
        self.customer_dim
            .write_csv(&dir.join(CUSTOMER_DIM_FILE))
            .map_err(TransformError::Table)?;
        self.product_dim
            .write_csv(&dir.join(PRODUCT_DIM_FILE))
            .map_err(TransformError::Table)?;
        self.time_dim
            .write_csv(&dir.join(TIME_DIM_FILE))
            .map_err(TransformError::Table)?;
        self.shipping_dim
            .write_csv(&dir.join(SHIPPING_DIM_FILE))
            .map_err(TransformError::Table)?;
        self.sales_fact
            .write_csv(&dir.join(SALES_FACT_FILE))
            .map_err(TransformError::Table)?;
        Ok(())
    }
}

/// Counts describing what the transform did.
#[derive(Debug, Clone, Serialize)]
pub struct TransformSummary {
    /// Sales/time rows dropped because their order date was null.
    pub dropped_null_dates: usize,
    /// Time rows synthesized from dates present only in sales.
    pub synthesized_dates: usize,
    /// Exact duplicate fact rows removed.
    pub deduped_fact_rows: usize,
    /// Final fact row count.
    pub fact_rows: usize,
}

// =============================================================================
// Transform
// =============================================================================

/// Build the star schema from the five cleaned tables.
pub fn transform(
    customers: &Table,
    products: &Table,
    sales: &Table,
    shipping: &Table,
    time: &Table,
) -> TransformResult<(ConformedTables, TransformSummary)> {
    let mut summary = TransformSummary {
        dropped_null_dates: 0,
        synthesized_dates: 0,
        deduped_fact_rows: 0,
        fact_rows: 0,
    };

    // Order dates are join keys and cannot be guessed: rows that lost their
    // date during cleaning are dropped before any construction.
    let mut sales = sales.clone();
    let mut time = time.clone();
    let sales_date = sales.require_column("Order Date").map_err(TransformError::Table)?;
    let time_date = time.require_column("Order Date").map_err(TransformError::Table)?;
    retype_date_column(&mut sales, sales_date);
    retype_date_column(&mut time, time_date);
    summary.dropped_null_dates += drop_null_rows(&mut sales, sales_date);
    summary.dropped_null_dates += drop_null_rows(&mut time, time_date);
    if summary.dropped_null_dates > 0 {
        warn!(
            "dropped {} row(s) with unparsable order dates",
            summary.dropped_null_dates
        );
    }

    // 1. Dimensions: projection + natural-key dedup, first occurrence wins.
    let mut customer_dim = customers
        .project(
            "CustomerDim",
            &[
                "Customer ID",
                "Customer Name",
                "Segment",
                "City",
                "State",
                "Country",
                "Region",
            ],
        )
        .map_err(TransformError::Table)?;
    let key = customer_dim.require_column("Customer ID").map_err(TransformError::Table)?;
    customer_dim.dedup_by_key(key);

    let mut product_dim = products
        .project(
            "ProductDim",
            &["Product ID", "Product Name", "Category", "Sub-Category"],
        )
        .map_err(TransformError::Table)?;
    let key = product_dim.require_column("Product ID").map_err(TransformError::Table)?;
    product_dim.dedup_by_key(key);

    let mut time_dim = time
        .project("TimeDim", &["Order Date", "order year", "order month"])
        .map_err(TransformError::Table)?;
    let key = time_dim.require_column("Order Date").map_err(TransformError::Table)?;
    time_dim.dedup_by_key(key);

    let mut shipping_dim = shipping
        .project(
            "ShippingDim",
            &[
                "Order ID",
                "Ship Date",
                "Ship Mode",
                "Delivery Days",
                "Shipping Cost",
            ],
        )
        .map_err(TransformError::Table)?;
    let key = shipping_dim.require_column("Order ID").map_err(TransformError::Table)?;
    shipping_dim.dedup_by_key(key);

    // 2. Augment TimeDim with order dates that exist only in sales,
    //    synthesized rows appended after the native ones.
    summary.synthesized_dates = augment_time_dim(&mut time_dim, &sales, sales_date)?;
    if summary.synthesized_dates > 0 {
        info!(
            "synthesized {} time row(s) from sales order dates",
            summary.synthesized_dates
        );
    }

    // 3. Fact table: left join to shipping for the shipping cost, then
    //    full-row dedup. Key-only dedup would conflate distinct observations
    //    that merely share a key prefix.
    let mut sales_fact = build_sales_fact(&sales, &shipping_dim)?;
    let before = sales_fact.len();
    sales_fact.dedup_full_rows();
    summary.deduped_fact_rows = before - sales_fact.len();
    summary.fact_rows = sales_fact.len();

    // 4. Integrity gate: every foreign key must resolve. Fatal on violation.
    assert_foreign_key(&sales_fact, "Customer ID", &customer_dim, "Customer ID")?;
    assert_foreign_key(&sales_fact, "Product ID", &product_dim, "Product ID")?;
    assert_foreign_key(&sales_fact, "Order Date", &time_dim, "Order Date")?;
    assert_foreign_key(&sales_fact, "Order ID", &shipping_dim, "Order ID")?;
    info!("foreign-key gate passed for {} fact row(s)", sales_fact.len());

    Ok((
        ConformedTables {
            customer_dim,
            product_dim,
            time_dim,
            shipping_dim,
            sales_fact,
        },
        summary,
    ))
}

// =============================================================================
// Steps
// =============================================================================

/// Re-parse a persisted date column: text cells in `YYYY-MM-DD` become
/// dates, anything unparsable becomes null. In-memory date cells pass
/// through unchanged.
fn retype_date_column(table: &mut Table, idx: usize) {
    for row in &mut table.rows {
        if let Cell::Text(s) = &row[idx] {
            row[idx] = match NaiveDate::parse_from_str(s.trim(), DATE_FORMAT) {
                Ok(d) => Cell::Date(d),
                Err(_) => Cell::Null,
            };
        }
    }
}

fn drop_null_rows(table: &mut Table, idx: usize) -> usize {
    let before = table.len();
    table.retain_rows(|row| !row[idx].is_null());
    before - table.len()
}

/// Append a synthesized row for every sales order date absent from the time
/// dimension, deriving year and month from the date.
fn augment_time_dim(
    time_dim: &mut Table,
    sales: &Table,
    sales_date: usize,
) -> TransformResult<usize> {
    let date_idx = time_dim.require_column("Order Date").map_err(TransformError::Table)?;
    let known: HashSet<String> = time_dim
        .column_cells(date_idx)
        .map(Cell::canonical)
        .collect();

    let mut missing: Vec<NaiveDate> = Vec::new();
    let mut seen = known;
    for cell in sales.column_cells(sales_date) {
        if let Some(date) = cell.as_date() {
            if seen.insert(cell.canonical()) {
                missing.push(date);
            }
        }
    }

    if !missing.is_empty() {
        warn!(
            "{} order date(s) present in sales but missing from the time source (e.g. {})",
            missing.len(),
            missing[0]
        );
    }
    for date in &missing {
        time_dim.push_row(vec![
            Cell::Date(*date),
            Cell::Int(date.year() as i64),
            Cell::Int(date.month() as i64),
        ]);
    }
    Ok(missing.len())
}

/// Left join sales to the shipping dimension on order id, projecting the
/// fixed fact columns. The joined shipping cost wins; rows without a match
/// keep the sales row's own shipping cost.
fn build_sales_fact(sales: &Table, shipping_dim: &Table) -> TransformResult<Table> {
    let ship_key = shipping_dim.require_column("Order ID").map_err(TransformError::Table)?;
    let ship_cost = shipping_dim
        .require_column("Shipping Cost")
        .map_err(TransformError::Table)?;
    let cost_by_order: HashMap<String, &Cell> = shipping_dim
        .rows
        .iter()
        .map(|row| (row[ship_key].canonical(), &row[ship_cost]))
        .collect();

    const FACT_COLUMNS: [&str; 9] = [
        "Order ID",
        "Product ID",
        "Customer ID",
        "Order Date",
        "Sales",
        "Profit",
        "Quantity",
        "Discount",
        "Shipping Cost",
    ];
    let indices: Vec<usize> = FACT_COLUMNS
        .iter()
        .map(|c| sales.require_column(c).map_err(TransformError::Table))
        .collect::<TransformResult<_>>()?;
    let order_idx = indices[0];
    let cost_idx = indices[8];

    let mut fact = Table::new(
        "SalesFact",
        FACT_COLUMNS.iter().map(|c| c.to_string()).collect(),
    );
    for row in &sales.rows {
        let mut out: Vec<Cell> = indices.iter().map(|&i| row[i].clone()).collect();
        if let Some(cost) = cost_by_order.get(&row[order_idx].canonical()) {
            out[8] = (*cost).clone();
        } else {
            out[8] = row[cost_idx].clone();
        }
        fact.push_row(out);
    }
    Ok(fact)
}

/// Assert every value of `fact_col` exists in the dimension's key column.
fn assert_foreign_key(
    fact: &Table,
    fact_col: &str,
    dim: &Table,
    dim_col: &str,
) -> TransformResult<()> {
    let fact_idx = fact.require_column(fact_col).map_err(TransformError::Table)?;
    let dim_idx = dim.require_column(dim_col).map_err(TransformError::Table)?;

    let keys: HashSet<String> = dim.column_cells(dim_idx).map(Cell::canonical).collect();
    let mut example = None;
    let mut violations = 0;
    for cell in fact.column_cells(fact_idx) {
        let key = cell.canonical();
        if !keys.contains(&key) {
            violations += 1;
            example.get_or_insert(key);
        }
    }

    if violations > 0 {
        return Err(TransformError::ForeignKeyViolation {
            column: fact_col.to_string(),
            dimension: dim.name.clone(),
            violations,
            example: example.unwrap_or_default(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> Cell {
        Cell::Text(s.into())
    }

    fn date(y: i32, m: u32, d: u32) -> Cell {
        Cell::Date(NaiveDate::from_ymd_opt(y, m, d).unwrap())
    }

    fn customers() -> Table {
        let mut t = Table::new(
            "customers",
            ["Customer ID", "Customer Name", "Segment", "City", "State", "Country", "Region"]
                .iter()
                .map(|c| c.to_string())
                .collect(),
        );
        t.push_row(vec![
            text("CU-1"), text("Alice Doe"), text("Consumer"),
            text("Lyon"), text("Rhone"), text("FRANCE"), text("SOUTH"),
        ]);
        t.push_row(vec![
            text("CU-1"), text("Alice Doe"), text("Consumer"),
            text("Lyon"), text("Rhone"), text("FRANCE"), text("SOUTH"),
        ]);
        t
    }

    fn products() -> Table {
        let mut t = Table::new(
            "products",
            ["Product ID", "Product Name", "Category", "Sub-Category"]
                .iter()
                .map(|c| c.to_string())
                .collect(),
        );
        t.push_row(vec![text("PR-1"), text("Desk"), text("Furniture"), text("Tables")]);
        t
    }

    fn shipping() -> Table {
        let mut t = Table::new(
            "shipping",
            ["Order ID", "Ship Date", "Ship Mode", "Delivery Days", "Shipping Cost"]
                .iter()
                .map(|c| c.to_string())
                .collect(),
        );
        t.push_row(vec![
            text("OR-1"), date(2023, 1, 3), text("First Class"), Cell::Int(2), Cell::Float(5.0),
        ]);
        t
    }

    fn time_table() -> Table {
        let mut t = Table::new(
            "time",
            ["Order Date", "order year", "order month"]
                .iter()
                .map(|c| c.to_string())
                .collect(),
        );
        t.push_row(vec![date(2023, 1, 1), Cell::Int(2023), Cell::Int(1)]);
        t
    }

    fn sales_row(order: &str, product: &str, customer: &str, d: Cell) -> Vec<Cell> {
        vec![
            text(order), text(product), text(customer), d,
            Cell::Float(100.0), Cell::Float(10.0), Cell::Int(1),
            Cell::Float(0.0), Cell::Float(4.0),
        ]
    }

    fn sales() -> Table {
        let mut t = Table::new(
            "sales",
            [
                "Order ID", "Product ID", "Customer ID", "Order Date",
                "Sales", "Profit", "Quantity", "Discount", "Shipping Cost",
            ]
            .iter()
            .map(|c| c.to_string())
            .collect(),
        );
        t.push_row(sales_row("OR-1", "PR-1", "CU-1", date(2023, 1, 1)));
        t
    }

    #[test]
    fn test_dimensions_deduplicated() {
        let (tables, _) =
            transform(&customers(), &products(), &sales(), &shipping(), &time_table()).unwrap();
        assert_eq!(tables.customer_dim.len(), 1);
        assert_eq!(tables.product_dim.len(), 1);
        assert_eq!(tables.shipping_dim.len(), 1);
    }

    #[test]
    fn test_fact_joins_shipping_cost() {
        let (tables, _) =
            transform(&customers(), &products(), &sales(), &shipping(), &time_table()).unwrap();
        let cost = tables.sales_fact.require_column("Shipping Cost").unwrap();
        // shipping table's 5.0 wins over the sales row's own 4.0
        assert_eq!(tables.sales_fact.rows[0][cost], Cell::Float(5.0));
    }

    #[test]
    fn test_time_dim_augmented_from_sales() {
        let mut s = sales();
        s.push_row(sales_row("OR-1", "PR-1", "CU-1", date(2024, 3, 15)));

        let (tables, summary) =
            transform(&customers(), &products(), &s, &shipping(), &time_table()).unwrap();
        assert_eq!(summary.synthesized_dates, 1);
        assert_eq!(tables.time_dim.len(), 2);
        // synthesized row appended after the native one, year/month derived
        let last = tables.time_dim.rows.last().unwrap();
        assert_eq!(last[0], date(2024, 3, 15));
        assert_eq!(last[1], Cell::Int(2024));
        assert_eq!(last[2], Cell::Int(3));
    }

    #[test]
    fn test_time_dim_superset_of_fact_dates() {
        let mut s = sales();
        s.push_row(sales_row("OR-1", "PR-1", "CU-1", date(2024, 3, 15)));
        let (tables, _) =
            transform(&customers(), &products(), &s, &shipping(), &time_table()).unwrap();

        let fact_date = tables.sales_fact.require_column("Order Date").unwrap();
        let dim_date = tables.time_dim.require_column("Order Date").unwrap();
        let known: HashSet<String> = tables
            .time_dim
            .column_cells(dim_date)
            .map(Cell::canonical)
            .collect();
        for cell in tables.sales_fact.column_cells(fact_date) {
            assert!(known.contains(&cell.canonical()));
        }
    }

    #[test]
    fn test_exact_duplicate_fact_rows_collapse() {
        let mut s = sales();
        s.push_row(sales_row("OR-1", "PR-1", "CU-1", date(2023, 1, 1)));

        let (tables, summary) =
            transform(&customers(), &products(), &s, &shipping(), &time_table()).unwrap();
        assert_eq!(tables.sales_fact.len(), 1);
        assert_eq!(summary.deduped_fact_rows, 1);
    }

    #[test]
    fn test_null_order_date_rows_dropped() {
        let mut s = sales();
        s.push_row(sales_row("OR-1", "PR-1", "CU-1", Cell::Null));

        let (tables, summary) =
            transform(&customers(), &products(), &s, &shipping(), &time_table()).unwrap();
        assert_eq!(summary.dropped_null_dates, 1);
        assert_eq!(tables.sales_fact.len(), 1);
    }

    #[test]
    fn test_unknown_customer_aborts() {
        let mut s = sales();
        s.push_row(sales_row("OR-1", "PR-1", "CU-404", date(2023, 1, 1)));

        let err =
            transform(&customers(), &products(), &s, &shipping(), &time_table()).unwrap_err();
        match err {
            TransformError::ForeignKeyViolation { column, example, .. } => {
                assert_eq!(column, "Customer ID");
                assert_eq!(example, "CU-404");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unknown_order_id_aborts() {
        let mut s = sales();
        s.push_row(sales_row("OR-404", "PR-1", "CU-1", date(2023, 1, 1)));

        let err =
            transform(&customers(), &products(), &s, &shipping(), &time_table()).unwrap_err();
        assert!(matches!(
            err,
            TransformError::ForeignKeyViolation { ref column, .. } if column == "Order ID"
        ));
    }
}
