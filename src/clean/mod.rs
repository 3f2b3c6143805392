//! Per-source cleaning: imputation, normalization, coercion, clamping.
//!
//! This is the only stage with a deliberately lossy data-quality policy:
//! nothing here fails because of bad *values*. Missing values are imputed
//! (mode for text, mean/median for numerics), malformed dates and numbers
//! become nulls, out-of-enum categories become `Unknown`, and negative
//! measures are clamped to zero. Every degradation is counted and reported
//! in the table's [`CleanSummary`].
//!
//! Generic imputation runs *before* the per-kind rules so those rules
//! operate on a complete table; date columns are never imputed (a guessed
//! date would later be used as a join key).

pub mod stats;

use chrono::NaiveDate;
use log::{debug, warn};
use serde::Serialize;

use crate::error::TableResult;
use crate::source::SourceKind;
use crate::table::{Cell, Table};

/// Textual date format used by the raw sources.
pub const RAW_DATE_FORMAT: &str = "%d-%m-%Y";

/// Placeholder for categorical values outside their fixed enum.
pub const UNKNOWN: &str = "Unknown";

/// Valid customer segments.
pub const VALID_SEGMENTS: [&str; 3] = ["Consumer", "Corporate", "Home Office"];

/// Valid shipping modes.
pub const VALID_SHIP_MODES: [&str; 4] = ["First Class", "Second Class", "Standard Class", "Same Day"];

// =============================================================================
// Summary
// =============================================================================

/// Data-quality findings for one cleaned table.
#[derive(Debug, Clone, Serialize)]
pub struct CleanSummary {
    /// Source table name.
    pub table: String,
    /// Row count.
    pub rows: usize,
    /// Null count per column, measured just before imputation.
    pub nulls_before: Vec<(String, usize)>,
    /// Cells filled by imputation.
    pub imputed_cells: usize,
    /// Date fields that failed to parse and were set to null.
    pub unparsable_dates: usize,
    /// Categorical values replaced with `Unknown`.
    pub out_of_enum: usize,
    /// Negative values clamped to their floor.
    pub clamped: usize,
    /// Human-readable findings (logged, never fatal).
    pub findings: Vec<String>,
}

impl CleanSummary {
    fn new(table: &str, rows: usize) -> Self {
        Self {
            table: table.to_string(),
            rows,
            nulls_before: Vec::new(),
            imputed_cells: 0,
            unparsable_dates: 0,
            out_of_enum: 0,
            clamped: 0,
            findings: Vec::new(),
        }
    }

    fn finding(&mut self, msg: impl Into<String>) {
        let msg = msg.into();
        debug!("{}: {}", self.table, msg);
        self.findings.push(msg);
    }
}

// =============================================================================
// Entry Point
// =============================================================================

/// Clean one raw table according to its source kind.
///
/// Returns the cleaned table (same columns, no new ones) and a summary of
/// everything that was imputed, defaulted, or clamped. Only structural
/// problems (a missing column) can fail.
pub fn clean(kind: SourceKind, mut table: Table) -> TableResult<(Table, CleanSummary)> {
    let mut summary = CleanSummary::new(kind.name(), table.len());

    // Emulate typed ingestion: a column whose non-null values all parse as
    // numbers is numeric from here on, so imputation can tell text from
    // measures.
    infer_numeric_columns(&mut table);

    match kind {
        SourceKind::Customers => clean_customers(&mut table, &mut summary)?,
        SourceKind::Shipping => clean_shipping(&mut table, &mut summary)?,
        SourceKind::Products => clean_products(&mut table, &mut summary)?,
        SourceKind::Sales => clean_sales(&mut table, &mut summary)?,
        SourceKind::Time => clean_time(&mut table, &mut summary)?,
    }

    Ok((table, summary))
}

// =============================================================================
// Per-kind Rules
// =============================================================================

fn clean_customers(table: &mut Table, summary: &mut CleanSummary) -> TableResult<()> {
    let name = table.require_column("Customer Name")?;
    title_case_column(table, name);

    impute(table, summary);

    for col in ["City", "State", "Country", "Region"] {
        let idx = table.require_column(col)?;
        trim_column(table, idx);
    }

    let segment = table.require_column("Segment")?;
    let replaced = normalize_enum(table, segment, &VALID_SEGMENTS);
    if replaced > 0 {
        summary.out_of_enum += replaced;
        summary.finding(format!(
            "Segment: {} value(s) outside enum replaced with {}",
            replaced, UNKNOWN
        ));
    }

    for col in ["Country", "Region"] {
        let idx = table.require_column(col)?;
        uppercase_column(table, idx);
    }
    Ok(())
}

fn clean_shipping(table: &mut Table, summary: &mut CleanSummary) -> TableResult<()> {
    let ship_date = table.require_column("Ship Date")?;
    let failed = parse_date_column(table, ship_date);
    if failed > 0 {
        summary.unparsable_dates += failed;
        summary.finding(format!("Ship Date: {} unparsable value(s) set to null", failed));
    }

    impute(table, summary);

    let mode = table.require_column("Ship Mode")?;
    let replaced = normalize_enum(table, mode, &VALID_SHIP_MODES);
    if replaced > 0 {
        summary.out_of_enum += replaced;
        summary.finding(format!(
            "Ship Mode: {} value(s) outside enum replaced with {}",
            replaced, UNKNOWN
        ));
    }

    let days = table.require_column("Delivery Days")?;
    coerce_int_column(table, days);
    summary.clamped += clamp_min(table, days, 0.0);

    let cost = table.require_column("Shipping Cost")?;
    coerce_float_column(table, cost);
    summary.clamped += clamp_min(table, cost, 0.0);
    Ok(())
}

fn clean_products(table: &mut Table, summary: &mut CleanSummary) -> TableResult<()> {
    impute(table, summary);

    for col in ["Product Name", "Category", "Sub-Category"] {
        let idx = table.require_column(col)?;
        trim_column(table, idx);
        title_case_column(table, idx);
    }
    Ok(())
}

fn clean_sales(table: &mut Table, summary: &mut CleanSummary) -> TableResult<()> {
    let order_date = table.require_column("Order Date")?;
    let failed = parse_date_column(table, order_date);
    if failed > 0 {
        summary.unparsable_dates += failed;
        summary.finding(format!(
            "Order Date: {} unparsable value(s) set to null",
            failed
        ));
    }

    impute(table, summary);

    for col in ["Sales", "Profit", "Discount", "Shipping Cost"] {
        let idx = table.require_column(col)?;
        coerce_float_column(table, idx);
        summary.clamped += clamp_min(table, idx, 0.0);
    }
    let qty = table.require_column("Quantity")?;
    coerce_int_column(table, qty);
    summary.clamped += clamp_min(table, qty, 0.0);

    // Logical consistency: profit above sales is suspicious but not wrong
    // enough to reject the row.
    let sales = table.require_column("Sales")?;
    let profit = table.require_column("Profit")?;
    let inconsistent = table
        .rows
        .iter()
        .filter(|row| match (row[profit].as_f64(), row[sales].as_f64()) {
            (Some(p), Some(s)) => p > s,
            _ => false,
        })
        .count();
    if inconsistent > 0 {
        warn!(
            "sales: {} row(s) with Profit > Sales (kept, flagged)",
            inconsistent
        );
        summary.finding(format!("{} row(s) with Profit > Sales", inconsistent));
    }
    Ok(())
}

fn clean_time(table: &mut Table, summary: &mut CleanSummary) -> TableResult<()> {
    let order_date = table.require_column("Order Date")?;
    let failed = parse_date_column(table, order_date);
    if failed > 0 {
        summary.unparsable_dates += failed;
        summary.finding(format!(
            "Order Date: {} unparsable value(s) set to null",
            failed
        ));
    }

    impute(table, summary);

    let year = table.require_column("order year")?;
    coerce_int_column(table, year);
    let month = table.require_column("order month")?;
    coerce_int_column(table, month);
    summary.clamped += clamp_range_int(table, month, 1, 12);
    Ok(())
}

// =============================================================================
// Generic Imputation
// =============================================================================

/// Fill missing values in every non-date column.
///
/// Text columns take the column mode; numeric columns take the median when
/// the skewness exceeds 1, otherwise the mean. Date columns are left alone.
fn impute(table: &mut Table, summary: &mut CleanSummary) {
    for idx in 0..table.columns.len() {
        let nulls = table.null_count(idx);
        summary
            .nulls_before
            .push((table.columns[idx].clone(), nulls));
        if nulls == 0 {
            continue;
        }
        if table.column_cells(idx).any(|c| c.as_date().is_some()) {
            continue;
        }

        let fill = column_fill_value(table, idx);
        if let Some(fill) = fill {
            for row in &mut table.rows {
                if row[idx].is_null() {
                    row[idx] = fill.clone();
                    summary.imputed_cells += 1;
                }
            }
        }
    }
}

/// Pick the fill value for one column, or `None` when the column has no
/// observed values at all.
fn column_fill_value(table: &Table, idx: usize) -> Option<Cell> {
    let numeric: Vec<f64> = table.column_cells(idx).filter_map(Cell::as_f64).collect();
    let non_null = table.len() - table.null_count(idx);

    if non_null > 0 && numeric.len() == non_null {
        let skewed = stats::skewness(&numeric).map(|s| s > 1.0).unwrap_or(false);
        let fill = if skewed {
            stats::median(&numeric)?
        } else {
            stats::mean(&numeric)?
        };
        // Keep integer columns integral when the fill value allows it.
        let all_int = table
            .column_cells(idx)
            .all(|c| matches!(c, Cell::Int(_) | Cell::Null));
        if all_int && fill.fract() == 0.0 {
            Some(Cell::Int(fill as i64))
        } else {
            Some(Cell::Float(fill))
        }
    } else {
        let mode = stats::mode(table.column_cells(idx).filter_map(Cell::as_str))?;
        Some(Cell::Text(mode))
    }
}

// =============================================================================
// Column Operations
// =============================================================================

/// Re-type columns whose non-null values all parse as numbers.
fn infer_numeric_columns(table: &mut Table) {
    for idx in 0..table.columns.len() {
        let mut all_int = true;
        let mut all_float = true;
        let mut any = false;

        for cell in table.column_cells(idx) {
            if let Some(s) = cell.as_str() {
                any = true;
                if s.parse::<i64>().is_err() {
                    all_int = false;
                }
                // "NaN"/"inf" parse as f64 but are not usable measures
                if !s.parse::<f64>().map(f64::is_finite).unwrap_or(false) {
                    all_float = false;
                }
            } else if !cell.is_null() {
                all_int = false;
                all_float = false;
            }
        }
        if !any || (!all_int && !all_float) {
            continue;
        }

        for row in &mut table.rows {
            if let Some(s) = row[idx].as_str() {
                row[idx] = if all_int {
                    Cell::Int(s.parse().unwrap_or_default())
                } else {
                    Cell::Float(s.parse().unwrap_or_default())
                };
            }
        }
    }
}

/// Parse a text column as `DD-MM-YYYY` dates; unparsable values (including
/// impossible calendar dates) become null. Returns the failure count.
fn parse_date_column(table: &mut Table, idx: usize) -> usize {
    let mut failed = 0;
    for row in &mut table.rows {
        let parsed = match &row[idx] {
            Cell::Text(s) => match NaiveDate::parse_from_str(s.trim(), RAW_DATE_FORMAT) {
                Ok(d) => Some(Cell::Date(d)),
                Err(_) => {
                    failed += 1;
                    Some(Cell::Null)
                }
            },
            _ => None,
        };
        if let Some(cell) = parsed {
            row[idx] = cell;
        }
    }
    failed
}

/// Coerce a column to floats; values that are not finite numbers become
/// null. A textual `NaN` or `inf` would otherwise slip past both the clamp
/// and the downstream null checks.
fn coerce_float_column(table: &mut Table, idx: usize) {
    for row in &mut table.rows {
        row[idx] = match &row[idx] {
            Cell::Int(i) => Cell::Float(*i as f64),
            Cell::Float(f) if f.is_finite() => Cell::Float(*f),
            Cell::Text(s) => match s.trim().parse::<f64>() {
                Ok(f) if f.is_finite() => Cell::Float(f),
                _ => Cell::Null,
            },
            _ => Cell::Null,
        };
    }
}

/// Coerce a column to integers (rounding fractional values); values that
/// are not finite numbers become null.
fn coerce_int_column(table: &mut Table, idx: usize) {
    for row in &mut table.rows {
        row[idx] = match &row[idx] {
            Cell::Int(i) => Cell::Int(*i),
            Cell::Float(f) if f.is_finite() => Cell::Int(f.round() as i64),
            Cell::Text(s) => {
                let s = s.trim();
                if let Ok(i) = s.parse::<i64>() {
                    Cell::Int(i)
                } else {
                    match s.parse::<f64>() {
                        Ok(f) if f.is_finite() => Cell::Int(f.round() as i64),
                        _ => Cell::Null,
                    }
                }
            }
            _ => Cell::Null,
        };
    }
}

/// Clamp numeric values below `min` up to `min`. Nulls are untouched.
/// Returns the number of clamped cells; clamping is idempotent.
fn clamp_min(table: &mut Table, idx: usize, min: f64) -> usize {
    let mut clamped = 0;
    for row in &mut table.rows {
        match &row[idx] {
            Cell::Int(i) if (*i as f64) < min => {
                row[idx] = Cell::Int(min as i64);
                clamped += 1;
            }
            Cell::Float(f) if *f < min => {
                row[idx] = Cell::Float(min);
                clamped += 1;
            }
            _ => {}
        }
    }
    clamped
}

/// Clamp an integer column into `[lo, hi]`. Returns the clamped count.
fn clamp_range_int(table: &mut Table, idx: usize, lo: i64, hi: i64) -> usize {
    let mut clamped = 0;
    for row in &mut table.rows {
        if let Cell::Int(i) = row[idx] {
            let c = i.clamp(lo, hi);
            if c != i {
                row[idx] = Cell::Int(c);
                clamped += 1;
            }
        }
    }
    clamped
}

/// Replace text values outside `allowed` with [`UNKNOWN`].
/// Returns the replacement count.
fn normalize_enum(table: &mut Table, idx: usize, allowed: &[&str]) -> usize {
    let mut replaced = 0;
    for row in &mut table.rows {
        if let Cell::Text(s) = &row[idx] {
            if !allowed.contains(&s.as_str()) && s != UNKNOWN {
                row[idx] = Cell::Text(UNKNOWN.to_string());
                replaced += 1;
            }
        }
    }
    replaced
}

fn trim_column(table: &mut Table, idx: usize) {
    for row in &mut table.rows {
        if let Cell::Text(s) = &row[idx] {
            let trimmed = s.trim();
            if trimmed.len() != s.len() {
                row[idx] = Cell::Text(trimmed.to_string());
            }
        }
    }
}

fn uppercase_column(table: &mut Table, idx: usize) {
    for row in &mut table.rows {
        if let Cell::Text(s) = &row[idx] {
            row[idx] = Cell::Text(s.to_uppercase());
        }
    }
}

fn title_case_column(table: &mut Table, idx: usize) {
    for row in &mut table.rows {
        if let Cell::Text(s) = &row[idx] {
            row[idx] = Cell::Text(title_case(s.trim()));
        }
    }
}

/// Title-case: the first letter of every alphabetic run is uppercased, the
/// rest lowercased ("o'brien-smith" -> "O'Brien-Smith").
pub fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_alpha = false;
    for c in s.chars() {
        if c.is_alphabetic() {
            if prev_alpha {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_alpha = true;
        } else {
            out.push(c);
            prev_alpha = false;
        }
    }
    out
}
