//! In-memory tabular representation shared by every pipeline stage.
//!
//! A [`Table`] is an ordered sequence of rows over named columns, where each
//! cell is a typed [`Cell`]. Tables are the hand-off contract between stages:
//! each stage reads its input tables, produces new ones, and persists them as
//! CSV (dates as `YYYY-MM-DD`, nulls as empty fields).
//!
//! Raw files are read untyped (every non-empty cell is [`Cell::Text`]); the
//! validator re-reads persisted output through a declared [`ColumnType`]
//! schema so type conformance can be checked independently.

use chrono::NaiveDate;
use std::collections::HashSet;
use std::path::Path;

use crate::error::{TableError, TableResult};

/// Date format used for all persisted calendar dates.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

// =============================================================================
// Cell
// =============================================================================

/// A single typed value in a table.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    /// Missing value.
    Null,
    /// Free text or categorical value.
    Text(String),
    /// Integer count (quantity, delivery days, year, month).
    Int(i64),
    /// Decimal measure (sales, profit, discount, shipping cost).
    Float(f64),
    /// Calendar date.
    Date(NaiveDate),
}

impl Cell {
    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }

    /// Text content, if this is a text cell.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Cell::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric value, widening integers to floats.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Int(i) => Some(*i as f64),
            Cell::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Cell::Date(d) => Some(*d),
            _ => None,
        }
    }

    /// Canonical string form, used for CSV persistence and as a join key.
    /// Null renders as the empty string.
    pub fn canonical(&self) -> String {
        match self {
            Cell::Null => String::new(),
            Cell::Text(s) => s.clone(),
            Cell::Int(i) => i.to_string(),
            Cell::Float(f) => f.to_string(),
            Cell::Date(d) => d.format(DATE_FORMAT).to_string(),
        }
    }

    /// Parse a persisted CSV field as the given type.
    ///
    /// Empty fields are null regardless of type. Returns `None` when the
    /// field does not parse as the requested type; non-finite floats
    /// (`NaN`, infinities) do not parse, so they can never reach a measure
    /// column unnoticed.
    pub fn parse(field: &str, ty: ColumnType) -> Option<Cell> {
        let field = field.trim();
        if field.is_empty() {
            return Some(Cell::Null);
        }
        match ty {
            ColumnType::Text => Some(Cell::Text(field.to_string())),
            ColumnType::Int => field.parse::<i64>().ok().map(Cell::Int),
            ColumnType::Float => field
                .parse::<f64>()
                .ok()
                .filter(|f| f.is_finite())
                .map(Cell::Float),
            ColumnType::Date => NaiveDate::parse_from_str(field, DATE_FORMAT)
                .ok()
                .map(Cell::Date),
        }
    }
}

impl std::fmt::Display for Cell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.canonical())
    }
}

// =============================================================================
// Column Types
// =============================================================================

/// Declared type of a persisted column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Text,
    Int,
    Float,
    Date,
}

impl ColumnType {
    pub fn name(&self) -> &'static str {
        match self {
            ColumnType::Text => "text",
            ColumnType::Int => "integer",
            ColumnType::Float => "float",
            ColumnType::Date => "date",
        }
    }
}

// =============================================================================
// Table
// =============================================================================

/// An ordered sequence of uniformly-shaped rows over named columns.
#[derive(Debug, Clone)]
pub struct Table {
    /// Table name, used in diagnostics and error messages.
    pub name: String,
    /// Column headers, in order.
    pub columns: Vec<String>,
    /// Rows; every row has exactly `columns.len()` cells.
    pub rows: Vec<Vec<Cell>>,
}

impl Table {
    pub fn new(name: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            name: name.into(),
            columns,
            rows: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Append a row. The row must match the column count.
    pub fn push_row(&mut self, row: Vec<Cell>) {
        debug_assert_eq!(row.len(), self.columns.len());
        self.rows.push(row);
    }

    /// Index of a column by name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Index of a column, or a `MissingColumn` error naming this table.
    pub fn require_column(&self, name: &str) -> TableResult<usize> {
        self.column_index(name)
            .ok_or_else(|| TableError::MissingColumn {
                table: self.name.clone(),
                column: name.to_string(),
            })
    }

    /// Iterate the cells of one column.
    pub fn column_cells(&self, idx: usize) -> impl Iterator<Item = &Cell> {
        self.rows.iter().map(move |r| &r[idx])
    }

    /// Number of null cells in one column.
    pub fn null_count(&self, idx: usize) -> usize {
        self.column_cells(idx).filter(|c| c.is_null()).count()
    }

    /// Project a subset of columns into a new table, preserving row order.
    pub fn project(&self, name: impl Into<String>, columns: &[&str]) -> TableResult<Table> {
        let indices: Vec<usize> = columns
            .iter()
            .map(|c| self.require_column(c))
            .collect::<TableResult<_>>()?;

        let mut out = Table::new(name, columns.iter().map(|c| c.to_string()).collect());
        for row in &self.rows {
            out.push_row(indices.iter().map(|&i| row[i].clone()).collect());
        }
        Ok(out)
    }

    /// Deduplicate on a single key column; the first occurrence wins and
    /// insertion order is preserved.
    pub fn dedup_by_key(&mut self, key_idx: usize) {
        let mut seen = HashSet::new();
        self.rows.retain(|row| seen.insert(row[key_idx].canonical()));
    }

    /// Deduplicate exact duplicate rows (full-row comparison); the first
    /// occurrence wins.
    pub fn dedup_full_rows(&mut self) {
        let mut seen = HashSet::new();
        self.rows.retain(|row| {
            let key: Vec<String> = row.iter().map(Cell::canonical).collect();
            seen.insert(key)
        });
    }

    /// Drop rows for which the predicate returns false.
    pub fn retain_rows<F: FnMut(&[Cell]) -> bool>(&mut self, mut pred: F) {
        self.rows.retain(|row| pred(row));
    }

    // -------------------------------------------------------------------------
    // CSV persistence
    // -------------------------------------------------------------------------

    /// Read a CSV file untyped: every non-empty field becomes `Cell::Text`
    /// (whitespace-trimmed), empty fields become `Cell::Null`.
    pub fn read_csv(name: impl Into<String>, path: &Path) -> TableResult<Table> {
        let name = name.into();
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(path)?;

        let columns: Vec<String> = reader
            .headers()?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();
        if columns.is_empty() {
            return Err(TableError::NoHeaders(path.display().to_string()));
        }

        let mut table = Table::new(name, columns);
        for record in reader.records() {
            let record = record?;
            let row: Vec<Cell> = (0..table.columns.len())
                .map(|i| {
                    let field = record.get(i).unwrap_or("").trim();
                    if field.is_empty() {
                        Cell::Null
                    } else {
                        Cell::Text(field.to_string())
                    }
                })
                .collect();
            table.rows.push(row);
        }
        Ok(table)
    }

    /// Parse CSV content from a string, untyped (used for raw sources after
    /// encoding detection has produced a decoded string).
    pub fn read_csv_str(
        name: impl Into<String>,
        content: &str,
        delimiter: u8,
    ) -> TableResult<Table> {
        let name = name.into();
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .flexible(true)
            .from_reader(content.as_bytes());

        let columns: Vec<String> = reader
            .headers()?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();
        if columns.is_empty() || columns.iter().all(|c| c.is_empty()) {
            return Err(TableError::NoHeaders(name));
        }

        let mut table = Table::new(name, columns);
        for record in reader.records() {
            let record = record?;
            let row: Vec<Cell> = (0..table.columns.len())
                .map(|i| {
                    let field = record.get(i).unwrap_or("").trim();
                    if field.is_empty() {
                        Cell::Null
                    } else {
                        Cell::Text(field.to_string())
                    }
                })
                .collect();
            table.rows.push(row);
        }
        Ok(table)
    }

    /// Read a CSV file through a declared schema, parsing each field as its
    /// column's type. A field that fails to parse is a `TypeError`.
    pub fn read_csv_typed(
        name: impl Into<String>,
        path: &Path,
        schema: &[(&str, ColumnType)],
    ) -> TableResult<Table> {
        let name = name.into();
        let mut reader = csv::ReaderBuilder::new().from_path(path)?;

        let columns: Vec<String> = reader
            .headers()?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        // Every declared column must be present; extra columns are an
        // upstream bug and surface as MissingColumn on projection later.
        let mut indices = Vec::with_capacity(schema.len());
        for (col, _) in schema {
            let idx = columns.iter().position(|c| c == col).ok_or_else(|| {
                TableError::MissingColumn {
                    table: name.clone(),
                    column: col.to_string(),
                }
            })?;
            indices.push(idx);
        }

        let mut table = Table::new(
            name.clone(),
            schema.iter().map(|(c, _)| c.to_string()).collect(),
        );
        for record in reader.records() {
            let record = record?;
            let mut row = Vec::with_capacity(schema.len());
            for (slot, (col, ty)) in indices.iter().zip(schema) {
                let field = record.get(*slot).unwrap_or("");
                let cell = Cell::parse(field, *ty).ok_or_else(|| TableError::TypeError {
                    table: name.clone(),
                    column: col.to_string(),
                    value: field.to_string(),
                    expected: ty.name(),
                })?;
                row.push(cell);
            }
            table.rows.push(row);
        }
        Ok(table)
    }

    /// Write the table as CSV. Dates render as `YYYY-MM-DD`, nulls as empty
    /// fields.
    pub fn write_csv(&self, path: &Path) -> TableResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record(&self.columns)?;
        for row in &self.rows {
            writer.write_record(row.iter().map(Cell::canonical))?;
        }
        writer.flush().map_err(TableError::IoError)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_table() -> Table {
        let mut t = Table::new("orders", vec!["id".into(), "amount".into()]);
        t.push_row(vec![Cell::Text("A".into()), Cell::Float(10.0)]);
        t.push_row(vec![Cell::Text("B".into()), Cell::Float(20.0)]);
        t.push_row(vec![Cell::Text("A".into()), Cell::Float(30.0)]);
        t
    }

    #[test]
    fn test_cell_parse_types() {
        assert_eq!(
            Cell::parse("42", ColumnType::Int),
            Some(Cell::Int(42))
        );
        assert_eq!(
            Cell::parse("1.5", ColumnType::Float),
            Some(Cell::Float(1.5))
        );
        assert_eq!(
            Cell::parse("2024-03-15", ColumnType::Date),
            Some(Cell::Date(NaiveDate::from_ymd_opt(2024, 3, 15).unwrap()))
        );
        assert_eq!(Cell::parse("", ColumnType::Int), Some(Cell::Null));
        assert_eq!(Cell::parse("abc", ColumnType::Float), None);
    }

    #[test]
    fn test_cell_parse_rejects_non_finite_floats() {
        assert_eq!(Cell::parse("NaN", ColumnType::Float), None);
        assert_eq!(Cell::parse("nan", ColumnType::Float), None);
        assert_eq!(Cell::parse("inf", ColumnType::Float), None);
        assert_eq!(Cell::parse("-inf", ColumnType::Float), None);
    }

    #[test]
    fn test_canonical_roundtrip() {
        let date = Cell::Date(NaiveDate::from_ymd_opt(2024, 3, 15).unwrap());
        assert_eq!(date.canonical(), "2024-03-15");
        assert_eq!(Cell::parse(&date.canonical(), ColumnType::Date), Some(date));
        assert_eq!(Cell::Null.canonical(), "");
    }

    #[test]
    fn test_dedup_by_key_first_wins() {
        let mut t = sample_table();
        let idx = t.require_column("id").unwrap();
        t.dedup_by_key(idx);
        assert_eq!(t.len(), 2);
        // first "A" row (amount 10.0) survives
        assert_eq!(t.rows[0][1], Cell::Float(10.0));
    }

    #[test]
    fn test_dedup_full_rows() {
        let mut t = Table::new("t", vec!["a".into()]);
        t.push_row(vec![Cell::Int(1)]);
        t.push_row(vec![Cell::Int(1)]);
        t.push_row(vec![Cell::Int(2)]);
        t.dedup_full_rows();
        assert_eq!(t.len(), 2);
    }

    #[test]
    fn test_project() {
        let t = sample_table();
        let p = t.project("ids", &["id"]).unwrap();
        assert_eq!(p.columns, vec!["id"]);
        assert_eq!(p.len(), 3);

        let err = t.project("nope", &["missing"]).unwrap_err();
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn test_read_csv_str_nulls() {
        let csv = "a,b\n1,\n,2\n";
        let t = Table::read_csv_str("t", csv, b',').unwrap();
        assert_eq!(t.len(), 2);
        assert_eq!(t.rows[0][0], Cell::Text("1".into()));
        assert!(t.rows[0][1].is_null());
        assert!(t.rows[1][0].is_null());
    }

    #[test]
    fn test_csv_roundtrip_typed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.csv");

        let mut t = Table::new(
            "t",
            vec!["id".into(), "when".into(), "qty".into()],
        );
        t.push_row(vec![
            Cell::Text("X".into()),
            Cell::Date(NaiveDate::from_ymd_opt(2023, 1, 2).unwrap()),
            Cell::Int(4),
        ]);
        t.push_row(vec![Cell::Text("Y".into()), Cell::Null, Cell::Null]);
        t.write_csv(&path).unwrap();

        let back = Table::read_csv_typed(
            "t",
            &path,
            &[
                ("id", ColumnType::Text),
                ("when", ColumnType::Date),
                ("qty", ColumnType::Int),
            ],
        )
        .unwrap();
        assert_eq!(back.rows, t.rows);
    }

    #[test]
    fn test_read_csv_typed_rejects_bad_type() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.csv");
        std::fs::write(&path, "qty\nnot-a-number\n").unwrap();

        let err = Table::read_csv_typed("t", &path, &[("qty", ColumnType::Int)]).unwrap_err();
        assert!(matches!(err, TableError::TypeError { .. }));
    }
}
