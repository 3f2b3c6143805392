//! Raw source readers and the extract stage.
//!
//! Retail exports arrive as delimited text in whatever encoding the upstream
//! system produced, so reading goes through encoding auto-detection
//! (chardet + encoding_rs) and delimiter auto-detection before CSV parsing.
//!
//! Each source kind has a fixed, hand-specified set of required columns; a
//! missing column is a hard error (unlike missing *values*, which the
//! cleaning stage handles). The extract stage persists an untouched copy of
//! every source into the staging directory as the first hand-off.

use log::info;
use std::path::{Path, PathBuf};

use crate::error::{SourceError, SourceResult};
use crate::table::Table;

// =============================================================================
// Source Kinds
// =============================================================================

/// The five raw source tables the pipeline consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Customers,
    Products,
    Sales,
    Shipping,
    Time,
}

impl SourceKind {
    /// All kinds, in extraction order.
    pub const ALL: [SourceKind; 5] = [
        SourceKind::Products,
        SourceKind::Sales,
        SourceKind::Time,
        SourceKind::Customers,
        SourceKind::Shipping,
    ];

    /// Short name used in logs and table names.
    pub fn name(&self) -> &'static str {
        match self {
            SourceKind::Customers => "customers",
            SourceKind::Products => "products",
            SourceKind::Sales => "sales",
            SourceKind::Shipping => "shipping",
            SourceKind::Time => "time",
        }
    }

    /// File name expected in the raw data directory.
    pub fn raw_file_name(&self) -> &'static str {
        match self {
            SourceKind::Customers => "customer_data.csv",
            SourceKind::Products => "inventory_data.csv",
            SourceKind::Sales => "sales_data.csv",
            SourceKind::Shipping => "shipping_data.csv",
            SourceKind::Time => "time_data.csv",
        }
    }

    /// File name written to the staging directory.
    pub fn staged_file_name(&self) -> String {
        format!("{}_raw.csv", self.name())
    }

    /// File name written to the processed directory after cleaning.
    pub fn cleaned_file_name(&self) -> String {
        format!("{}_cleaned.csv", self.name())
    }

    /// Required columns for this source, exactly as the upstream exports
    /// name them.
    pub fn required_columns(&self) -> &'static [&'static str] {
        match self {
            SourceKind::Customers => &[
                "Customer ID",
                "Customer Name",
                "Segment",
                "City",
                "State",
                "Country",
                "Region",
            ],
            SourceKind::Products => &["Product ID", "Product Name", "Category", "Sub-Category"],
            SourceKind::Sales => &[
                "Order ID",
                "Product ID",
                "Customer ID",
                "Order Date",
                "Sales",
                "Profit",
                "Quantity",
                "Discount",
                "Shipping Cost",
            ],
            SourceKind::Shipping => &[
                "Order ID",
                "Ship Date",
                "Ship Mode",
                "Delivery Days",
                "Shipping Cost",
            ],
            SourceKind::Time => &["Order Date", "order year", "order month"],
        }
    }
}

// =============================================================================
// Encoding & Delimiter Detection
// =============================================================================

/// Detect the encoding of raw bytes using chardet.
pub fn detect_encoding(bytes: &[u8]) -> String {
    let result = chardet::detect(bytes);
    let charset = result.0;

    // Normalize charset names
    match charset.to_lowercase().as_str() {
        "ascii" | "utf-8" | "utf8" => "utf-8".to_string(),
        "iso-8859-1" | "iso-8859-15" | "latin-1" | "latin1" => "iso-8859-1".to_string(),
        "windows-1252" | "cp1252" => "windows-1252".to_string(),
        _ => charset,
    }
}

/// Decode bytes to a string using the detected encoding.
pub fn decode_content(bytes: &[u8], encoding: &str) -> String {
    match encoding.to_lowercase().as_str() {
        "iso-8859-1" | "latin-1" | "latin1" => encoding_rs::ISO_8859_15.decode(bytes).0.to_string(),
        "windows-1252" | "cp1252" => encoding_rs::WINDOWS_1252.decode(bytes).0.to_string(),
        // Fallback: UTF-8 with lossy conversion
        _ => String::from_utf8_lossy(bytes).to_string(),
    }
}

/// Detect the delimiter by counting occurrences in the first line.
pub fn detect_delimiter(content: &str) -> u8 {
    let first_line = content.lines().next().unwrap_or("");

    let separators = [b',', b';', b'\t', b'|'];
    let mut best_sep = b',';
    let mut best_count = 0;

    for &sep in &separators {
        let count = first_line.matches(sep as char).count();
        if count > best_count {
            best_count = count;
            best_sep = sep;
        }
    }

    best_sep
}

// =============================================================================
// Reading
// =============================================================================

/// Read one raw source file with encoding and delimiter auto-detection,
/// then verify the kind's required columns are all present.
pub fn read_source(kind: SourceKind, path: &Path) -> SourceResult<Table> {
    let bytes = std::fs::read(path)?;
    if bytes.is_empty() {
        return Err(SourceError::EmptyFile(path.display().to_string()));
    }

    let encoding = detect_encoding(&bytes);
    let content = decode_content(&bytes, &encoding);
    let delimiter = detect_delimiter(&content);
    info!(
        "{}: encoding {}, delimiter '{}'",
        kind.name(),
        encoding,
        (delimiter as char).escape_default()
    );

    let table = Table::read_csv_str(kind.name(), &content, delimiter)?;
    for col in kind.required_columns() {
        table.require_column(col).map_err(SourceError::Table)?;
    }
    Ok(table)
}

/// Read a previously staged or cleaned copy (plain UTF-8 CSV written by the
/// pipeline itself), re-checking the required columns.
pub fn read_staged(kind: SourceKind, path: &Path) -> SourceResult<Table> {
    let table = Table::read_csv(kind.name(), path).map_err(SourceError::Table)?;
    for col in kind.required_columns() {
        table.require_column(col).map_err(SourceError::Table)?;
    }
    Ok(table)
}

// =============================================================================
// Extract Stage
// =============================================================================

/// Extract all raw sources into the staging directory.
///
/// Raw files are read with auto-detection and persisted as UTF-8 CSV copies;
/// no values are changed. Returns the extracted tables in [`SourceKind::ALL`]
/// order.
pub fn extract_all(raw_dir: &Path, staging_dir: &Path) -> SourceResult<Vec<(SourceKind, Table)>> {
    std::fs::create_dir_all(staging_dir)?;

    let mut extracted = Vec::with_capacity(SourceKind::ALL.len());
    for kind in SourceKind::ALL {
        let raw_path = raw_dir.join(kind.raw_file_name());
        let table = read_source(kind, &raw_path)?;

        let staged_path = staging_dir.join(kind.staged_file_name());
        table.write_csv(&staged_path).map_err(SourceError::Table)?;
        info!(
            "staged {} rows of {} to {}",
            table.len(),
            kind.name(),
            staged_path.display()
        );
        extracted.push((kind, table));
    }
    Ok(extracted)
}

/// Path of one staged source file.
pub fn staged_path(staging_dir: &Path, kind: SourceKind) -> PathBuf {
    staging_dir.join(kind.staged_file_name())
}

/// Path of one cleaned source file.
pub fn cleaned_path(processed_dir: &Path, kind: SourceKind) -> PathBuf {
    processed_dir.join(kind.cleaned_file_name())
}
