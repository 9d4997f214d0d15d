//! # Document loader
//!
//! Decodes uploaded tabular files into rows with named columns. CSV files go
//! through the `csv` crate; XLSX workbooks through `calamine`, reading the first
//! worksheet. In both cases the first row holds the column names.

use std::fmt;
use std::io::Cursor;
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use calamine::{Data, Reader, Xlsx};
use log::debug;

use crate::error::{AnalyticsError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Csv,
    Xlsx,
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileKind::Csv => f.write_str("csv"),
            FileKind::Xlsx => f.write_str("xlsx"),
        }
    }
}

impl FromStr for FileKind {
    type Err = AnalyticsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "csv" => Ok(FileKind::Csv),
            "xlsx" => Ok(FileKind::Xlsx),
            other => Err(AnalyticsError::validation("fileType", format!("Unsupported file type '{}'.", other))),
        }
    }
}

/// Rows of optional cells under named columns, in file order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl Table {
    /// Non-blank cells of one column, in row order.
    pub fn text_column(&self, name: &str) -> Result<Vec<String>> {
        let idx = self
            .columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| AnalyticsError::validation("column", format!("Column '{}' not found in dataset.", name)))?;

        let texts: Vec<String> = self
            .rows
            .iter()
            .filter_map(|row| row.get(idx).cloned().flatten())
            .filter(|cell| !cell.trim().is_empty())
            .collect();
        if texts.is_empty() {
            return Err(AnalyticsError::Data("No valid rows in dataset.".into()));
        }
        Ok(texts)
    }
}

pub trait DocumentLoader {
    fn load(&self, bytes: &[u8], kind: FileKind) -> Result<Table>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TabularLoader;

impl TabularLoader {
    fn load_csv(bytes: &[u8]) -> Result<Table> {
        let mut reader = csv::ReaderBuilder::new().has_headers(true).from_reader(bytes);
        let columns: Vec<String> = reader
            .headers()
            .map_err(|e| AnalyticsError::Load(e.to_string()))?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| AnalyticsError::Load(e.to_string()))?;
            rows.push(record.iter().map(|cell| (!cell.is_empty()).then(|| cell.to_string())).collect());
        }
        Ok(Table { columns, rows })
    }

    fn load_xlsx(bytes: &[u8]) -> Result<Table> {
        let mut workbook: Xlsx<_> =
            Xlsx::new(Cursor::new(bytes)).map_err(|e| AnalyticsError::Load(e.to_string()))?;
        let range = workbook
            .worksheet_range_at(0)
            .ok_or_else(|| AnalyticsError::Load("workbook has no worksheets".into()))?
            .map_err(|e| AnalyticsError::Load(e.to_string()))?;

        let mut lines = range.rows();
        let columns: Vec<String> = match lines.next() {
            Some(header) => header.iter().map(|cell| cell.to_string().trim().to_string()).collect(),
            None => return Ok(Table::default()),
        };
        let rows = lines.map(|line| line.iter().map(cell_text).collect()).collect();
        Ok(Table { columns, rows })
    }
}

fn cell_text(cell: &Data) -> Option<String> {
    match cell {
        Data::Empty => None,
        Data::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

impl DocumentLoader for TabularLoader {
    fn load(&self, bytes: &[u8], kind: FileKind) -> Result<Table> {
        let table = match kind {
            FileKind::Csv => Self::load_csv(bytes)?,
            FileKind::Xlsx => Self::load_xlsx(bytes)?,
        };
        debug!("Loaded {} rows x {} columns from {}", table.rows.len(), table.columns.len(), kind);
        Ok(table)
    }
}

/// Decode the request's base64 payload. A `data:...;base64,` prefix is accepted.
pub fn decode_payload(data: &str) -> Result<Vec<u8>> {
    let trimmed = data.trim();
    let body = match trimmed.split_once(";base64,") {
        Some((prefix, rest)) if prefix.starts_with("data:") => rest,
        _ => trimmed,
    };
    STANDARD
        .decode(body)
        .map_err(|e| AnalyticsError::validation("data", format!("Invalid base64 data: {}", e)))
}
