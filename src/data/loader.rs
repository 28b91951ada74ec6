//! Decoding uploaded files into datasets

use std::collections::HashMap;
use std::io::Cursor;
use std::path::Path;

use calamine::{open_workbook_auto_from_rs, Data, Reader};
use polars::prelude::*;
use tracing::debug;

use super::Dataset;
use crate::error::{HybridError, Result};

/// Rows used by the CSV reader to infer column types
const CSV_INFER_SCHEMA_ROWS: usize = 1000;

/// Accepted upload formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Csv,
    Excel,
}

impl FileFormat {
    /// Pick a format from the file extension (case-insensitive)
    pub fn from_filename(file_name: &str) -> Result<Self> {
        let lower = file_name.to_lowercase();
        if lower.ends_with(".csv") {
            Ok(FileFormat::Csv)
        } else if lower.ends_with(".xlsx") || lower.ends_with(".xls") {
            Ok(FileFormat::Excel)
        } else {
            Err(HybridError::UnsupportedFormat(file_name.to_string()))
        }
    }
}

/// Decode raw upload bytes according to the file name's extension
pub fn load_bytes(file_name: &str, bytes: &[u8]) -> Result<Dataset> {
    let format = FileFormat::from_filename(file_name)?;
    let frame = match format {
        FileFormat::Csv => read_csv(bytes)?,
        FileFormat::Excel => read_excel(bytes)?,
    };
    debug!(
        file = %file_name,
        rows = frame.height(),
        columns = frame.width(),
        "Decoded upload"
    );
    Dataset::new(frame)
}

/// Read a dataset from disk
pub fn load_path(path: &Path) -> Result<Dataset> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    // Reject unknown extensions before touching the file
    FileFormat::from_filename(&file_name)?;
    let bytes = std::fs::read(path)?;
    load_bytes(&file_name, &bytes)
}

fn read_csv(bytes: &[u8]) -> Result<DataFrame> {
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(CSV_INFER_SCHEMA_ROWS))
        .into_reader_with_file_handle(Cursor::new(bytes))
        .finish()?;
    Ok(df)
}

/// First worksheet, first row as header
fn read_excel(bytes: &[u8]) -> Result<DataFrame> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| HybridError::Data("Workbook contains no worksheets".to_string()))??;

    let mut rows = range.rows();
    let header = rows.next().ok_or(HybridError::EmptyDataset)?;
    let names = header_names(header);
    let body: Vec<&[Data]> = rows.collect();

    let columns: Vec<Column> = names
        .iter()
        .enumerate()
        .map(|(j, name)| {
            let cells: Vec<&Data> = body
                .iter()
                .map(|row| row.get(j).unwrap_or(&Data::Empty))
                .collect();
            excel_column(name, &cells)
        })
        .collect();

    Ok(DataFrame::new(columns)?)
}

/// Header cells as unique column names. Blank headers get a positional name
/// and repeats get a `.n` suffix.
fn header_names(header: &[Data]) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    header
        .iter()
        .enumerate()
        .map(|(i, cell)| {
            let base = cell_text(cell)
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| format!("column_{}", i));
            let count = seen.entry(base.clone()).or_insert(0);
            let name = if *count == 0 {
                base.clone()
            } else {
                format!("{}.{}", base, count)
            };
            *count += 1;
            name
        })
        .collect()
}

/// A column is numeric only when every non-empty cell is a number
fn excel_column(name: &str, cells: &[&Data]) -> Column {
    let numeric = cells.iter().all(|c| {
        matches!(c, Data::Int(_) | Data::Float(_) | Data::Empty | Data::Error(_))
    });

    if numeric {
        let values: Vec<Option<f64>> = cells
            .iter()
            .map(|c| match c {
                Data::Int(i) => Some(*i as f64),
                Data::Float(f) => Some(*f),
                _ => None,
            })
            .collect();
        Series::new(name.into(), values).into()
    } else {
        let values: Vec<Option<String>> = cells.iter().map(|c| cell_text(c)).collect();
        Series::new(name.into(), values).into()
    }
}

fn cell_text(cell: &Data) -> Option<String> {
    match cell {
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => Some(s.clone()),
        Data::Int(i) => Some(i.to_string()),
        Data::Float(f) => Some(super::format_number(*f)),
        Data::Bool(b) => Some(b.to_string()),
        Data::DateTime(dt) => Some(dt.as_f64().to_string()),
        _ => None,
    }
}
