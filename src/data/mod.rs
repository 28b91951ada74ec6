//! In-memory tabular datasets
//!
//! A [`Dataset`] wraps a polars `DataFrame` and exposes the column-level views
//! the profiler and preprocessor need: numeric columns as `Option<f64>` and
//! every other column as `Option<String>`.

mod loader;

pub use loader::{load_bytes, load_path, FileFormat};

use crate::error::{HybridError, Result};
use polars::prelude::*;

/// Typed view over one column's values
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValues {
    Numeric(Vec<Option<f64>>),
    Categorical(Vec<Option<String>>),
}

impl ColumnValues {
    pub fn len(&self) -> usize {
        match self {
            ColumnValues::Numeric(v) => v.len(),
            ColumnValues::Categorical(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn null_count(&self) -> usize {
        match self {
            ColumnValues::Numeric(v) => v.iter().filter(|x| x.is_none()).count(),
            ColumnValues::Categorical(v) => v.iter().filter(|x| x.is_none()).count(),
        }
    }

    /// Value at `row` rendered as a key usable for hashing and grouping.
    /// Nulls render as `None` so they compare equal to each other.
    pub fn key_at(&self, row: usize) -> Option<String> {
        match self {
            ColumnValues::Numeric(v) => v[row].map(format_number),
            ColumnValues::Categorical(v) => v[row].clone(),
        }
    }
}

/// Render a float the way it reads in a spreadsheet: integral values without
/// a fractional part.
pub fn format_number(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        format!("{}", v)
    }
}

/// A rectangular table with at least one row
#[derive(Debug, Clone)]
pub struct Dataset {
    frame: DataFrame,
}

impl Dataset {
    /// Wrap a frame, rejecting tables without rows or columns
    pub fn new(frame: DataFrame) -> Result<Self> {
        if frame.height() == 0 || frame.width() == 0 {
            return Err(HybridError::EmptyDataset);
        }
        Ok(Self { frame })
    }

    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    pub fn n_rows(&self) -> usize {
        self.frame.height()
    }

    pub fn n_cols(&self) -> usize {
        self.frame.width()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.frame
            .get_column_names()
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    /// Integer and float columns are numeric; everything else is categorical
    pub fn is_numeric(&self, name: &str) -> Result<bool> {
        let col = self.frame.column(name)?;
        Ok(col.dtype().is_numeric())
    }

    pub fn dtype_name(&self, name: &str) -> Result<String> {
        let col = self.frame.column(name)?;
        Ok(col.dtype().to_string())
    }

    /// Estimated in-memory size in bytes
    pub fn memory_usage(&self) -> usize {
        self.frame.estimated_size()
    }

    pub fn column_values(&self, name: &str) -> Result<ColumnValues> {
        let series = self.frame.column(name)?.as_materialized_series();

        if series.dtype().is_numeric() {
            let casted = series.cast(&DataType::Float64)?;
            let values = casted
                .f64()?
                .into_iter()
                .map(|v| v.filter(|x| !x.is_nan()))
                .collect();
            Ok(ColumnValues::Numeric(values))
        } else {
            let casted = series.cast(&DataType::String)?;
            let values = casted
                .str()?
                .into_iter()
                .map(|v| v.map(str::to_string))
                .collect();
            Ok(ColumnValues::Categorical(values))
        }
    }

    /// All columns in file order
    pub fn columns(&self) -> Result<Vec<(String, ColumnValues)>> {
        self.column_names()
            .into_iter()
            .map(|name| {
                let values = self.column_values(&name)?;
                Ok((name, values))
            })
            .collect()
    }
}
