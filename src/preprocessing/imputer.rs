//! Missing-value imputation
//!
//! Numeric columns are filled with their median and categorical columns with
//! their most frequent value. Non-finite numbers (`inf`, `NaN`) count as
//! missing.

use crate::data::ColumnValues;
use crate::profiling::stats;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Placeholder for categorical columns without any observed value
pub const UNKNOWN_CATEGORY: &str = "Unknown";

/// Fitted fill value for one column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FillValue {
    Numeric(f64),
    Categorical(String),
}

impl FillValue {
    /// Learn the fill value for a column
    pub fn fit(values: &ColumnValues) -> Self {
        match values {
            // An all-null column has no median; zero keeps the output dense
            ColumnValues::Numeric(v) => {
                let finite: Vec<Option<f64>> = v.iter().map(|x| finite(*x)).collect();
                FillValue::Numeric(stats::median(&finite).unwrap_or(0.0))
            }
            ColumnValues::Categorical(v) => FillValue::Categorical(
                mode(v).unwrap_or_else(|| UNKNOWN_CATEGORY.to_string()),
            ),
        }
    }

    pub fn fill_numeric(&self, values: &[Option<f64>]) -> Vec<f64> {
        let fill = match self {
            FillValue::Numeric(f) => *f,
            FillValue::Categorical(_) => 0.0,
        };
        values.iter().map(|v| finite(*v).unwrap_or(fill)).collect()
    }

    pub fn fill_categorical(&self, values: &[Option<String>]) -> Vec<String> {
        let fill = match self {
            FillValue::Categorical(s) => s.clone(),
            FillValue::Numeric(f) => crate::data::format_number(*f),
        };
        values
            .iter()
            .map(|v| v.clone().unwrap_or_else(|| fill.clone()))
            .collect()
    }
}

fn finite(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

/// Most frequent value; ties go to the value seen first
pub fn mode(values: &[Option<String>]) -> Option<String> {
    let mut counts: HashMap<&str, (usize, usize)> = HashMap::new();
    for (pos, v) in values.iter().enumerate() {
        if let Some(s) = v {
            let entry = counts.entry(s.as_str()).or_insert((0, pos));
            entry.0 += 1;
        }
    }
    counts
        .into_iter()
        .max_by(|a, b| a.1 .0.cmp(&b.1 .0).then(b.1 .1.cmp(&a.1 .1)))
        .map(|(s, _)| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(v: &[Option<&str>]) -> Vec<Option<String>> {
        v.iter().map(|s| s.map(str::to_string)).collect()
    }

    #[test]
    fn test_mode_tie_breaks_on_first_seen() {
        let v = strings(&[Some("b"), Some("a"), None, Some("a"), Some("b")]);
        assert_eq!(mode(&v).as_deref(), Some("b"));

        let v = strings(&[Some("x"), Some("y"), Some("y")]);
        assert_eq!(mode(&v).as_deref(), Some("y"));
    }

    #[test]
    fn test_categorical_fill() {
        let v = strings(&[Some("cat"), None, Some("dog"), Some("cat")]);
        let fill = FillValue::fit(&ColumnValues::Categorical(v.clone()));
        assert_eq!(fill, FillValue::Categorical("cat".to_string()));
        assert_eq!(fill.fill_categorical(&v), vec!["cat", "cat", "dog", "cat"]);
    }

    #[test]
    fn test_empty_categorical_uses_placeholder() {
        let fill = FillValue::fit(&ColumnValues::Categorical(vec![None, None]));
        assert_eq!(fill, FillValue::Categorical(UNKNOWN_CATEGORY.to_string()));
    }

    #[test]
    fn test_numeric_fill_uses_median() {
        let v = vec![Some(1.0), None, Some(10.0), Some(3.0)];
        let fill = FillValue::fit(&ColumnValues::Numeric(v.clone()));
        assert_eq!(fill, FillValue::Numeric(3.0));
        assert_eq!(fill.fill_numeric(&v), vec![1.0, 3.0, 10.0, 3.0]);
    }

    #[test]
    fn test_non_finite_numbers_are_imputed() {
        let v = vec![Some(2.0), Some(f64::INFINITY), Some(4.0), Some(f64::NAN), Some(f64::NEG_INFINITY), Some(9.0)];
        let fill = FillValue::fit(&ColumnValues::Numeric(v.clone()));
        assert_eq!(fill, FillValue::Numeric(4.0));
        assert_eq!(fill.fill_numeric(&v), vec![2.0, 4.0, 4.0, 4.0, 4.0, 9.0]);
    }

    #[test]
    fn test_all_missing_numeric_fills_zero() {
        let fill = FillValue::fit(&ColumnValues::Numeric(vec![None, None]));
        assert_eq!(fill, FillValue::Numeric(0.0));
    }
}
