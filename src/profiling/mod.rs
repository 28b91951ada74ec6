//! Dataset profiling
//!
//! Computes the read-only [`DatasetProfile`] for an uploaded table:
//! - shape, dtypes and missing-value statistics per column
//! - duplicate-row count
//! - numeric/categorical column partition
//! - target-column inference and classification detection
//! - class distribution, correlation matrix and descriptive statistics

pub mod stats;

pub use stats::DescriptiveStats;

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::data::{ColumnValues, Dataset};
use crate::error::{HybridError, Result};

/// Substrings that mark a column as the prediction target
pub const TARGET_HINTS: [&str; 3] = ["target", "label", "class"];

/// Below this many distinct values a numeric target is treated as classes
pub const DEFAULT_CLASSIFICATION_THRESHOLD: usize = 20;

pub type CorrelationMatrix = BTreeMap<String, BTreeMap<String, Option<f64>>>;

/// Read-only summary of a dataset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetProfile {
    pub shape: [usize; 2],
    pub columns: Vec<String>,
    pub dtypes: BTreeMap<String, String>,
    pub missing_values: BTreeMap<String, usize>,
    pub missing_percentage: BTreeMap<String, f64>,
    pub duplicate_rows: usize,
    pub memory_usage: usize,
    pub numeric_columns: Vec<String>,
    pub categorical_columns: Vec<String>,
    pub target_column: String,
    pub is_classification: bool,
    pub class_distribution: Option<BTreeMap<String, usize>>,
    pub correlation_matrix: Option<CorrelationMatrix>,
    pub statistical_summary: BTreeMap<String, DescriptiveStats>,
}

impl DatasetProfile {
    pub fn n_rows(&self) -> usize {
        self.shape[0]
    }

    pub fn n_cols(&self) -> usize {
        self.shape[1]
    }

    /// Mean of the per-column missing percentages
    pub fn average_missing_percentage(&self) -> f64 {
        if self.missing_percentage.is_empty() {
            return 0.0;
        }
        self.missing_percentage.values().sum::<f64>() / self.missing_percentage.len() as f64
    }
}

/// Pick the target column by name hint, falling back to the last column.
/// Tables with fewer than two columns have no target.
pub fn infer_target_column(columns: &[String]) -> Option<String> {
    if columns.len() < 2 {
        return None;
    }
    columns
        .iter()
        .find(|name| {
            let lower = name.to_lowercase();
            TARGET_HINTS.iter().any(|hint| lower.contains(hint))
        })
        .or_else(|| columns.last())
        .cloned()
}

/// Builds [`DatasetProfile`]s
#[derive(Debug, Clone)]
pub struct DatasetProfiler {
    classification_threshold: usize,
}

impl Default for DatasetProfiler {
    fn default() -> Self {
        Self::new(DEFAULT_CLASSIFICATION_THRESHOLD)
    }
}

impl DatasetProfiler {
    pub fn new(classification_threshold: usize) -> Self {
        Self { classification_threshold }
    }

    pub fn profile(&self, dataset: &Dataset) -> Result<DatasetProfile> {
        let names = dataset.column_names();
        let target_column = infer_target_column(&names).ok_or(HybridError::NoTargetColumn)?;

        let n_rows = dataset.n_rows();
        let columns = dataset.columns()?;

        let mut dtypes = BTreeMap::new();
        let mut missing_values = BTreeMap::new();
        let mut missing_percentage = BTreeMap::new();
        let mut numeric_columns = Vec::new();
        let mut categorical_columns = Vec::new();

        for (name, values) in &columns {
            dtypes.insert(name.clone(), dataset.dtype_name(name)?);

            let nulls = values.null_count();
            missing_values.insert(name.clone(), nulls);
            missing_percentage.insert(name.clone(), nulls as f64 / n_rows as f64 * 100.0);

            match values {
                ColumnValues::Numeric(_) => numeric_columns.push(name.clone()),
                ColumnValues::Categorical(_) => categorical_columns.push(name.clone()),
            }
        }

        let numeric: Vec<(&String, &Vec<Option<f64>>)> = columns
            .iter()
            .filter_map(|(name, values)| match values {
                ColumnValues::Numeric(v) => Some((name, v)),
                ColumnValues::Categorical(_) => None,
            })
            .collect();

        let statistical_summary = numeric
            .iter()
            .map(|(name, v)| ((*name).clone(), DescriptiveStats::compute(v)))
            .collect();

        let correlation_matrix = if numeric.len() > 1 {
            Some(correlation_matrix(&numeric))
        } else {
            None
        };

        let target_values = columns
            .iter()
            .find(|(name, _)| *name == target_column)
            .map(|(_, v)| v)
            .ok_or(HybridError::NoTargetColumn)?;

        let is_classification = match target_values {
            ColumnValues::Categorical(_) => true,
            ColumnValues::Numeric(_) => distinct_count(target_values) < self.classification_threshold,
        };
        let class_distribution = is_classification.then(|| class_distribution(target_values));

        let duplicate_rows = count_duplicate_rows(&columns, n_rows);

        debug!(
            rows = n_rows,
            columns = names.len(),
            target = %target_column,
            is_classification,
            duplicate_rows,
            "Profiled dataset"
        );

        Ok(DatasetProfile {
            shape: [n_rows, names.len()],
            columns: names,
            dtypes,
            missing_values,
            missing_percentage,
            duplicate_rows,
            memory_usage: dataset.memory_usage(),
            numeric_columns,
            categorical_columns,
            target_column,
            is_classification,
            class_distribution,
            correlation_matrix,
            statistical_summary,
        })
    }
}

fn correlation_matrix(numeric: &[(&String, &Vec<Option<f64>>)]) -> CorrelationMatrix {
    numeric
        .iter()
        .map(|(a_name, a)| {
            let row = numeric
                .iter()
                .map(|(b_name, b)| ((*b_name).clone(), stats::pearson(a, b)))
                .collect();
            ((*a_name).clone(), row)
        })
        .collect()
}

fn distinct_count(values: &ColumnValues) -> usize {
    let keys: HashSet<String> = (0..values.len()).filter_map(|i| values.key_at(i)).collect();
    keys.len()
}

fn class_distribution(values: &ColumnValues) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for key in (0..values.len()).filter_map(|i| values.key_at(i)) {
        *counts.entry(key).or_insert(0) += 1;
    }
    counts
}

/// Rows identical to some earlier row; nulls compare equal
fn count_duplicate_rows(columns: &[(String, ColumnValues)], n_rows: usize) -> usize {
    let mut seen: HashSet<Vec<Option<String>>> = HashSet::with_capacity(n_rows);
    (0..n_rows)
        .filter(|&row| {
            let key: Vec<Option<String>> = columns.iter().map(|(_, v)| v.key_at(row)).collect();
            !seen.insert(key)
        })
        .count()
}
