//! Data preprocessing module
//!
//! Turns a raw [`Dataset`] into a dense numeric feature matrix and a
//! class-index target vector:
//! - missing values are imputed (median for numeric, mode for categorical)
//! - categorical features are label-encoded
//! - the target is mapped to class indices `0..k`
//!
//! The fitted [`Preprocessor`] keeps every fill value and encoder so later
//! inputs with the same columns are encoded identically.

mod encoder;
mod imputer;
mod scaler;

pub use encoder::LabelEncoder;
pub use imputer::{mode, FillValue, UNKNOWN_CATEGORY};
pub use scaler::StandardScaler;

use std::collections::HashMap;

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::data::{format_number, ColumnValues, Dataset};
use crate::error::{HybridError, Result};

/// Fully numeric output of preprocessing
#[derive(Debug, Clone)]
pub struct ProcessedData {
    pub feature_names: Vec<String>,
    pub features: Array2<f64>,
    /// Class index per row
    pub target: Array1<f64>,
    /// Display label for each class index
    pub class_labels: Vec<String>,
}

impl ProcessedData {
    pub fn n_samples(&self) -> usize {
        self.features.nrows()
    }

    pub fn n_classes(&self) -> usize {
        self.class_labels.len()
    }
}

/// How one feature column is made numeric
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ColumnTransform {
    name: String,
    fill: FillValue,
    encoder: Option<LabelEncoder>,
}

impl ColumnTransform {
    fn apply(&self, values: &ColumnValues) -> Result<Vec<f64>> {
        match (values, &self.encoder) {
            (ColumnValues::Numeric(v), None) => Ok(self.fill.fill_numeric(v)),
            (ColumnValues::Categorical(v), Some(enc)) => {
                let filled = self.fill.fill_categorical(v);
                Ok(enc.transform(&filled)?.into_iter().map(|c| c as f64).collect())
            }
            _ => Err(HybridError::Preprocessing(format!(
                "column '{}' changed type since fitting",
                self.name
            ))),
        }
    }
}

/// Maps target values to class indices in sorted value order
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TargetEncoder {
    labels: Vec<String>,
    lookup: HashMap<String, usize>,
}

impl TargetEncoder {
    /// Numeric targets sort by value
    pub fn from_numeric(values: &[f64]) -> Self {
        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let mut labels: Vec<String> = sorted.into_iter().map(format_number).collect();
        labels.dedup();
        Self::from_labels(labels)
    }

    /// Categorical targets sort lexically
    pub fn from_categorical(values: &[String]) -> Self {
        let mut labels = values.to_vec();
        labels.sort();
        labels.dedup();
        Self::from_labels(labels)
    }

    fn from_labels(labels: Vec<String>) -> Self {
        let lookup = labels.iter().enumerate().map(|(i, l)| (l.clone(), i)).collect();
        Self { labels, lookup }
    }

    pub fn encode(&self, label: &str) -> Option<usize> {
        self.lookup.get(label).copied()
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }
}

/// Fitted imputation and encoding for one dataset layout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Preprocessor {
    target_column: String,
    columns: Vec<ColumnTransform>,
    target_fill: FillValue,
    target_encoder: TargetEncoder,
}

impl Preprocessor {
    /// Fit on `dataset` and return its numeric form
    pub fn fit_transform(dataset: &Dataset, target_column: &str) -> Result<(Self, ProcessedData)> {
        let n_rows = dataset.n_rows();
        let columns = dataset.columns()?;

        let target_values = columns
            .iter()
            .find(|(name, _)| name == target_column)
            .map(|(_, v)| v)
            .ok_or_else(|| {
                HybridError::Preprocessing(format!("target column '{}' not found", target_column))
            })?;

        let mut transforms = Vec::new();
        let mut feature_columns = Vec::new();
        for (name, values) in columns.iter().filter(|(name, _)| name != target_column) {
            let fill = FillValue::fit(values);
            let encoder = match values {
                ColumnValues::Categorical(v) => {
                    let mut enc = LabelEncoder::new(name.clone());
                    enc.fit(&fill.fill_categorical(v));
                    Some(enc)
                }
                ColumnValues::Numeric(_) => None,
            };
            let transform = ColumnTransform { name: name.clone(), fill, encoder };
            feature_columns.push(transform.apply(values)?);
            transforms.push(transform);
        }

        let target_fill = FillValue::fit(target_values);
        let (target_encoder, target_keys) = match target_values {
            ColumnValues::Numeric(v) => {
                let filled = target_fill.fill_numeric(v);
                let keys: Vec<String> = filled.iter().copied().map(format_number).collect();
                (TargetEncoder::from_numeric(&filled), keys)
            }
            ColumnValues::Categorical(v) => {
                let filled = target_fill.fill_categorical(v);
                (TargetEncoder::from_categorical(&filled), filled)
            }
        };
        let target: Array1<f64> = target_keys
            .iter()
            .map(|k| {
                target_encoder.encode(k).map(|c| c as f64).ok_or_else(|| {
                    HybridError::Preprocessing(format!("target value '{}' has no class", k))
                })
            })
            .collect::<Result<_>>()?;

        let features = stack_columns(&feature_columns, n_rows)?;

        debug!(
            rows = n_rows,
            features = transforms.len(),
            encoded = transforms.iter().filter(|t| t.encoder.is_some()).count(),
            classes = target_encoder.labels().len(),
            "Preprocessed dataset"
        );

        let processed = ProcessedData {
            feature_names: transforms.iter().map(|t| t.name.clone()).collect(),
            features,
            target,
            class_labels: target_encoder.labels().to_vec(),
        };

        let preprocessor = Self {
            target_column: target_column.to_string(),
            columns: transforms,
            target_fill,
            target_encoder,
        };

        Ok((preprocessor, processed))
    }

    /// Encode the feature columns of a dataset with the fitted transforms
    pub fn transform(&self, dataset: &Dataset) -> Result<Array2<f64>> {
        let encoded = self
            .columns
            .iter()
            .map(|t| {
                let values = dataset.column_values(&t.name)?;
                t.apply(&values)
            })
            .collect::<Result<Vec<_>>>()?;
        stack_columns(&encoded, dataset.n_rows())
    }

    pub fn target_column(&self) -> &str {
        &self.target_column
    }

    pub fn feature_names(&self) -> Vec<&str> {
        self.columns.iter().map(|t| t.name.as_str()).collect()
    }

    pub fn class_labels(&self) -> &[String] {
        self.target_encoder.labels()
    }

    pub fn encoder(&self, column: &str) -> Option<&LabelEncoder> {
        self.columns
            .iter()
            .find(|t| t.name == column)
            .and_then(|t| t.encoder.as_ref())
    }

    pub fn target_fill(&self) -> &FillValue {
        &self.target_fill
    }
}

fn stack_columns(columns: &[Vec<f64>], n_rows: usize) -> Result<Array2<f64>> {
    let n_cols = columns.len();
    let mut data = Vec::with_capacity(n_rows * n_cols);
    for row in 0..n_rows {
        for col in columns {
            data.push(col[row]);
        }
    }
    Ok(Array2::from_shape_vec((n_rows, n_cols), data)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::*;

    fn messy() -> Dataset {
        let df = df!(
            "age" => &[Some(20.0), None, Some(40.0), Some(30.0)],
            "city" => &[Some("Rome"), Some("Oslo"), None, Some("Rome")],
            "empty" => &[None::<&str>, None, None, None],
            "label" => &[Some("yes"), Some("no"), None, Some("no")]
        )
        .unwrap();
        Dataset::new(df).unwrap()
    }

    #[test]
    fn test_output_dense_and_numeric() {
        let ds = messy();
        let (_, data) = Preprocessor::fit_transform(&ds, "label").unwrap();

        assert_eq!(data.features.dim(), (4, 3));
        assert_eq!(data.target.len(), 4);
        assert!(data.features.iter().all(|v| v.is_finite()));
        assert!(data.target.iter().all(|v| v.is_finite()));
        assert_eq!(data.feature_names, vec!["age", "city", "empty"]);
    }

    #[test]
    fn test_imputation_and_encoding() {
        let ds = messy();
        let (prep, data) = Preprocessor::fit_transform(&ds, "label").unwrap();

        // median of 20, 30, 40
        assert_eq!(data.features[[1, 0]], 30.0);
        // Rome is the mode, codes sorted: Oslo=0, Rome=1
        assert_eq!(data.features.column(1).to_vec(), vec![1.0, 0.0, 1.0, 1.0]);
        assert_eq!(prep.encoder("empty").unwrap().classes(), &[UNKNOWN_CATEGORY]);

        // missing target takes the mode "no"
        assert_eq!(data.class_labels, vec!["no", "yes"]);
        assert_eq!(data.target.to_vec(), vec![1.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_numeric_target_sorted_numerically() {
        let df = df!("x" => &[1.0, 2.0, 3.0, 4.0], "y" => &[10i64, 2, 10, 2]).unwrap();
        let ds = Dataset::new(df).unwrap();
        let (_, data) = Preprocessor::fit_transform(&ds, "y").unwrap();
        assert_eq!(data.class_labels, vec!["2", "10"]);
        assert_eq!(data.target.to_vec(), vec![1.0, 0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_transform_reuses_fitted_encoders() {
        let ds = messy();
        let (prep, data) = Preprocessor::fit_transform(&ds, "label").unwrap();
        let again = prep.transform(&ds).unwrap();
        assert_eq!(again, data.features);

        let unseen = df!(
            "age" => &[1.0],
            "city" => &["Paris"],
            "empty" => &["Unknown"],
            "label" => &["yes"]
        )
        .unwrap();
        let err = prep.transform(&Dataset::new(unseen).unwrap()).unwrap_err();
        assert!(matches!(err, HybridError::UnknownCategory { .. }));
    }
}
