//! Model training module
//!
//! Trains the fixed battery of eight classifiers:
//! - Random Forest and Decision Tree (CART)
//! - XGBoost-style and generic Gradient Boosting
//! - Neural network (MLP)
//! - Support Vector Machine (SMO, RBF kernel)
//! - Logistic Regression
//! - K-Nearest Neighbors
//!
//! Every model implements [`Classifier`] over class indices `0..n_classes`
//! and produces a probability per class.

mod config;
mod engine;
pub mod decision_tree;
pub mod gradient_boosting;
pub mod knn;
pub mod linear_models;
pub mod metrics;
pub mod neural_network;
pub mod random_forest;
pub mod split;
pub mod svm;
pub mod xgboost;

pub use config::TrainingConfig;
pub use decision_tree::{DecisionTreeClassifier, RegressionTree, TreeNode};
pub use engine::{CancellationToken, FittedModel, ModelRecord, ModelTrainer, TrainingOutcome, TrainingResult};
pub use gradient_boosting::{GradientBoostingClassifier, GradientBoostingConfig};
pub use knn::KNNClassifier;
pub use linear_models::LogisticRegression;
pub use metrics::ModelMetrics;
pub use neural_network::{MLPClassifier, MLPConfig};
pub use random_forest::RandomForestClassifier;
pub use split::{shuffle_split, stratified_split, TrainTestSplit};
pub use svm::{SVMClassifier, SVMConfig};
pub use xgboost::{XGBoostClassifier, XGBoostConfig};

use crate::error::{HybridError, Result};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

/// Common interface of all classifiers
pub trait Classifier: Send + Sync + std::fmt::Debug {
    /// Fit on features `x` and class indices `y` in `0..n_classes`
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>, n_classes: usize) -> Result<()>;

    /// Like [`Classifier::fit`], but iterative learners stop with
    /// [`HybridError::Cancelled`] once `cancel` is set
    fn fit_cancellable(
        &mut self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        n_classes: usize,
        cancel: &CancellationToken,
    ) -> Result<()> {
        cancel.check()?;
        self.fit(x, y, n_classes)
    }

    /// Class probabilities, one row per sample and one column per class
    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>>;

    /// Most probable class index per sample
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        Ok(argmax_rows(&self.predict_proba(x)?))
    }
}

/// The fixed model battery, in reporting order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelKind {
    #[serde(rename = "Random Forest")]
    RandomForest,
    #[serde(rename = "XGBoost")]
    XGBoost,
    #[serde(rename = "Neural Network")]
    NeuralNetwork,
    #[serde(rename = "Support Vector Machine")]
    SupportVectorMachine,
    #[serde(rename = "Logistic Regression")]
    LogisticRegression,
    #[serde(rename = "Decision Tree")]
    DecisionTree,
    #[serde(rename = "K-Nearest Neighbors")]
    KNearestNeighbors,
    #[serde(rename = "Gradient Boosting")]
    GradientBoosting,
}

impl ModelKind {
    pub const ALL: [ModelKind; 8] = [
        ModelKind::RandomForest,
        ModelKind::XGBoost,
        ModelKind::NeuralNetwork,
        ModelKind::SupportVectorMachine,
        ModelKind::LogisticRegression,
        ModelKind::DecisionTree,
        ModelKind::KNearestNeighbors,
        ModelKind::GradientBoosting,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ModelKind::RandomForest => "Random Forest",
            ModelKind::XGBoost => "XGBoost",
            ModelKind::NeuralNetwork => "Neural Network",
            ModelKind::SupportVectorMachine => "Support Vector Machine",
            ModelKind::LogisticRegression => "Logistic Regression",
            ModelKind::DecisionTree => "Decision Tree",
            ModelKind::KNearestNeighbors => "K-Nearest Neighbors",
            ModelKind::GradientBoosting => "Gradient Boosting",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.name() == name)
    }

    /// Unfitted model with the battery's fixed hyperparameters
    pub fn build(&self, seed: u64) -> Box<dyn Classifier> {
        match self {
            ModelKind::RandomForest => Box::new(RandomForestClassifier::new(100, seed)),
            ModelKind::XGBoost => Box::new(XGBoostClassifier::new(XGBoostConfig {
                random_state: seed,
                ..Default::default()
            })),
            ModelKind::NeuralNetwork => Box::new(MLPClassifier::new(MLPConfig {
                random_state: seed,
                ..Default::default()
            })),
            ModelKind::SupportVectorMachine => Box::new(SVMClassifier::new(SVMConfig {
                random_state: seed,
                ..Default::default()
            })),
            ModelKind::LogisticRegression => Box::new(LogisticRegression::new()),
            ModelKind::DecisionTree => Box::new(DecisionTreeClassifier::new(seed)),
            ModelKind::KNearestNeighbors => Box::new(KNNClassifier::new(5)),
            ModelKind::GradientBoosting => Box::new(GradientBoostingClassifier::new(GradientBoostingConfig {
                random_state: seed,
                ..Default::default()
            })),
        }
    }
}

impl std::fmt::Display for ModelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Validate class-index labels and return them as `usize`.
/// Fails unless at least two distinct classes are present.
pub fn check_labels(y: &Array1<f64>, n_classes: usize) -> Result<Vec<usize>> {
    let labels: Vec<usize> = y
        .iter()
        .map(|&v| {
            if v < 0.0 || v.fract() != 0.0 || v as usize >= n_classes {
                Err(HybridError::InvalidParameter {
                    name: "label".to_string(),
                    value: v.to_string(),
                    reason: format!("expected a class index below {}", n_classes),
                })
            } else {
                Ok(v as usize)
            }
        })
        .collect::<Result<_>>()?;

    let mut present = vec![false; n_classes];
    labels.iter().for_each(|&l| present[l] = true);
    let distinct = present.iter().filter(|p| **p).count();
    if distinct < 2 {
        return Err(HybridError::InsufficientClasses(distinct));
    }
    Ok(labels)
}

/// Index of the largest value per row; ties go to the lower index
pub fn argmax_rows(proba: &Array2<f64>) -> Array1<f64> {
    proba
        .rows()
        .into_iter()
        .map(|row| {
            let mut best = 0;
            for (k, &p) in row.iter().enumerate() {
                if p > row[best] {
                    best = k;
                }
            }
            best as f64
        })
        .collect()
}

/// Row-wise softmax, stable against large logits
pub fn softmax_rows(logits: &Array2<f64>) -> Array2<f64> {
    let mut out = logits.clone();
    for mut row in out.axis_iter_mut(Axis(0)) {
        let max = row.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        row.mapv_inplace(|v| (v - max).exp());
        let sum = row.sum();
        if sum > 0.0 {
            row.mapv_inplace(|v| v / sum);
        }
    }
    out
}

/// One-hot encode class indices
pub fn one_hot(labels: &[usize], n_classes: usize) -> Array2<f64> {
    let mut out = Array2::zeros((labels.len(), n_classes));
    for (i, &l) in labels.iter().enumerate() {
        out[[i, l]] = 1.0;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_model_names_roundtrip() {
        for kind in ModelKind::ALL {
            assert_eq!(ModelKind::from_name(kind.name()), Some(kind));
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.name()));
        }
        assert_eq!(ModelKind::from_name("AdaBoost"), None);
    }

    #[test]
    fn test_check_labels() {
        assert_eq!(check_labels(&array![0.0, 1.0, 1.0], 2).unwrap(), vec![0, 1, 1]);
        assert!(matches!(
            check_labels(&array![1.0, 1.0], 2),
            Err(HybridError::InsufficientClasses(1))
        ));
        assert!(check_labels(&array![0.0, 2.0], 2).is_err());
        assert!(check_labels(&array![0.5, 1.0], 2).is_err());
    }

    #[test]
    fn test_argmax_and_softmax() {
        let logits = array![[1.0, 3.0, 2.0], [5.0, 5.0, 0.0]];
        assert_eq!(argmax_rows(&logits).to_vec(), vec![1.0, 0.0]);

        let p = softmax_rows(&array![[1000.0, 1000.0]]);
        assert!((p[[0, 0]] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_one_hot() {
        let m = one_hot(&[2, 0], 3);
        assert_eq!(m, array![[0.0, 0.0, 1.0], [1.0, 0.0, 0.0]]);
    }
}
