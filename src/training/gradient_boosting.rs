//! Gradient Boosting implementation
//!
//! Gradient boosted regression trees on the log-loss. Binary problems fit a
//! single tree per round on the log-odds; multiclass problems fit one tree per
//! class per round on the softmax residuals.

use ndarray::{Array1, Array2};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::decision_tree::RegressionTree;
use super::{check_labels, one_hot, softmax_rows, CancellationToken, Classifier};
use crate::error::{HybridError, Result};

/// Gradient Boosting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoostingConfig {
    /// Number of boosting rounds
    pub n_estimators: usize,
    /// Learning rate (shrinkage)
    pub learning_rate: f64,
    /// Maximum tree depth
    pub max_depth: usize,
    /// Row subsample ratio per round
    pub subsample: f64,
    pub random_state: u64,
}

impl Default for GradientBoostingConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            max_depth: 3,
            subsample: 1.0,
            random_state: 42,
        }
    }
}

/// Gradient Boosting Classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoostingClassifier {
    config: GradientBoostingConfig,
    /// One entry per round, each holding one tree per output
    trees: Vec<Vec<RegressionTree>>,
    initial_prediction: Vec<f64>,
    n_classes: usize,
}

const DENOMINATOR_FLOOR: f64 = 1e-150;

fn sigmoid(v: f64) -> f64 {
    1.0 / (1.0 + (-v).exp())
}

impl GradientBoostingClassifier {
    pub fn new(config: GradientBoostingConfig) -> Self {
        Self {
            config,
            trees: Vec::new(),
            initial_prediction: Vec::new(),
            n_classes: 0,
        }
    }

    /// Number of tree outputs per round
    fn n_outputs(&self) -> usize {
        if self.n_classes == 2 {
            1
        } else {
            self.n_classes
        }
    }

    fn subsample_indices(&self, n: usize, rng: &mut Xoshiro256PlusPlus) -> Vec<usize> {
        if self.config.subsample >= 1.0 {
            return (0..n).collect();
        }
        let n_sample = ((n as f64 * self.config.subsample).ceil() as usize).clamp(1, n);
        let mut indices = rand::seq::index::sample(rng, n, n_sample).into_vec();
        indices.sort_unstable();
        indices
    }

    /// Raw scores, one column per output
    fn decision_function(&self, x: &Array2<f64>) -> Array2<f64> {
        let n_outputs = self.n_outputs();
        let mut raw = Array2::zeros((x.nrows(), n_outputs));
        for (i, row) in x.rows().into_iter().enumerate() {
            for k in 0..n_outputs {
                let boosted: f64 = self.trees.iter().map(|round| round[k].predict_row(row)).sum();
                raw[[i, k]] = self.initial_prediction[k] + self.config.learning_rate * boosted;
            }
        }
        raw
    }

    fn fit_binary(&mut self, x: &Array2<f64>, labels: &[usize], cancel: &CancellationToken) -> Result<()> {
        let n = x.nrows();
        let y: Vec<f64> = labels.iter().map(|&l| l as f64).collect();
        let p = (y.iter().sum::<f64>() / n as f64).clamp(1e-15, 1.0 - 1e-15);
        self.initial_prediction = vec![(p / (1.0 - p)).ln()];

        let mut raw = vec![self.initial_prediction[0]; n];
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(self.config.random_state);

        for _ in 0..self.config.n_estimators {
            cancel.check()?;
            let residual: Vec<f64> = y.iter().zip(&raw).map(|(yi, f)| yi - sigmoid(*f)).collect();
            let leaf_value = |idx: &[usize]| {
                let num: f64 = idx.iter().map(|&i| residual[i]).sum();
                let den: f64 = idx
                    .iter()
                    .map(|&i| {
                        let prob = y[i] - residual[i];
                        prob * (1.0 - prob)
                    })
                    .sum();
                if den.abs() < DENOMINATOR_FLOOR {
                    0.0
                } else {
                    num / den
                }
            };

            let indices = self.subsample_indices(n, &mut rng);
            let mut tree = RegressionTree::new(self.config.max_depth);
            tree.fit(x, &residual, indices, &leaf_value);

            for (i, row) in x.rows().into_iter().enumerate() {
                raw[i] += self.config.learning_rate * tree.predict_row(row);
            }
            self.trees.push(vec![tree]);
        }
        Ok(())
    }

    fn fit_multiclass(&mut self, x: &Array2<f64>, labels: &[usize], cancel: &CancellationToken) -> Result<()> {
        let n = x.nrows();
        let k_classes = self.n_classes;
        let y = one_hot(labels, k_classes);

        self.initial_prediction = (0..k_classes)
            .map(|k| {
                let prior = y.column(k).sum() / n as f64;
                prior.max(1e-15).ln()
            })
            .collect();

        let mut raw = Array2::from_shape_fn((n, k_classes), |(_, k)| self.initial_prediction[k]);
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(self.config.random_state);
        let scale = (k_classes - 1) as f64 / k_classes as f64;

        for _ in 0..self.config.n_estimators {
            cancel.check()?;
            let residual = &y - &softmax_rows(&raw);
            let indices = self.subsample_indices(n, &mut rng);

            let round: Vec<RegressionTree> = (0..k_classes)
                .into_par_iter()
                .map(|k| {
                    let target = residual.column(k).to_vec();
                    let leaf_value = |idx: &[usize]| {
                        let num: f64 = idx.iter().map(|&i| target[i]).sum();
                        let den: f64 = idx
                            .iter()
                            .map(|&i| target[i].abs() * (1.0 - target[i].abs()))
                            .sum();
                        if den.abs() < DENOMINATOR_FLOOR {
                            0.0
                        } else {
                            scale * num / den
                        }
                    };
                    let mut tree = RegressionTree::new(self.config.max_depth);
                    tree.fit(x, &target, indices.clone(), &leaf_value);
                    tree
                })
                .collect();

            for (i, row) in x.rows().into_iter().enumerate() {
                for (k, tree) in round.iter().enumerate() {
                    raw[[i, k]] += self.config.learning_rate * tree.predict_row(row);
                }
            }
            self.trees.push(round);
        }
        Ok(())
    }
}

impl Classifier for GradientBoostingClassifier {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>, n_classes: usize) -> Result<()> {
        self.fit_cancellable(x, y, n_classes, &CancellationToken::new())
    }

    fn fit_cancellable(
        &mut self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        n_classes: usize,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if x.nrows() != y.len() {
            return Err(HybridError::ShapeError {
                expected: format!("y length = {}", x.nrows()),
                actual: format!("y length = {}", y.len()),
            });
        }
        if !(self.config.learning_rate > 0.0) {
            return Err(HybridError::InvalidParameter {
                name: "learning_rate".to_string(),
                value: self.config.learning_rate.to_string(),
                reason: "must be positive".to_string(),
            });
        }
        let labels = check_labels(y, n_classes)?;

        self.n_classes = n_classes;
        self.trees.clear();
        let boosted = if n_classes == 2 {
            self.fit_binary(x, &labels, cancel)
        } else {
            self.fit_multiclass(x, &labels, cancel)
        };
        if boosted.is_err() {
            self.trees.clear();
            self.initial_prediction.clear();
        }
        boosted
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if self.initial_prediction.is_empty() {
            return Err(HybridError::ModelNotFitted);
        }
        let raw = self.decision_function(x);
        if self.n_classes == 2 {
            let mut proba = Array2::zeros((x.nrows(), 2));
            for (i, f) in raw.column(0).iter().enumerate() {
                let p = sigmoid(*f);
                proba[[i, 0]] = 1.0 - p;
                proba[[i, 1]] = p;
            }
            Ok(proba)
        } else {
            Ok(softmax_rows(&raw))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn create_classification_data() -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((60, 2), |(i, j)| {
            let class = (i / 20) as f64;
            class * 4.0 + ((i * 7 + j * 3) % 10) as f64 * 0.1
        });
        let y = Array1::from_shape_fn(60, |i| (i / 20) as f64);
        (x, y)
    }

    #[test]
    fn test_binary_gradient_boosting() {
        let x = array![[0.0], [1.0], [2.0], [3.0], [10.0], [11.0], [12.0], [13.0]];
        let y = array![0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0];
        let mut model = GradientBoostingClassifier::new(GradientBoostingConfig {
            n_estimators: 20,
            ..Default::default()
        });
        model.fit(&x, &y, 2).unwrap();

        assert_eq!(model.predict(&x).unwrap(), y);
        let proba = model.predict_proba(&array![[12.5]]).unwrap();
        assert!(proba[[0, 1]] > 0.9);
    }

    #[test]
    fn test_multiclass_gradient_boosting() {
        let (x, y) = create_classification_data();
        let mut model = GradientBoostingClassifier::new(GradientBoostingConfig {
            n_estimators: 30,
            ..Default::default()
        });
        model.fit(&x, &y, 3).unwrap();

        let proba = model.predict_proba(&x).unwrap();
        assert_eq!(proba.ncols(), 3);
        for row in proba.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-9);
        }
        let accuracy = super::super::metrics::accuracy(&y, &model.predict(&x).unwrap());
        assert!(accuracy > 0.95);
    }

    #[test]
    fn test_cancelled_rounds() {
        let (x, y) = create_classification_data();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut model = GradientBoostingClassifier::new(GradientBoostingConfig::default());
        assert!(matches!(model.fit_cancellable(&x, &y, 3, &cancel), Err(HybridError::Cancelled)));
        assert!(matches!(model.predict_proba(&x), Err(HybridError::ModelNotFitted)));
    }

    #[test]
    fn test_not_fitted() {
        let model = GradientBoostingClassifier::new(GradientBoostingConfig::default());
        assert!(model.predict_proba(&array![[1.0]]).is_err());
    }
}
