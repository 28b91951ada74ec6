//! XGBoost-style gradient boosting with second-order approximation
//!
//! Key differences from plain gradient boosting:
//! - Uses both gradient (first derivative) and hessian (second derivative) of the loss
//! - Regularized leaf weights: w* = -G / (H + lambda)
//! - Gain-based split scoring: Gain = 0.5 * [GL²/(HL+λ) + GR²/(HR+λ) - (GL+GR)²/(HL+HR+λ)] - γ
//! - Built-in L1 (alpha) and L2 (lambda) regularization
//! - Minimum child weight constraint
//!
//! Binary targets use the logistic loss with one tree per round; multiclass
//! targets use the softmax loss with one tree per class per round.

use super::{check_labels, one_hot, softmax_rows, CancellationToken, Classifier};
use crate::error::{HybridError, Result};
use ndarray::{Array1, Array2, ArrayView1};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// XGBoost configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct XGBoostConfig {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    pub min_child_weight: f64,
    /// L2 regularization on leaf weights
    pub reg_lambda: f64,
    /// L1 regularization on leaf weights
    pub reg_alpha: f64,
    /// Minimum loss reduction to make a split (gamma)
    pub gamma: f64,
    pub subsample: f64,
    pub colsample_bytree: f64,
    pub random_state: u64,
}

impl Default for XGBoostConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.3,
            max_depth: 6,
            min_child_weight: 1.0,
            reg_lambda: 1.0,
            reg_alpha: 0.0,
            gamma: 0.0,
            subsample: 1.0,
            colsample_bytree: 1.0,
            random_state: 42,
        }
    }
}

const MIN_HESSIAN: f64 = 1e-16;

/// A single node in the XGBoost tree
#[derive(Debug, Clone, Serialize, Deserialize)]
enum XGBNode {
    Leaf { weight: f64 },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<XGBNode>,
        right: Box<XGBNode>,
    },
}

impl XGBNode {
    fn predict(&self, sample: ArrayView1<f64>) -> f64 {
        match self {
            XGBNode::Leaf { weight } => *weight,
            XGBNode::Split { feature, threshold, left, right } => {
                if sample[*feature] <= *threshold {
                    left.predict(sample)
                } else {
                    right.predict(sample)
                }
            }
        }
    }
}

/// Gradient statistics of one boosting target
struct GradientPair<'a> {
    grad: &'a [f64],
    hess: &'a [f64],
}

/// Build an XGBoost tree using exact greedy split finding
fn build_xgb_tree(
    x: &Array2<f64>,
    stats: &GradientPair<'_>,
    indices: &[usize],
    feature_indices: &[usize],
    depth: usize,
    config: &XGBoostConfig,
) -> XGBNode {
    let n = indices.len();

    let g_sum: f64 = indices.iter().map(|&i| stats.grad[i]).sum();
    let h_sum: f64 = indices.iter().map(|&i| stats.hess[i]).sum();

    let leaf_weight = compute_leaf_weight(g_sum, h_sum, config.reg_lambda, config.reg_alpha);

    if depth >= config.max_depth || n < 2 || h_sum < config.min_child_weight {
        return XGBNode::Leaf { weight: leaf_weight };
    }

    let best_split = feature_indices
        .iter()
        .filter_map(|&f| find_best_split_for_feature(x, stats, indices, f, config))
        .fold(None::<(usize, f64, f64)>, |best, cand| match best {
            Some(b) if b.2 >= cand.2 => Some(b),
            _ => Some(cand),
        });

    match best_split {
        Some((feature, threshold, gain)) if gain > config.gamma => {
            let (left_idx, right_idx): (Vec<usize>, Vec<usize>) =
                indices.iter().partition(|&&i| x[[i, feature]] <= threshold);

            if left_idx.is_empty() || right_idx.is_empty() {
                return XGBNode::Leaf { weight: leaf_weight };
            }

            let left = build_xgb_tree(x, stats, &left_idx, feature_indices, depth + 1, config);
            let right = build_xgb_tree(x, stats, &right_idx, feature_indices, depth + 1, config);

            XGBNode::Split {
                feature,
                threshold,
                left: Box::new(left),
                right: Box::new(right),
            }
        }
        _ => XGBNode::Leaf { weight: leaf_weight },
    }
}

/// Optimal leaf weight with L1 (alpha) and L2 (lambda) regularization
fn compute_leaf_weight(g_sum: f64, h_sum: f64, lambda: f64, alpha: f64) -> f64 {
    if alpha > 0.0 {
        // soft-threshold for L1
        let g_adj = if g_sum > alpha {
            g_sum - alpha
        } else if g_sum < -alpha {
            g_sum + alpha
        } else {
            return 0.0;
        };
        -g_adj / (h_sum + lambda)
    } else {
        -g_sum / (h_sum + lambda)
    }
}

/// Best (feature, threshold, gain) for one feature
fn find_best_split_for_feature(
    x: &Array2<f64>,
    stats: &GradientPair<'_>,
    indices: &[usize],
    feature: usize,
    config: &XGBoostConfig,
) -> Option<(usize, f64, f64)> {
    let mut sorted_indices: Vec<usize> = indices.to_vec();
    sorted_indices.sort_by(|&a, &b| {
        x[[a, feature]].partial_cmp(&x[[b, feature]]).unwrap_or(std::cmp::Ordering::Equal)
    });

    let g_total: f64 = sorted_indices.iter().map(|&i| stats.grad[i]).sum();
    let h_total: f64 = sorted_indices.iter().map(|&i| stats.hess[i]).sum();

    let mut g_left = 0.0;
    let mut h_left = 0.0;
    let mut best: Option<(f64, f64)> = None;
    let lambda = config.reg_lambda;

    for pos in 0..sorted_indices.len().saturating_sub(1) {
        let idx = sorted_indices[pos];
        let next_idx = sorted_indices[pos + 1];
        g_left += stats.grad[idx];
        h_left += stats.hess[idx];

        if (x[[next_idx, feature]] - x[[idx, feature]]).abs() < 1e-12 {
            continue;
        }

        let g_right = g_total - g_left;
        let h_right = h_total - h_left;
        if h_left < config.min_child_weight || h_right < config.min_child_weight {
            continue;
        }

        let gain = 0.5
            * ((g_left * g_left) / (h_left + lambda) + (g_right * g_right) / (h_right + lambda)
                - (g_total * g_total) / (h_total + lambda));

        if best.map_or(true, |(g, _)| gain > g) {
            best = Some((gain, (x[[idx, feature]] + x[[next_idx, feature]]) / 2.0));
        }
    }

    best.map(|(gain, threshold)| (feature, threshold, gain))
}

fn subsample(rng: &mut Xoshiro256PlusPlus, n: usize, ratio: f64) -> Vec<usize> {
    if ratio >= 1.0 {
        return (0..n).collect();
    }
    let k = ((n as f64 * ratio).ceil() as usize).clamp(1, n);
    let mut indices = rand::seq::index::sample(rng, n, k).into_vec();
    indices.sort_unstable();
    indices
}

/// XGBoost Classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct XGBoostClassifier {
    config: XGBoostConfig,
    /// One entry per round, each holding one tree per output
    trees: Vec<Vec<XGBNode>>,
    base_score: Vec<f64>,
    n_classes: usize,
    n_features: usize,
}

impl XGBoostClassifier {
    pub fn new(config: XGBoostConfig) -> Self {
        Self {
            config,
            trees: Vec::new(),
            base_score: Vec::new(),
            n_classes: 0,
            n_features: 0,
        }
    }

    fn sigmoid(x: f64) -> f64 {
        1.0 / (1.0 + (-x).exp())
    }

    pub fn n_rounds(&self) -> usize {
        self.trees.len()
    }

    /// Raw margins, one column per output
    fn margins(&self, x: &Array2<f64>) -> Array2<f64> {
        let n_outputs = self.base_score.len();
        let mut raw = Array2::zeros((x.nrows(), n_outputs));
        for (i, row) in x.rows().into_iter().enumerate() {
            for k in 0..n_outputs {
                let boosted: f64 = self.trees.iter().map(|round| round[k].predict(row)).sum();
                raw[[i, k]] = self.base_score[k] + self.config.learning_rate * boosted;
            }
        }
        raw
    }

    fn boost_binary(&mut self, x: &Array2<f64>, labels: &[usize], cancel: &CancellationToken) -> Result<()> {
        let n_samples = x.nrows();
        let y: Vec<f64> = labels.iter().map(|&l| l as f64).collect();

        let p = (y.iter().sum::<f64>() / n_samples as f64).clamp(1e-7, 1.0 - 1e-7);
        self.base_score = vec![(p / (1.0 - p)).ln()];
        let mut raw_preds = vec![self.base_score[0]; n_samples];
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(self.config.random_state);

        for _ in 0..self.config.n_estimators {
            cancel.check()?;
            // logistic loss: grad = p - y, hess = p * (1 - p)
            let probs: Vec<f64> = raw_preds.iter().map(|&r| Self::sigmoid(r)).collect();
            let grad: Vec<f64> = probs.iter().zip(&y).map(|(p, yi)| p - yi).collect();
            let hess: Vec<f64> = probs.iter().map(|p| (p * (1.0 - p)).max(MIN_HESSIAN)).collect();

            let row_indices = subsample(&mut rng, n_samples, self.config.subsample);
            let col_indices = subsample(&mut rng, self.n_features, self.config.colsample_bytree);

            let stats = GradientPair { grad: &grad, hess: &hess };
            let tree = build_xgb_tree(x, &stats, &row_indices, &col_indices, 0, &self.config);

            for (i, row) in x.rows().into_iter().enumerate() {
                raw_preds[i] += self.config.learning_rate * tree.predict(row);
            }
            self.trees.push(vec![tree]);
        }
        Ok(())
    }

    fn boost_softmax(&mut self, x: &Array2<f64>, labels: &[usize], cancel: &CancellationToken) -> Result<()> {
        let n_samples = x.nrows();
        let n_classes = self.n_classes;
        let y = one_hot(labels, n_classes);

        self.base_score = vec![0.0; n_classes];
        let mut raw_preds = Array2::<f64>::zeros((n_samples, n_classes));
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(self.config.random_state);

        for _ in 0..self.config.n_estimators {
            cancel.check()?;
            let probs = softmax_rows(&raw_preds);
            let row_indices = subsample(&mut rng, n_samples, self.config.subsample);
            let col_indices = subsample(&mut rng, self.n_features, self.config.colsample_bytree);

            // softmax loss: grad = p - y, hess = 2p(1 - p)
            let round: Vec<XGBNode> = (0..n_classes)
                .into_par_iter()
                .map(|k| {
                    let grad: Vec<f64> = probs
                        .column(k)
                        .iter()
                        .zip(y.column(k).iter())
                        .map(|(p, yi)| p - yi)
                        .collect();
                    let hess: Vec<f64> = probs
                        .column(k)
                        .iter()
                        .map(|p| (2.0 * p * (1.0 - p)).max(MIN_HESSIAN))
                        .collect();
                    let stats = GradientPair { grad: &grad, hess: &hess };
                    build_xgb_tree(x, &stats, &row_indices, &col_indices, 0, &self.config)
                })
                .collect();

            for (i, row) in x.rows().into_iter().enumerate() {
                for (k, tree) in round.iter().enumerate() {
                    raw_preds[[i, k]] += self.config.learning_rate * tree.predict(row);
                }
            }
            self.trees.push(round);
        }
        Ok(())
    }
}

impl Classifier for XGBoostClassifier {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>, n_classes: usize) -> Result<()> {
        self.fit_cancellable(x, y, n_classes, &CancellationToken::new())
    }

    /// The token is checked before every boosting round
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
        let labels = check_labels(y, n_classes)?;

        self.n_classes = n_classes;
        self.n_features = x.ncols();
        self.trees.clear();

        let boosted = if n_classes == 2 {
            self.boost_binary(x, &labels, cancel)
        } else {
            self.boost_softmax(x, &labels, cancel)
        };
        if boosted.is_err() {
            self.trees.clear();
            self.base_score.clear();
        }
        boosted
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if self.base_score.is_empty() {
            return Err(HybridError::ModelNotFitted);
        }
        if x.ncols() != self.n_features {
            return Err(HybridError::ShapeError {
                expected: format!("{} features", self.n_features),
                actual: format!("{} features", x.ncols()),
            });
        }

        let raw = self.margins(x);
        if self.n_classes == 2 {
            let mut proba = Array2::zeros((x.nrows(), 2));
            for (i, r) in raw.column(0).iter().enumerate() {
                let p = Self::sigmoid(*r);
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

    #[test]
    fn test_leaf_weight_regularization() {
        assert_eq!(compute_leaf_weight(-4.0, 3.0, 1.0, 0.0), 1.0);
        // |G| below alpha shrinks to zero
        assert_eq!(compute_leaf_weight(0.5, 3.0, 1.0, 1.0), 0.0);
        assert_eq!(compute_leaf_weight(-3.0, 1.0, 1.0, 1.0), 1.0);
    }

    #[test]
    fn test_xgboost_binary() {
        let x = array![[1.0, 0.0], [2.0, 0.0], [3.0, 0.0], [8.0, 1.0], [9.0, 1.0], [10.0, 1.0]];
        let y = array![0.0, 0.0, 0.0, 1.0, 1.0, 1.0];
        let mut model = XGBoostClassifier::new(XGBoostConfig {
            n_estimators: 10,
            min_child_weight: 0.0,
            ..Default::default()
        });
        model.fit(&x, &y, 2).unwrap();
        assert_eq!(model.n_rounds(), 10);
        assert_eq!(model.predict(&x).unwrap(), y);
    }

    #[test]
    fn test_xgboost_multiclass() {
        let x = Array2::from_shape_fn((30, 1), |(i, _)| (i / 10) as f64 * 5.0 + (i % 10) as f64 * 0.1);
        let y = Array1::from_shape_fn(30, |i| (i / 10) as f64);
        let mut model = XGBoostClassifier::new(XGBoostConfig {
            n_estimators: 20,
            ..Default::default()
        });
        model.fit(&x, &y, 3).unwrap();

        let proba = model.predict_proba(&x).unwrap();
        assert_eq!(proba.dim(), (30, 3));
        for row in proba.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-9);
        }
        assert_eq!(model.predict(&x).unwrap(), y);
    }

    #[test]
    fn test_cancelled_boosting_leaves_model_unfitted() {
        let x = array![[0.0], [1.0], [5.0], [6.0]];
        let y = array![0.0, 0.0, 1.0, 1.0];
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut model = XGBoostClassifier::new(XGBoostConfig::default());
        assert!(matches!(model.fit_cancellable(&x, &y, 2, &cancel), Err(HybridError::Cancelled)));
        assert_eq!(model.n_rounds(), 0);
        assert!(matches!(model.predict_proba(&x), Err(HybridError::ModelNotFitted)));
    }

    #[test]
    fn test_wrong_feature_count() {
        let x = array![[0.0], [1.0], [5.0], [6.0]];
        let y = array![0.0, 0.0, 1.0, 1.0];
        let mut model = XGBoostClassifier::new(XGBoostConfig::default());
        model.fit(&x, &y, 2).unwrap();
        assert!(model.predict_proba(&array![[0.0, 1.0]]).is_err());
    }
}
