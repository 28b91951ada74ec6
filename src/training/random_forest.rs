//! Random Forest implementation

use super::decision_tree::DecisionTreeClassifier;
use super::{check_labels, CancellationToken, Classifier};
use crate::error::{HybridError, Result};
use ndarray::{Array1, Array2};
use rand::RngCore;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Bagged ensemble of Gini trees with per-split feature subsampling
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForestClassifier {
    trees: Vec<DecisionTreeClassifier>,
    pub n_estimators: usize,
    pub bootstrap: bool,
    pub random_state: u64,
    n_classes: usize,
    n_features: usize,
}

impl Default for RandomForestClassifier {
    fn default() -> Self {
        Self::new(100, 42)
    }
}

impl RandomForestClassifier {
    pub fn new(n_estimators: usize, random_state: u64) -> Self {
        Self {
            trees: Vec::new(),
            n_estimators,
            bootstrap: true,
            random_state,
            n_classes: 0,
            n_features: 0,
        }
    }

    /// Features drawn at each split: floor of the square root
    fn compute_max_features(n_features: usize) -> usize {
        ((n_features as f64).sqrt().floor() as usize).clamp(1, n_features.max(1))
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

impl Classifier for RandomForestClassifier {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>, n_classes: usize) -> Result<()> {
        self.fit_cancellable(x, y, n_classes, &CancellationToken::new())
    }

    /// Trees check the token before they are grown
    fn fit_cancellable(
        &mut self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        n_classes: usize,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let n_samples = x.nrows();
        if n_samples != y.len() {
            return Err(HybridError::ShapeError {
                expected: format!("y length = {}", n_samples),
                actual: format!("y length = {}", y.len()),
            });
        }
        if self.n_estimators == 0 {
            return Err(HybridError::InvalidParameter {
                name: "n_estimators".to_string(),
                value: "0".to_string(),
                reason: "forest needs at least one tree".to_string(),
            });
        }
        let labels = check_labels(y, n_classes)?;

        self.n_classes = n_classes;
        self.n_features = x.ncols();
        let max_features = Self::compute_max_features(self.n_features);
        let base_seed = self.random_state;

        let trees: Vec<DecisionTreeClassifier> = (0..self.n_estimators)
            .into_par_iter()
            .map(|tree_idx| {
                cancel.check()?;
                let seed = base_seed.wrapping_add(tree_idx as u64);
                let mut rng = ChaCha8Rng::seed_from_u64(seed);

                let sample_indices: Vec<usize> = if self.bootstrap {
                    (0..n_samples)
                        .map(|_| (rng.next_u64() as usize) % n_samples)
                        .collect()
                } else {
                    (0..n_samples).collect()
                };

                let mut tree = DecisionTreeClassifier::new(seed).with_max_features(max_features);
                tree.fit_indices(x, &labels, sample_indices, n_classes)?;
                Ok(tree)
            })
            .collect::<Result<_>>()?;

        self.trees = trees;
        Ok(())
    }

    /// Mean of the trees' leaf class distributions
    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if self.trees.is_empty() {
            return Err(HybridError::ModelNotFitted);
        }
        if x.ncols() != self.n_features {
            return Err(HybridError::ShapeError {
                expected: format!("{} features", self.n_features),
                actual: format!("{} features", x.ncols()),
            });
        }

        let sum = self
            .trees
            .par_iter()
            .map(|tree| tree.predict_proba(x))
            .try_reduce(
                || Array2::zeros((x.nrows(), self.n_classes)),
                |a, b| Ok(a + b),
            )?;

        Ok(sum / self.trees.len() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn blobs() -> (Array2<f64>, Array1<f64>) {
        let x = array![
            [1.0, 1.0],
            [1.2, 0.8],
            [0.9, 1.1],
            [1.1, 1.0],
            [5.0, 5.0],
            [5.2, 4.9],
            [4.8, 5.1],
            [5.1, 5.2]
        ];
        let y = array![0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0];
        (x, y)
    }

    #[test]
    fn test_forest_fits_separable_data() {
        let (x, y) = blobs();
        let mut forest = RandomForestClassifier::new(20, 42);
        forest.fit(&x, &y, 2).unwrap();
        assert_eq!(forest.n_trees(), 20);
        assert_eq!(forest.predict(&x).unwrap(), y);

        let proba = forest.predict_proba(&x).unwrap();
        for row in proba.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_forest_is_deterministic() {
        let (x, y) = blobs();
        let mut a = RandomForestClassifier::new(10, 7);
        let mut b = RandomForestClassifier::new(10, 7);
        a.fit(&x, &y, 2).unwrap();
        b.fit(&x, &y, 2).unwrap();
        let query = array![[3.0, 3.0]];
        assert_eq!(a.predict_proba(&query).unwrap(), b.predict_proba(&query).unwrap());
    }

    #[test]
    fn test_cancelled_forest_grows_no_trees() {
        let (x, y) = blobs();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut forest = RandomForestClassifier::new(20, 42);
        assert!(matches!(
            forest.fit_cancellable(&x, &y, 2, &cancel),
            Err(HybridError::Cancelled)
        ));
        assert_eq!(forest.n_trees(), 0);
    }

    #[test]
    fn test_unfitted_forest() {
        let forest = RandomForestClassifier::default();
        assert!(matches!(forest.predict_proba(&array![[1.0]]), Err(HybridError::ModelNotFitted)));
    }
}
