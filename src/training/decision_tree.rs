//! CART decision trees
//!
//! [`DecisionTreeClassifier`] grows Gini-impurity trees whose leaves hold the
//! class distribution of their samples. [`RegressionTree`] grows squared-error
//! trees with caller-supplied leaf values and is the base learner of the
//! generic gradient boosting model.

use super::{check_labels, Classifier};
use crate::error::{HybridError, Result};
use ndarray::{Array2, ArrayView1};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Decision tree node. Classifier leaves hold class probabilities,
/// regression leaves hold a single value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TreeNode {
    Leaf {
        value: Vec<f64>,
        n_samples: usize,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
    },
}

impl TreeNode {
    pub fn leaf_value(&self, sample: ArrayView1<f64>) -> &[f64] {
        let mut node = self;
        loop {
            match node {
                TreeNode::Leaf { value, .. } => return value,
                TreeNode::Split { feature, threshold, left, right } => {
                    node = if sample[*feature] <= *threshold { left } else { right };
                }
            }
        }
    }

    fn depth(&self) -> usize {
        match self {
            TreeNode::Leaf { .. } => 0,
            TreeNode::Split { left, right, .. } => 1 + left.depth().max(right.depth()),
        }
    }

    fn n_leaves(&self) -> usize {
        match self {
            TreeNode::Leaf { .. } => 1,
            TreeNode::Split { left, right, .. } => left.n_leaves() + right.n_leaves(),
        }
    }
}

fn sort_by_feature(x: &Array2<f64>, indices: &mut [usize], feature: usize) {
    indices.sort_by(|&a, &b| {
        x[[a, feature]]
            .partial_cmp(&x[[b, feature]])
            .unwrap_or(Ordering::Equal)
    });
}

fn gini(counts: &[f64], total: f64) -> f64 {
    if total <= 0.0 {
        return 0.0;
    }
    1.0 - counts.iter().map(|c| (c / total).powi(2)).sum::<f64>()
}

/// Best split found for a node
struct SplitCandidate {
    feature: usize,
    threshold: f64,
    score: f64,
}

/// Gini-impurity classification tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTreeClassifier {
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Features drawn at each split; `None` considers all of them
    pub max_features: Option<usize>,
    pub random_state: u64,
    root: Option<TreeNode>,
    n_classes: usize,
    n_features: usize,
}

impl Default for DecisionTreeClassifier {
    fn default() -> Self {
        Self::new(42)
    }
}

impl DecisionTreeClassifier {
    pub fn new(random_state: u64) -> Self {
        Self {
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            random_state,
            root: None,
            n_classes: 0,
            n_features: 0,
        }
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    pub fn with_max_features(mut self, max_features: usize) -> Self {
        self.max_features = Some(max_features);
        self
    }

    /// Fit on the rows named by `indices` (repeats allowed, as in bootstrap samples)
    pub fn fit_indices(
        &mut self,
        x: &Array2<f64>,
        labels: &[usize],
        indices: Vec<usize>,
        n_classes: usize,
    ) -> Result<()> {
        if indices.is_empty() {
            return Err(HybridError::Training("decision tree needs at least one sample".to_string()));
        }
        self.n_classes = n_classes;
        self.n_features = x.ncols();

        let mut rng = Xoshiro256PlusPlus::seed_from_u64(self.random_state);
        let root = self.build(x, labels, indices, 0, &mut rng);
        self.root = Some(root);
        Ok(())
    }

    fn build(
        &self,
        x: &Array2<f64>,
        labels: &[usize],
        mut indices: Vec<usize>,
        depth: usize,
        rng: &mut Xoshiro256PlusPlus,
    ) -> TreeNode {
        let n = indices.len();
        let mut counts = vec![0.0; self.n_classes];
        for &i in &indices {
            counts[labels[i]] += 1.0;
        }
        let impurity = gini(&counts, n as f64);

        let at_max_depth = self.max_depth.map_or(false, |d| depth >= d);
        if impurity <= 0.0 || at_max_depth || n < self.min_samples_split {
            return self.leaf(counts, n);
        }

        let features = self.candidate_features(rng);
        let best = features
            .iter()
            .filter_map(|&f| self.best_split_for_feature(x, labels, &mut indices, f, &counts))
            .fold(None::<SplitCandidate>, |best, cand| match best {
                Some(b) if b.score <= cand.score => Some(b),
                _ => Some(cand),
            });

        let Some(split) = best else {
            return self.leaf(counts, n);
        };

        let (left_idx, right_idx): (Vec<usize>, Vec<usize>) = indices
            .into_iter()
            .partition(|&i| x[[i, split.feature]] <= split.threshold);

        if left_idx.is_empty() || right_idx.is_empty() {
            return self.leaf(counts, n);
        }

        TreeNode::Split {
            feature: split.feature,
            threshold: split.threshold,
            left: Box::new(self.build(x, labels, left_idx, depth + 1, rng)),
            right: Box::new(self.build(x, labels, right_idx, depth + 1, rng)),
        }
    }

    fn leaf(&self, mut counts: Vec<f64>, n: usize) -> TreeNode {
        let total = n.max(1) as f64;
        counts.iter_mut().for_each(|c| *c /= total);
        TreeNode::Leaf { value: counts, n_samples: n }
    }

    fn candidate_features(&self, rng: &mut Xoshiro256PlusPlus) -> Vec<usize> {
        match self.max_features {
            Some(m) if m < self.n_features => {
                rand::seq::index::sample(rng, self.n_features, m.max(1)).into_vec()
            }
            _ => (0..self.n_features).collect(),
        }
    }

    /// Sweep sorted values, tracking left-side class counts.
    /// Score is the weighted Gini impurity of the two children.
    fn best_split_for_feature(
        &self,
        x: &Array2<f64>,
        labels: &[usize],
        indices: &mut [usize],
        feature: usize,
        total_counts: &[f64],
    ) -> Option<SplitCandidate> {
        sort_by_feature(x, indices, feature);

        let n = indices.len();
        let mut left = vec![0.0; self.n_classes];
        let mut best: Option<SplitCandidate> = None;

        for pos in 0..n - 1 {
            left[labels[indices[pos]]] += 1.0;

            let here = x[[indices[pos], feature]];
            let next = x[[indices[pos + 1], feature]];
            if next - here <= 1e-12 {
                continue;
            }

            let n_left = pos + 1;
            let n_right = n - n_left;
            if n_left < self.min_samples_leaf || n_right < self.min_samples_leaf {
                continue;
            }

            let right: Vec<f64> = total_counts.iter().zip(&left).map(|(t, l)| t - l).collect();
            let score = (n_left as f64 * gini(&left, n_left as f64)
                + n_right as f64 * gini(&right, n_right as f64))
                / n as f64;

            if best.as_ref().map_or(true, |b| score < b.score) {
                best = Some(SplitCandidate {
                    feature,
                    threshold: (here + next) / 2.0,
                    score,
                });
            }
        }

        best
    }

    pub fn depth(&self) -> usize {
        self.root.as_ref().map_or(0, TreeNode::depth)
    }

    pub fn n_leaves(&self) -> usize {
        self.root.as_ref().map_or(0, TreeNode::n_leaves)
    }
}

impl Classifier for DecisionTreeClassifier {
    fn fit(&mut self, x: &Array2<f64>, y: &ndarray::Array1<f64>, n_classes: usize) -> Result<()> {
        let labels = check_labels(y, n_classes)?;
        self.fit_indices(x, &labels, (0..x.nrows()).collect(), n_classes)
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let root = self.root.as_ref().ok_or(HybridError::ModelNotFitted)?;
        let mut out = Array2::zeros((x.nrows(), self.n_classes));
        for (i, row) in x.rows().into_iter().enumerate() {
            for (k, p) in root.leaf_value(row).iter().enumerate() {
                out[[i, k]] = *p;
            }
        }
        Ok(out)
    }
}

/// Squared-error regression tree with caller-computed leaf values
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegressionTree {
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    root: Option<TreeNode>,
}

impl RegressionTree {
    pub fn new(max_depth: usize) -> Self {
        Self {
            max_depth,
            min_samples_leaf: 1,
            root: None,
        }
    }

    /// Grow the tree on `target` restricted to `indices`. Each leaf's value is
    /// `leaf_value(samples_in_leaf)`.
    pub fn fit<F>(&mut self, x: &Array2<f64>, target: &[f64], indices: Vec<usize>, leaf_value: &F)
    where
        F: Fn(&[usize]) -> f64,
    {
        self.root = Some(self.build(x, target, indices, 0, leaf_value));
    }

    fn build<F>(
        &self,
        x: &Array2<f64>,
        target: &[f64],
        mut indices: Vec<usize>,
        depth: usize,
        leaf_value: &F,
    ) -> TreeNode
    where
        F: Fn(&[usize]) -> f64,
    {
        let n = indices.len();
        if depth >= self.max_depth || n < 2 * self.min_samples_leaf {
            return TreeNode::Leaf { value: vec![leaf_value(&indices)], n_samples: n };
        }

        let best = (0..x.ncols())
            .filter_map(|f| self.best_split_for_feature(x, target, &mut indices, f))
            .fold(None::<SplitCandidate>, |best, cand| match best {
                Some(b) if b.score <= cand.score => Some(b),
                _ => Some(cand),
            });

        let Some(split) = best else {
            return TreeNode::Leaf { value: vec![leaf_value(&indices)], n_samples: n };
        };

        let (left_idx, right_idx): (Vec<usize>, Vec<usize>) = indices
            .iter()
            .partition(|&&i| x[[i, split.feature]] <= split.threshold);

        if left_idx.is_empty() || right_idx.is_empty() {
            return TreeNode::Leaf { value: vec![leaf_value(&indices)], n_samples: n };
        }

        TreeNode::Split {
            feature: split.feature,
            threshold: split.threshold,
            left: Box::new(self.build(x, target, left_idx, depth + 1, leaf_value)),
            right: Box::new(self.build(x, target, right_idx, depth + 1, leaf_value)),
        }
    }

    /// Score is the summed squared error of the two children
    fn best_split_for_feature(
        &self,
        x: &Array2<f64>,
        target: &[f64],
        indices: &mut [usize],
        feature: usize,
    ) -> Option<SplitCandidate> {
        sort_by_feature(x, indices, feature);

        let n = indices.len();
        let total_sum: f64 = indices.iter().map(|&i| target[i]).sum();
        let total_sq: f64 = indices.iter().map(|&i| target[i] * target[i]).sum();
        let parent_sse = total_sq - total_sum * total_sum / n as f64;

        let mut sum_left = 0.0;
        let mut sq_left = 0.0;
        let mut best: Option<SplitCandidate> = None;

        for pos in 0..n - 1 {
            let t = target[indices[pos]];
            sum_left += t;
            sq_left += t * t;

            let here = x[[indices[pos], feature]];
            let next = x[[indices[pos + 1], feature]];
            if next - here <= 1e-12 {
                continue;
            }

            let n_left = (pos + 1) as f64;
            let n_right = (n - pos - 1) as f64;
            if (pos + 1) < self.min_samples_leaf || (n - pos - 1) < self.min_samples_leaf {
                continue;
            }

            let sum_right = total_sum - sum_left;
            let sq_right = total_sq - sq_left;
            let score = (sq_left - sum_left * sum_left / n_left)
                + (sq_right - sum_right * sum_right / n_right);

            if score < parent_sse - 1e-12 && best.as_ref().map_or(true, |b| score < b.score) {
                best = Some(SplitCandidate {
                    feature,
                    threshold: (here + next) / 2.0,
                    score,
                });
            }
        }

        best
    }

    pub fn predict_row(&self, sample: ArrayView1<f64>) -> f64 {
        self.root
            .as_ref()
            .map_or(0.0, |root| root.leaf_value(sample).first().copied().unwrap_or(0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array1};

    #[test]
    fn test_classifier_separates_classes() {
        let x = array![[1.0, 0.0], [2.0, 0.0], [3.0, 1.0], [10.0, 1.0], [11.0, 0.0], [12.0, 1.0]];
        let y = Array1::from(vec![0.0, 0.0, 0.0, 1.0, 1.0, 1.0]);

        let mut tree = DecisionTreeClassifier::default();
        tree.fit(&x, &y, 2).unwrap();

        assert_eq!(tree.predict(&x).unwrap(), y);
        assert_eq!(tree.depth(), 1);
        assert_eq!(tree.n_leaves(), 2);

        let proba = tree.predict_proba(&array![[0.0, 0.0]]).unwrap();
        assert_eq!(proba.row(0).to_vec(), vec![1.0, 0.0]);
    }

    #[test]
    fn test_max_depth_limits_growth() {
        let x = array![[1.0], [2.0], [3.0], [4.0], [5.0], [6.0]];
        let y = Array1::from(vec![0.0, 1.0, 0.0, 1.0, 0.0, 1.0]);
        let mut tree = DecisionTreeClassifier::default().with_max_depth(1);
        tree.fit(&x, &y, 2).unwrap();
        assert!(tree.depth() <= 1);

        let proba = tree.predict_proba(&x).unwrap();
        for row in proba.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_single_class_rejected() {
        let x = array![[1.0], [2.0]];
        let y = Array1::from(vec![0.0, 0.0]);
        let mut tree = DecisionTreeClassifier::default();
        assert!(matches!(tree.fit(&x, &y, 1), Err(HybridError::InsufficientClasses(1))));
    }

    #[test]
    fn test_regression_tree_leaf_values() {
        let x = array![[1.0], [2.0], [8.0], [9.0]];
        let target = [1.0, 1.0, 5.0, 5.0];
        let mut tree = RegressionTree::new(2);
        let mean = |idx: &[usize]| idx.iter().map(|&i| target[i]).sum::<f64>() / idx.len() as f64;
        tree.fit(&x, &target, vec![0, 1, 2, 3], &mean);

        assert_eq!(tree.predict_row(x.row(0)), 1.0);
        assert_eq!(tree.predict_row(x.row(3)), 5.0);
    }
}
