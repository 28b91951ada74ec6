//! K-Nearest Neighbors classifier

use ndarray::{Array1, Array2, ArrayView1};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

use super::{check_labels, Classifier};
use crate::error::{HybridError, Result};

/// K-Nearest Neighbors Classifier with uniform Euclidean votes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KNNClassifier {
    pub n_neighbors: usize,
    x_train: Option<Array2<f64>>,
    labels: Vec<usize>,
    n_classes: usize,
}

impl KNNClassifier {
    pub fn new(n_neighbors: usize) -> Self {
        Self {
            n_neighbors,
            x_train: None,
            labels: Vec::new(),
            n_classes: 0,
        }
    }
}

impl Classifier for KNNClassifier {
    /// Stores the training data
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>, n_classes: usize) -> Result<()> {
        if x.nrows() != y.len() {
            return Err(HybridError::ShapeError {
                expected: format!("y length = {}", x.nrows()),
                actual: format!("y length = {}", y.len()),
            });
        }
        if self.n_neighbors == 0 || x.nrows() < self.n_neighbors {
            return Err(HybridError::InvalidParameter {
                name: "n_neighbors".to_string(),
                value: self.n_neighbors.to_string(),
                reason: format!("expected 1 <= n_neighbors <= n_samples = {}", x.nrows()),
            });
        }
        self.labels = check_labels(y, n_classes)?;
        self.x_train = Some(x.clone());
        self.n_classes = n_classes;
        Ok(())
    }

    /// Neighbor vote fractions (parallelized over query rows)
    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let x_train = self.x_train.as_ref().ok_or(HybridError::ModelNotFitted)?;
        if x.ncols() != x_train.ncols() {
            return Err(HybridError::ShapeError {
                expected: format!("{} features", x_train.ncols()),
                actual: format!("{} features", x.ncols()),
            });
        }

        let probs: Vec<Vec<f64>> = (0..x.nrows())
            .into_par_iter()
            .map(|i| {
                let neighbors = find_k_nearest(x.row(i), x_train, &self.labels, self.n_neighbors);
                vote_fractions(&neighbors, self.n_classes)
            })
            .collect();

        let mut out = Array2::zeros((x.nrows(), self.n_classes));
        for (i, row) in probs.into_iter().enumerate() {
            for (k, p) in row.into_iter().enumerate() {
                out[[i, k]] = p;
            }
        }
        Ok(out)
    }
}

/// Max-heap entry keeping the k smallest distances.
/// Equal distances order by training row, so earlier rows win ties.
#[derive(PartialEq)]
struct DistLabel {
    dist: f64,
    row: usize,
    label: usize,
}

impl Eq for DistLabel {}
impl PartialOrd for DistLabel {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for DistLabel {
    fn cmp(&self, other: &Self) -> Ordering {
        self.dist
            .partial_cmp(&other.dist)
            .unwrap_or(Ordering::Equal)
            .then(self.row.cmp(&other.row))
    }
}

/// Find k nearest neighbors using a max-heap, O(n log k)
fn find_k_nearest(
    point: ArrayView1<f64>,
    x_train: &Array2<f64>,
    labels: &[usize],
    k: usize,
) -> Vec<usize> {
    let mut heap = BinaryHeap::with_capacity(k + 1);

    for (row, sample) in x_train.rows().into_iter().enumerate() {
        let entry = DistLabel {
            dist: euclidean(point, sample),
            row,
            label: labels[row],
        };
        if heap.len() < k {
            heap.push(entry);
        } else if let Some(top) = heap.peek() {
            if entry < *top {
                heap.pop();
                heap.push(entry);
            }
        }
    }

    heap.into_iter().map(|dl| dl.label).collect()
}

fn euclidean(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(ai, bi)| {
            let d = ai - bi;
            d * d
        })
        .sum::<f64>()
        .sqrt()
}

fn vote_fractions(neighbor_labels: &[usize], n_classes: usize) -> Vec<f64> {
    let mut counts = vec![0.0; n_classes];
    for &label in neighbor_labels {
        counts[label] += 1.0;
    }
    if !neighbor_labels.is_empty() {
        let total = neighbor_labels.len() as f64;
        counts.iter_mut().for_each(|c| *c /= total);
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn create_classification_data() -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_vec(
            (20, 2),
            vec![
                1.0, 1.0, 1.5, 1.5, 2.0, 2.0, 2.5, 2.5, 1.0, 2.0, //
                1.5, 2.5, 2.0, 1.5, 2.5, 1.0, 1.2, 1.8, 1.8, 1.2, //
                8.0, 8.0, 8.5, 8.5, 9.0, 9.0, 9.5, 9.5, 8.0, 9.0, //
                8.5, 9.5, 9.0, 8.5, 9.5, 8.0, 8.2, 8.8, 8.8, 8.2,
            ],
        )
        .unwrap();
        let y = Array1::from_shape_fn(20, |i| if i < 10 { 0.0 } else { 1.0 });
        (x, y)
    }

    #[test]
    fn test_knn_classifier() {
        let (x, y) = create_classification_data();
        let mut knn = KNNClassifier::new(3);
        knn.fit(&x, &y, 2).unwrap();
        assert_eq!(knn.predict(&x).unwrap(), y);
    }

    #[test]
    fn test_vote_fractions() {
        let x = array![[0.0], [1.0], [2.0], [10.0], [11.0]];
        let y = array![0.0, 0.0, 1.0, 1.0, 1.0];
        let mut knn = KNNClassifier::new(3);
        knn.fit(&x, &y, 2).unwrap();

        // nearest three to 0.5 are rows 0, 1, 2
        let proba = knn.predict_proba(&array![[0.5]]).unwrap();
        assert!((proba[[0, 0]] - 2.0 / 3.0).abs() < 1e-12);
        assert!((proba[[0, 1]] - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_too_few_samples() {
        let x = array![[0.0], [1.0], [2.0]];
        let y = array![0.0, 1.0, 1.0];
        let mut knn = KNNClassifier::new(5);
        assert!(matches!(knn.fit(&x, &y, 2), Err(HybridError::InvalidParameter { .. })));
    }
}
