//! Train/test splitting

use crate::error::{HybridError, Result};
use ndarray::{Array1, Array2, Axis};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use std::collections::BTreeMap;

/// Held-out split of a feature matrix and its labels
#[derive(Debug, Clone)]
pub struct TrainTestSplit {
    pub x_train: Array2<f64>,
    pub x_test: Array2<f64>,
    pub y_train: Array1<f64>,
    pub y_test: Array1<f64>,
    pub train_indices: Vec<usize>,
    pub test_indices: Vec<usize>,
}

impl TrainTestSplit {
    fn from_indices(
        x: &Array2<f64>,
        y: &Array1<f64>,
        train_indices: Vec<usize>,
        test_indices: Vec<usize>,
    ) -> Self {
        Self {
            x_train: x.select(Axis(0), &train_indices),
            x_test: x.select(Axis(0), &test_indices),
            y_train: y.select(Axis(0), &train_indices),
            y_test: y.select(Axis(0), &test_indices),
            train_indices,
            test_indices,
        }
    }
}

fn split_sizes(n: usize, test_size: f64) -> Result<(usize, usize)> {
    if !(test_size > 0.0 && test_size < 1.0) {
        return Err(HybridError::InvalidParameter {
            name: "test_size".to_string(),
            value: test_size.to_string(),
            reason: "must be between 0 and 1".to_string(),
        });
    }
    let n_test = (test_size * n as f64).ceil() as usize;
    if n < 2 || n_test == 0 || n_test >= n {
        return Err(HybridError::Split(format!(
            "cannot split {} samples with test_size {}",
            n, test_size
        )));
    }
    Ok((n - n_test, n_test))
}

/// Shuffled split that ignores labels
pub fn shuffle_split(
    x: &Array2<f64>,
    y: &Array1<f64>,
    test_size: f64,
    seed: u64,
) -> Result<TrainTestSplit> {
    let n = x.nrows();
    let (_, n_test) = split_sizes(n, test_size)?;

    let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
    let mut indices: Vec<usize> = (0..n).collect();
    indices.shuffle(&mut rng);

    let test = indices[..n_test].to_vec();
    let train = indices[n_test..].to_vec();
    Ok(TrainTestSplit::from_indices(x, y, train, test))
}

/// Split preserving class proportions in both halves.
///
/// Test rows per class are allocated proportionally to class size, with the
/// rows left over from rounding going to the largest fractional shares.
pub fn stratified_split(
    x: &Array2<f64>,
    y: &Array1<f64>,
    test_size: f64,
    seed: u64,
) -> Result<TrainTestSplit> {
    let n = x.nrows();
    let (n_train, n_test) = split_sizes(n, test_size)?;

    let mut groups: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
    for (i, &label) in y.iter().enumerate() {
        groups.entry(label as i64).or_default().push(i);
    }
    let n_classes = groups.len();

    if let Some(smallest) = groups.values().map(Vec::len).min() {
        if smallest < 2 {
            return Err(HybridError::Split(
                "the least populated class has only 1 member; every class needs at least 2".to_string(),
            ));
        }
    }
    if n_test < n_classes || n_train < n_classes {
        return Err(HybridError::Split(format!(
            "train size {} and test size {} must each be at least the number of classes {}",
            n_train, n_test, n_classes
        )));
    }

    let counts: Vec<usize> = groups.values().map(Vec::len).collect();
    let allocation = allocate_test_counts(&counts, n_test);

    let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
    let mut train = Vec::with_capacity(n_train);
    let mut test = Vec::with_capacity(n_test);
    for (members, &take) in groups.values().zip(&allocation) {
        let mut members = members.clone();
        members.shuffle(&mut rng);
        test.extend_from_slice(&members[..take]);
        train.extend_from_slice(&members[take..]);
    }
    train.shuffle(&mut rng);
    test.shuffle(&mut rng);

    Ok(TrainTestSplit::from_indices(x, y, train, test))
}

/// Proportional allocation of `n_test` rows over classes, keeping at least
/// one row of every class on the training side.
fn allocate_test_counts(counts: &[usize], n_test: usize) -> Vec<usize> {
    let n: usize = counts.iter().sum();
    let exact: Vec<f64> = counts
        .iter()
        .map(|&c| n_test as f64 * c as f64 / n as f64)
        .collect();
    let mut alloc: Vec<usize> = exact
        .iter()
        .zip(counts)
        .map(|(e, &c)| (e.floor() as usize).min(c - 1))
        .collect();

    let mut order: Vec<usize> = (0..counts.len()).collect();
    order.sort_by(|&a, &b| {
        let fa = exact[a] - exact[a].floor();
        let fb = exact[b] - exact[b].floor();
        fb.partial_cmp(&fa).unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut remaining = n_test.saturating_sub(alloc.iter().sum());
    while remaining > 0 {
        let mut progressed = false;
        for &k in &order {
            if remaining == 0 {
                break;
            }
            if alloc[k] + 1 < counts[k] {
                alloc[k] += 1;
                remaining -= 1;
                progressed = true;
            }
        }
        if !progressed {
            break;
        }
    }
    alloc
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labelled(counts: &[usize]) -> (Array2<f64>, Array1<f64>) {
        let labels: Vec<f64> = counts
            .iter()
            .enumerate()
            .flat_map(|(k, &c)| std::iter::repeat(k as f64).take(c))
            .collect();
        let n = labels.len();
        let x = Array2::from_shape_fn((n, 2), |(i, j)| (i * 2 + j) as f64);
        (x, Array1::from(labels))
    }

    fn count(y: &Array1<f64>, label: f64) -> usize {
        y.iter().filter(|&&v| v == label).count()
    }

    #[test]
    fn test_stratified_preserves_proportions() {
        let (x, y) = labelled(&[50, 50, 50]);
        let split = stratified_split(&x, &y, 0.2, 42).unwrap();

        assert_eq!(split.x_test.nrows(), 30);
        assert_eq!(split.x_train.nrows(), 120);
        for k in 0..3 {
            assert_eq!(count(&split.y_test, k as f64), 10);
        }
    }

    #[test]
    fn test_split_is_disjoint_and_complete() {
        let (x, y) = labelled(&[7, 13]);
        let split = stratified_split(&x, &y, 0.2, 42).unwrap();
        let mut all: Vec<usize> = split
            .train_indices
            .iter()
            .chain(split.test_indices.iter())
            .copied()
            .collect();
        all.sort();
        assert_eq!(all, (0..20).collect::<Vec<_>>());
        assert_eq!(split.test_indices.len(), 4);
    }

    #[test]
    fn test_deterministic_for_seed() {
        let (x, y) = labelled(&[20, 20]);
        let a = stratified_split(&x, &y, 0.2, 42).unwrap();
        let b = stratified_split(&x, &y, 0.2, 42).unwrap();
        assert_eq!(a.test_indices, b.test_indices);
    }

    #[test]
    fn test_singleton_class_rejected() {
        let (x, y) = labelled(&[10, 1]);
        assert!(matches!(stratified_split(&x, &y, 0.2, 42), Err(HybridError::Split(_))));
    }

    #[test]
    fn test_too_many_classes_for_test_size() {
        let (x, y) = labelled(&[2, 2, 2, 2, 2]);
        // ceil(0.2 * 10) = 2 test rows for 5 classes
        assert!(stratified_split(&x, &y, 0.2, 42).is_err());
    }

    #[test]
    fn test_shuffle_split_sizes() {
        let (x, y) = labelled(&[9, 1]);
        let split = shuffle_split(&x, &y, 0.2, 1).unwrap();
        assert_eq!(split.x_test.nrows(), 2);
        assert_eq!(split.y_train.len(), 8);
    }

    #[test]
    fn test_allocation_rounding() {
        assert_eq!(allocate_test_counts(&[7, 13], 4), vec![1, 3]);
        assert_eq!(allocate_test_counts(&[2, 2], 2), vec![1, 1]);
    }
}
