//! Classification metrics
//!
//! Precision, recall and F1 are support-weighted averages over the labels seen
//! in either the truth or the predictions; a zero denominator counts as 0.
//! ROC-AUC is one-vs-rest, weighted by class prevalence.

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Scores of one model on the held-out split
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub roc_auc: f64,
}

impl ModelMetrics {
    /// Record for a model that failed to fit or score
    pub fn zeroed() -> Self {
        Self::default()
    }

    /// Score probabilities against true class indices.
    /// Predictions are the most probable class per row.
    pub fn evaluate(y_true: &Array1<f64>, proba: &Array2<f64>) -> Self {
        let y_pred = super::argmax_rows(proba);
        let (precision, recall, f1_score) = weighted_precision_recall_f1(y_true, &y_pred);
        Self {
            accuracy: sanitize(accuracy(y_true, &y_pred)),
            precision: sanitize(precision),
            recall: sanitize(recall),
            f1_score: sanitize(f1_score),
            roc_auc: roc_auc_ovr_weighted(y_true, proba).map_or(0.0, sanitize),
        }
    }

    pub fn is_zeroed(&self) -> bool {
        *self == Self::zeroed()
    }
}

fn sanitize(v: f64) -> f64 {
    if v.is_finite() {
        v.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

pub fn accuracy(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> f64 {
    if y_true.is_empty() {
        return 0.0;
    }
    let correct = y_true
        .iter()
        .zip(y_pred.iter())
        .filter(|(t, p)| (*t - *p).abs() < 0.5)
        .count();
    correct as f64 / y_true.len() as f64
}

/// Support-weighted (precision, recall, f1)
pub fn weighted_precision_recall_f1(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> (f64, f64, f64) {
    let labels: BTreeSet<i64> = y_true
        .iter()
        .chain(y_pred.iter())
        .map(|&v| v as i64)
        .collect();

    let total = y_true.len() as f64;
    if total == 0.0 {
        return (0.0, 0.0, 0.0);
    }

    let mut precision = 0.0;
    let mut recall = 0.0;
    let mut f1 = 0.0;

    for label in labels {
        let mut tp = 0.0;
        let mut fp = 0.0;
        let mut fn_ = 0.0;
        for (&t, &p) in y_true.iter().zip(y_pred.iter()) {
            let is_true = t as i64 == label;
            let is_pred = p as i64 == label;
            match (is_true, is_pred) {
                (true, true) => tp += 1.0,
                (false, true) => fp += 1.0,
                (true, false) => fn_ += 1.0,
                (false, false) => {}
            }
        }

        let support = tp + fn_;
        let p = if tp + fp > 0.0 { tp / (tp + fp) } else { 0.0 };
        let r = if support > 0.0 { tp / support } else { 0.0 };
        let f = if p + r > 0.0 { 2.0 * p * r / (p + r) } else { 0.0 };

        let weight = support / total;
        precision += weight * p;
        recall += weight * r;
        f1 += weight * f;
    }

    (precision, recall, f1)
}

/// Area under the ROC curve via the rank-sum statistic, with tied scores
/// sharing their average rank. `None` unless both outcomes occur.
pub fn binary_auc(positive: &[bool], scores: &[f64]) -> Option<f64> {
    let n_pos = positive.iter().filter(|p| **p).count();
    let n_neg = positive.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return None;
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].partial_cmp(&scores[b]).unwrap_or(std::cmp::Ordering::Equal));

    let mut ranks = vec![0.0; scores.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && scores[order[j + 1]] == scores[order[i]] {
            j += 1;
        }
        // ranks are 1-based
        let avg = (i + j) as f64 / 2.0 + 1.0;
        for k in i..=j {
            ranks[order[k]] = avg;
        }
        i = j + 1;
    }

    let rank_sum: f64 = ranks
        .iter()
        .zip(positive)
        .filter(|(_, p)| **p)
        .map(|(r, _)| r)
        .sum();
    let n_pos = n_pos as f64;
    let n_neg = n_neg as f64;
    Some((rank_sum - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg))
}

/// One-vs-rest ROC-AUC weighted by class prevalence.
///
/// With two probability columns this is the binary AUC of the second one.
/// Undefined (`None`) when the truth holds a single class or lacks any class
/// the probabilities cover.
pub fn roc_auc_ovr_weighted(y_true: &Array1<f64>, proba: &Array2<f64>) -> Option<f64> {
    let n_classes = proba.ncols();
    if y_true.is_empty() || n_classes < 2 || proba.nrows() != y_true.len() {
        return None;
    }

    let present: BTreeSet<usize> = y_true.iter().map(|&v| v as usize).collect();
    if present.len() < 2 {
        return None;
    }

    if n_classes == 2 {
        let positive: Vec<bool> = y_true.iter().map(|&v| v as usize == 1).collect();
        let scores = proba.column(1).to_vec();
        return binary_auc(&positive, &scores);
    }

    if present.len() != n_classes {
        return None;
    }

    let total = y_true.len() as f64;
    let mut weighted = 0.0;
    for k in 0..n_classes {
        let positive: Vec<bool> = y_true.iter().map(|&v| v as usize == k).collect();
        let prevalence = positive.iter().filter(|p| **p).count() as f64 / total;
        let scores = proba.column(k).to_vec();
        weighted += prevalence * binary_auc(&positive, &scores)?;
    }
    Some(weighted)
}
