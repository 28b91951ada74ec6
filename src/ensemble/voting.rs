//! Soft-voting ensemble over fitted classifiers

use crate::error::{HybridError, Result};
use crate::training::{argmax_rows, FittedModel, ModelKind, TrainingOutcome, TrainingResult};
use ndarray::{Array1, Array2};

/// The `k` most accurate models, ties kept in battery order
pub fn select_top_models(result: &TrainingResult, k: usize) -> Vec<ModelKind> {
    result.top_k(k)
}

/// Averages member class probabilities, optionally weighted
#[derive(Debug, Clone)]
pub struct SoftVotingEnsemble {
    members: Vec<FittedModel>,
    /// Normalized to sum to 1
    weights: Vec<f64>,
}

impl SoftVotingEnsemble {
    /// Equal-weight ensemble. Fails without members.
    pub fn new(members: Vec<FittedModel>) -> Result<Self> {
        if members.is_empty() {
            return Err(HybridError::Training("No models provided for the ensemble".to_string()));
        }
        let n = members.len();
        Ok(Self {
            members,
            weights: vec![1.0 / n as f64; n],
        })
    }

    /// Set member weights
    pub fn with_weights(mut self, weights: Vec<f64>) -> Result<Self> {
        let weight_sum: f64 = weights.iter().sum();
        if weights.len() != self.members.len() || !(weight_sum > 0.0) || weights.iter().any(|w| *w < 0.0) {
            return Err(HybridError::InvalidParameter {
                name: "weights".to_string(),
                value: format!("{:?}", weights),
                reason: format!("expected {} non-negative weights with a positive sum", self.members.len()),
            });
        }
        self.weights = weights.iter().map(|w| w / weight_sum).collect();
        Ok(self)
    }

    /// Ensemble of the named models that were fitted, in the given order.
    /// `None` when none of them were.
    pub fn from_outcome(outcome: &TrainingOutcome, names: &[ModelKind]) -> Option<Self> {
        let members: Vec<FittedModel> = names
            .iter()
            .filter_map(|kind| outcome.fitted(*kind).cloned())
            .collect();
        Self::new(members).ok()
    }

    pub fn members(&self) -> Vec<ModelKind> {
        self.members.iter().map(|m| m.kind).collect()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Weighted mean of the members' probabilities
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let mut total: Option<Array2<f64>> = None;
        for (member, &weight) in self.members.iter().zip(&self.weights) {
            let proba = member.model.predict_proba(x)? * weight;
            total = Some(match total {
                None => proba,
                Some(acc) => {
                    if acc.dim() != proba.dim() {
                        return Err(HybridError::ShapeError {
                            expected: format!("{:?}", acc.dim()),
                            actual: format!("{:?}", proba.dim()),
                        });
                    }
                    acc + proba
                }
            });
        }
        total.ok_or_else(|| HybridError::Training("ensemble has no members".to_string()))
    }

    /// Most probable class index per row
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        Ok(argmax_rows(&self.predict_proba(x)?))
    }
}
