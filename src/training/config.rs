//! Training configuration

use serde::{Deserialize, Serialize};

use super::ModelKind;

/// Configuration for the classifier battery
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Fraction of rows held out for scoring
    pub test_size: f64,

    /// Seed for the split and every model
    pub random_seed: u64,

    /// Stratify the split by class label
    pub stratify: bool,

    /// Train models concurrently on the rayon pool
    pub parallel: bool,

    /// Models to train, in reporting order
    pub models: Vec<ModelKind>,

    /// Number of models kept for the ensemble
    pub top_k: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            test_size: 0.2,
            random_seed: 42,
            stratify: true,
            parallel: true,
            models: ModelKind::ALL.to_vec(),
            top_k: 3,
        }
    }
}

impl TrainingConfig {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.random_seed = seed;
        self
    }

    pub fn with_test_size(mut self, test_size: f64) -> Self {
        self.test_size = test_size;
        self
    }

    pub fn with_stratify(mut self, stratify: bool) -> Self {
        self.stratify = stratify;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_models(mut self, models: Vec<ModelKind>) -> Self {
        self.models = models;
        self
    }
}
