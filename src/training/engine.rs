//! Training engine: split, scale, fit the model battery, score

use super::metrics::ModelMetrics;
use super::split::{shuffle_split, stratified_split, TrainTestSplit};
use super::{Classifier, ModelKind, TrainingConfig};
use crate::error::{HybridError, Result};
use crate::preprocessing::{ProcessedData, StandardScaler};
use ndarray::{Array1, Array2};
use rayon::prelude::*;
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Cooperative cancellation flag shared with the trainer
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` once the token is set
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(HybridError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// A trained model, shareable across the ensemble and sessions
#[derive(Debug, Clone)]
pub struct FittedModel {
    pub kind: ModelKind,
    pub model: Arc<dyn Classifier>,
}

/// Outcome of one model in the battery
#[derive(Debug, Clone, PartialEq)]
pub struct ModelRecord {
    pub model: ModelKind,
    pub metrics: ModelMetrics,
    /// Why the model was zeroed, when it failed
    pub error: Option<String>,
}

impl ModelRecord {
    pub fn failed(model: ModelKind, error: impl Into<String>) -> Self {
        Self {
            model,
            metrics: ModelMetrics::zeroed(),
            error: Some(error.into()),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }
}

/// Wire form of one record: the metrics plus an optional `error`
#[derive(Serialize)]
struct RecordBody<'a> {
    #[serde(flatten)]
    metrics: &'a ModelMetrics,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
}

/// Metrics for every model of the battery, in battery order.
/// Serializes as a JSON object keyed by model name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainingResult {
    records: Vec<ModelRecord>,
}

impl TrainingResult {
    pub fn new(records: Vec<ModelRecord>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[ModelRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, kind: ModelKind) -> Option<&ModelRecord> {
        self.records.iter().find(|r| r.model == kind)
    }

    /// Highest accuracy; ties go to the earlier model
    pub fn best(&self) -> Option<&ModelRecord> {
        self.records.iter().fold(None, |best: Option<&ModelRecord>, r| match best {
            Some(b) if b.metrics.accuracy >= r.metrics.accuracy => Some(b),
            _ => Some(r),
        })
    }

    /// The `k` most accurate models. The sort is stable, so ties keep
    /// battery order.
    pub fn top_k(&self, k: usize) -> Vec<ModelKind> {
        let mut ranked: Vec<&ModelRecord> = self.records.iter().collect();
        ranked.sort_by(|a, b| {
            b.metrics
                .accuracy
                .partial_cmp(&a.metrics.accuracy)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        ranked.into_iter().take(k).map(|r| r.model).collect()
    }

    /// (min, max) accuracy across all records
    pub fn accuracy_range(&self) -> Option<(f64, f64)> {
        let mut accuracies = self.records.iter().map(|r| r.metrics.accuracy);
        let first = accuracies.next()?;
        Some(accuracies.fold((first, first), |(lo, hi), a| (lo.min(a), hi.max(a))))
    }
}

impl Serialize for TrainingResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.records.len()))?;
        for record in &self.records {
            map.serialize_entry(
                record.model.name(),
                &RecordBody {
                    metrics: &record.metrics,
                    error: record.error.as_deref(),
                },
            )?;
        }
        map.end()
    }
}

/// Everything one training run produced
#[derive(Debug, Clone, Default)]
pub struct TrainingOutcome {
    pub result: TrainingResult,
    /// Scaler fit on the training split
    pub scaler: Option<StandardScaler>,
    /// Successfully fitted models, in battery order
    pub models: Vec<FittedModel>,
    /// The held-out split, with unscaled features
    pub split: Option<TrainTestSplit>,
}

impl TrainingOutcome {
    pub fn fitted(&self, kind: ModelKind) -> Option<&FittedModel> {
        self.models.iter().find(|m| m.kind == kind)
    }
}

/// Scaled matrices handed to every model
struct PreparedSplit {
    x_train: Array2<f64>,
    x_test: Array2<f64>,
    y_train: Array1<f64>,
    y_test: Array1<f64>,
    n_classes: usize,
}

/// Trains the configured model battery on one preprocessed dataset
#[derive(Debug, Clone, Default)]
pub struct ModelTrainer {
    config: TrainingConfig,
}

impl ModelTrainer {
    pub fn new(config: TrainingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Split, scale and train every configured model.
    ///
    /// Never fails as a whole: a split failure zeroes every record, and a
    /// failing or panicking model zeroes only its own record.
    pub fn train(&self, data: &ProcessedData, is_classification: bool, cancel: &CancellationToken) -> TrainingOutcome {
        let start = Instant::now();
        let stratify = is_classification && self.config.stratify;

        let split = if stratify {
            stratified_split(&data.features, &data.target, self.config.test_size, self.config.random_seed)
        } else {
            shuffle_split(&data.features, &data.target, self.config.test_size, self.config.random_seed)
        };
        let split = match split {
            Ok(split) => split,
            Err(e) => {
                warn!(error = %e, "Train/test split failed; every model is zeroed");
                return self.all_failed(&e.to_string());
            }
        };

        let mut scaler = StandardScaler::new();
        let prepared = match self.prepare(&mut scaler, &split, data.n_classes()) {
            Ok(prepared) => prepared,
            Err(e) => {
                warn!(error = %e, "Feature scaling failed; every model is zeroed");
                return self.all_failed(&e.to_string());
            }
        };

        info!(
            train_rows = prepared.x_train.nrows(),
            test_rows = prepared.x_test.nrows(),
            features = prepared.x_train.ncols(),
            classes = prepared.n_classes,
            stratified = stratify,
            "Training model battery"
        );

        let outcomes: Vec<(ModelRecord, Option<FittedModel>)> = if self.config.parallel {
            self.config
                .models
                .par_iter()
                .map(|&kind| self.train_one(kind, &prepared, cancel))
                .collect()
        } else {
            self.config
                .models
                .iter()
                .map(|&kind| self.train_one(kind, &prepared, cancel))
                .collect()
        };

        let (records, fitted): (Vec<_>, Vec<_>) = outcomes.into_iter().unzip();
        let models: Vec<FittedModel> = fitted.into_iter().flatten().collect();

        info!(
            fitted = models.len(),
            total = records.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Model battery finished"
        );

        TrainingOutcome {
            result: TrainingResult::new(records),
            scaler: Some(scaler),
            models,
            split: Some(split),
        }
    }

    fn prepare(&self, scaler: &mut StandardScaler, split: &TrainTestSplit, n_classes: usize) -> Result<PreparedSplit> {
        let x_train = scaler.fit_transform(&split.x_train)?;
        let x_test = scaler.transform(&split.x_test)?;
        Ok(PreparedSplit {
            x_train,
            x_test,
            y_train: split.y_train.clone(),
            y_test: split.y_test.clone(),
            n_classes,
        })
    }

    fn all_failed(&self, error: &str) -> TrainingOutcome {
        let records = self
            .config
            .models
            .iter()
            .map(|&kind| ModelRecord::failed(kind, error))
            .collect();
        TrainingOutcome {
            result: TrainingResult::new(records),
            ..Default::default()
        }
    }

    /// Fit and score one model inside its own failure boundary
    fn train_one(
        &self,
        kind: ModelKind,
        data: &PreparedSplit,
        cancel: &CancellationToken,
    ) -> (ModelRecord, Option<FittedModel>) {
        if cancel.is_cancelled() {
            return (ModelRecord::failed(kind, HybridError::Cancelled.to_string()), None);
        }

        let start = Instant::now();
        let seed = self.config.random_seed;
        let attempt = catch_unwind(AssertUnwindSafe(|| -> Result<(Box<dyn Classifier>, ModelMetrics)> {
            let mut model = kind.build(seed);
            model.fit_cancellable(&data.x_train, &data.y_train, data.n_classes, cancel)?;
            let proba = model.predict_proba(&data.x_test)?;
            Ok((model, ModelMetrics::evaluate(&data.y_test, &proba)))
        }));
        let elapsed_ms = start.elapsed().as_millis() as u64;

        match attempt {
            Ok(Ok((model, metrics))) => {
                info!(
                    model = %kind,
                    accuracy = metrics.accuracy,
                    f1_score = metrics.f1_score,
                    elapsed_ms,
                    "Model trained"
                );
                let record = ModelRecord {
                    model: kind,
                    metrics,
                    error: None,
                };
                let fitted = FittedModel {
                    kind,
                    model: Arc::from(model),
                };
                (record, Some(fitted))
            }
            Ok(Err(HybridError::Cancelled)) => {
                info!(model = %kind, elapsed_ms, "Model training cancelled");
                (ModelRecord::failed(kind, HybridError::Cancelled.to_string()), None)
            }
            Ok(Err(e)) => {
                warn!(model = %kind, error = %e, elapsed_ms, "Model training failed");
                (ModelRecord::failed(kind, e.to_string()), None)
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                warn!(model = %kind, error = %message, elapsed_ms, "Model training panicked");
                (ModelRecord::failed(kind, message), None)
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "model panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blobs(n_per_class: usize, n_classes: usize) -> ProcessedData {
        let n = n_per_class * n_classes;
        let features = Array2::from_shape_fn((n, 2), |(i, j)| {
            let class = (i / n_per_class) as f64;
            class * 5.0 + ((i * 7 + j * 3) % 10) as f64 * 0.1
        });
        let target = Array1::from_shape_fn(n, |i| (i / n_per_class) as f64);
        ProcessedData {
            feature_names: vec!["a".to_string(), "b".to_string()],
            features,
            target,
            class_labels: (0..n_classes).map(|k| k.to_string()).collect(),
        }
    }

    fn fast_config() -> TrainingConfig {
        TrainingConfig::default().with_models(vec![
            ModelKind::LogisticRegression,
            ModelKind::DecisionTree,
            ModelKind::KNearestNeighbors,
        ])
    }

    #[test]
    fn test_records_follow_battery_order() {
        let trainer = ModelTrainer::new(fast_config());
        let outcome = trainer.train(&blobs(20, 3), true, &CancellationToken::new());

        let names: Vec<ModelKind> = outcome.result.records().iter().map(|r| r.model).collect();
        assert_eq!(names, fast_config().models);
        assert_eq!(outcome.models.len(), 3);
        assert!(outcome.result.records().iter().all(|r| r.metrics.accuracy > 0.9));
        assert!(outcome.scaler.is_some());
    }

    #[test]
    fn test_single_class_zeroes_every_record() {
        let mut data = blobs(20, 1);
        data.class_labels = vec!["only".to_string()];
        let trainer = ModelTrainer::new(fast_config());
        let outcome = trainer.train(&data, true, &CancellationToken::new());

        assert_eq!(outcome.result.len(), 3);
        assert!(outcome.result.records().iter().all(|r| r.metrics.is_zeroed() && r.is_failed()));
        assert!(outcome.models.is_empty());
    }

    #[test]
    fn test_split_failure_zeroes_every_record() {
        let mut data = blobs(5, 2);
        // one row of class 1 makes stratification impossible
        data.target[5] = 0.0;
        data.target[6] = 0.0;
        data.target[7] = 0.0;
        data.target[8] = 0.0;
        let trainer = ModelTrainer::new(fast_config());
        let outcome = trainer.train(&data, true, &CancellationToken::new());

        assert!(outcome.split.is_none());
        assert!(outcome.result.records().iter().all(|r| r.is_failed()));
    }

    #[test]
    fn test_cancelled_before_start() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let trainer = ModelTrainer::new(fast_config().with_parallel(false));
        let outcome = trainer.train(&blobs(20, 2), true, &cancel);
        for record in outcome.result.records() {
            assert_eq!(record.error.as_deref(), Some("training cancelled"));
        }
    }

    #[test]
    fn test_top_k_is_stable() {
        let mk = |kind, accuracy| ModelRecord {
            model: kind,
            metrics: ModelMetrics {
                accuracy,
                ..Default::default()
            },
            error: None,
        };
        let result = TrainingResult::new(vec![
            mk(ModelKind::RandomForest, 0.9),
            mk(ModelKind::XGBoost, 0.95),
            mk(ModelKind::NeuralNetwork, 0.9),
            mk(ModelKind::DecisionTree, 0.9),
        ]);
        assert_eq!(
            result.top_k(3),
            vec![ModelKind::XGBoost, ModelKind::RandomForest, ModelKind::NeuralNetwork]
        );
        assert_eq!(result.best().map(|r| r.model), Some(ModelKind::XGBoost));
        assert_eq!(result.accuracy_range(), Some((0.9, 0.95)));
    }

    #[test]
    fn test_result_serializes_as_named_map() {
        let result = TrainingResult::new(vec![
            ModelRecord::failed(ModelKind::RandomForest, "boom"),
            ModelRecord {
                model: ModelKind::XGBoost,
                metrics: ModelMetrics {
                    accuracy: 0.5,
                    ..Default::default()
                },
                error: None,
            },
        ]);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["Random Forest"]["accuracy"], 0.0);
        assert_eq!(json["Random Forest"]["error"], "boom");
        assert_eq!(json["XGBoost"]["accuracy"], 0.5);
        assert!(json["XGBoost"].get("error").is_none());
        assert!(json["XGBoost"].get("f1_score").is_some());
    }
}
