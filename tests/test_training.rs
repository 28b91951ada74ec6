//! Integration test: classifier battery end-to-end

use hybrid_ml::data::Dataset;
use hybrid_ml::ensemble::{select_top_models, SoftVotingEnsemble};
use hybrid_ml::preprocessing::{Preprocessor, ProcessedData};
use hybrid_ml::training::{CancellationToken, Classifier, ModelKind, ModelTrainer, TrainingConfig};
use ndarray::{Array1, Array2};
use polars::prelude::*;
use std::time::{Duration, Instant};

/// Three well separated blobs with a categorical label
fn three_class_df() -> DataFrame {
    let centers = [(0.0, 0.0), (6.0, 0.0), (0.0, 6.0)];
    let names = ["setosa", "versicolor", "virginica"];
    let mut x1 = Vec::new();
    let mut x2 = Vec::new();
    let mut species = Vec::new();
    for i in 0..45 {
        let c = i % 3;
        let jitter = (i / 3) as f64 * 0.07;
        x1.push(centers[c].0 + jitter);
        x2.push(centers[c].1 - jitter);
        species.push(names[c]);
    }
    df!("x1" => x1, "x2" => x2, "species" => species).unwrap()
}

fn processed(df: DataFrame, target: &str) -> ProcessedData {
    let dataset = Dataset::new(df).unwrap();
    Preprocessor::fit_transform(&dataset, target).unwrap().1
}

#[test]
fn test_each_model_fits_three_classes() {
    let data = processed(three_class_df(), "species");
    assert_eq!(data.n_classes(), 3);

    for kind in ModelKind::ALL {
        let mut model = kind.build(42);
        model
            .fit(&data.features, &data.target, 3)
            .unwrap_or_else(|e| panic!("{} failed to fit: {}", kind, e));

        let proba = model.predict_proba(&data.features).unwrap();
        assert_eq!(proba.dim(), (45, 3), "{}", kind);
        for row in proba.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-6, "{} rows must sum to 1", kind);
            assert!(row.iter().all(|p| (0.0..=1.0).contains(p)));
        }

        let predicted = model.predict(&data.features).unwrap();
        let correct = predicted.iter().zip(data.target.iter()).filter(|(p, t)| p == t).count();
        assert!(correct as f64 / 45.0 > 0.8, "{} accuracy too low: {}/45", kind, correct);
    }
}

#[test]
fn test_battery_reports_every_model() {
    let data = processed(three_class_df(), "species");
    let outcome = ModelTrainer::new(TrainingConfig::default()).train(&data, true, &CancellationToken::new());

    let names: Vec<ModelKind> = outcome.result.records().iter().map(|r| r.model).collect();
    assert_eq!(names, ModelKind::ALL.to_vec());
    assert_eq!(outcome.models.len(), 8);
    assert!(outcome.scaler.as_ref().unwrap().is_fitted());

    let split = outcome.split.as_ref().unwrap();
    assert_eq!(split.x_test.nrows(), 9);
    assert_eq!(split.x_train.nrows(), 36);

    for record in outcome.result.records() {
        assert!(record.error.is_none(), "{}: {:?}", record.model, record.error);
        let m = record.metrics;
        for value in [m.accuracy, m.precision, m.recall, m.f1_score, m.roc_auc] {
            assert!((0.0..=1.0).contains(&value));
        }
    }

    let top = select_top_models(&outcome.result, 3);
    assert_eq!(top.len(), 3);
    let ensemble = SoftVotingEnsemble::from_outcome(&outcome, &top).unwrap();
    assert_eq!(ensemble.members(), top);

    let x_test = outcome.scaler.as_ref().unwrap().transform(&split.x_test).unwrap();
    let predicted = ensemble.predict(&x_test).unwrap();
    assert_eq!(predicted, split.y_test);
}

#[test]
fn test_single_class_target_zeroes_everything() {
    let df = df!(
        "a" => (0..20).map(|i| i as f64).collect::<Vec<_>>(),
        "b" => (0..20).map(|i| (i * 3 % 7) as f64).collect::<Vec<_>>(),
        "label" => vec!["only"; 20]
    )
    .unwrap();
    let data = processed(df, "label");
    let outcome = ModelTrainer::new(TrainingConfig::default()).train(&data, true, &CancellationToken::new());

    assert_eq!(outcome.result.len(), 8);
    assert!(outcome.models.is_empty());
    for record in outcome.result.records() {
        assert!(record.is_failed());
        assert!(record.metrics.is_zeroed());
    }

    let top = select_top_models(&outcome.result, 3);
    assert_eq!(
        top,
        vec![ModelKind::RandomForest, ModelKind::XGBoost, ModelKind::NeuralNetwork]
    );
    assert!(SoftVotingEnsemble::from_outcome(&outcome, &top).is_none());
}

#[test]
fn test_cancelled_battery() {
    let data = processed(three_class_df(), "species");
    let cancel = CancellationToken::new();
    cancel.cancel();
    let outcome = ModelTrainer::new(TrainingConfig::default()).train(&data, true, &cancel);

    assert!(outcome.models.is_empty());
    for record in outcome.result.records() {
        assert_eq!(record.error.as_deref(), Some("training cancelled"));
    }
}

/// Labels with no learnable structure keep the iterative models busy
fn noisy_data(n_rows: usize, n_features: usize) -> ProcessedData {
    let features = Array2::from_shape_fn((n_rows, n_features), |(i, j)| {
        ((i * 7919 + j * 104_729) % 1000) as f64 / 100.0
    });
    let target = Array1::from_shape_fn(n_rows, |i| (((i * 2_654_435_761) >> 7) & 1) as f64);
    ProcessedData {
        feature_names: (0..n_features).map(|j| format!("f{}", j)).collect(),
        features,
        target,
        class_labels: vec!["no".to_string(), "yes".to_string()],
    }
}

#[test]
fn test_cancel_stops_models_mid_fit() {
    let data = noisy_data(2000, 10);
    let config = TrainingConfig::default().with_models(vec![
        ModelKind::RandomForest,
        ModelKind::XGBoost,
        ModelKind::NeuralNetwork,
        ModelKind::GradientBoosting,
    ]);

    let cancel = CancellationToken::new();
    let canceller = {
        let cancel = cancel.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            cancel.cancel();
        })
    };
    let start = Instant::now();
    let outcome = ModelTrainer::new(config).train(&data, true, &cancel);
    let elapsed = start.elapsed();
    canceller.join().unwrap();

    // a thousand epochs on random labels cannot finish in 50ms
    let mlp = outcome.result.get(ModelKind::NeuralNetwork).unwrap();
    assert_eq!(mlp.error.as_deref(), Some("training cancelled"));
    assert!(outcome.fitted(ModelKind::NeuralNetwork).is_none());

    for record in outcome.result.records() {
        match &record.error {
            None => assert!(outcome.fitted(record.model).is_some()),
            Some(error) => {
                assert_eq!(error, "training cancelled", "{}", record.model);
                assert!(record.metrics.is_zeroed());
            }
        }
    }
    assert!(elapsed < Duration::from_secs(30), "cancel took {:?}", elapsed);
}

#[test]
fn test_sequential_runs_are_deterministic() {
    let data = processed(three_class_df(), "species");
    let config = TrainingConfig::default().with_parallel(false).with_models(vec![
        ModelKind::LogisticRegression,
        ModelKind::DecisionTree,
        ModelKind::KNearestNeighbors,
        ModelKind::NeuralNetwork,
    ]);

    let first = ModelTrainer::new(config.clone()).train(&data, true, &CancellationToken::new());
    let second = ModelTrainer::new(config).train(&data, true, &CancellationToken::new());
    assert_eq!(first.result, second.result);
}

#[test]
fn test_knn_needs_enough_rows() {
    let x = Array2::from_shape_vec((3, 1), vec![0.0, 1.0, 2.0]).unwrap();
    let y = ndarray::array![0.0, 1.0, 1.0];
    let mut knn = ModelKind::KNearestNeighbors.build(42);
    assert!(knn.fit(&x, &y, 2).is_err());
}
