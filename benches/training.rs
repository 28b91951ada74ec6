use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use hybrid_ml::data::Dataset;
use hybrid_ml::pipeline::{AnalysisPipeline, PipelineConfig};
use hybrid_ml::preprocessing::{Preprocessor, ProcessedData};
use hybrid_ml::training::{CancellationToken, ModelKind, TrainingConfig};
use polars::prelude::*;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

fn create_classification_data(n_rows: usize, n_features: usize) -> DataFrame {
    let mut rng = ChaCha8Rng::seed_from_u64(42);

    let features: Vec<Vec<f64>> = (0..n_features)
        .map(|_| (0..n_rows).map(|_| rng.gen::<f64>() * 10.0).collect())
        .collect();

    // Label from a noisy linear score over the first three features
    let labels: Vec<&str> = (0..n_rows)
        .map(|row| {
            let score: f64 = features.iter().take(3).map(|f| f[row]).sum();
            if score + rng.gen::<f64>() > 15.5 {
                "positive"
            } else {
                "negative"
            }
        })
        .collect();

    let mut columns: Vec<Column> = features
        .into_iter()
        .enumerate()
        .map(|(i, values)| Series::new(format!("feature_{}", i).into(), values).into())
        .collect();
    columns.push(Series::new("label".into(), labels).into());
    DataFrame::new(columns).unwrap()
}

fn processed(n_rows: usize) -> ProcessedData {
    let dataset = Dataset::new(create_classification_data(n_rows, 8)).unwrap();
    Preprocessor::fit_transform(&dataset, "label").unwrap().1
}

fn bench_models(c: &mut Criterion) {
    let mut group = c.benchmark_group("fit");
    group.sample_size(10);

    let data = processed(1000);
    for kind in ModelKind::ALL {
        group.bench_with_input(BenchmarkId::new("model", kind.name()), &data, |b, data| {
            b.iter(|| {
                let mut model = kind.build(42);
                model
                    .fit(black_box(&data.features), black_box(&data.target), 2)
                    .unwrap();
            })
        });
    }

    group.finish();
}

fn bench_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("pipeline");
    group.sample_size(10);

    for n_rows in [500, 2000].iter() {
        let dataset = Dataset::new(create_classification_data(*n_rows, 8)).unwrap();
        let pipeline = AnalysisPipeline::new(
            PipelineConfig::default().with_training(TrainingConfig::default().with_models(vec![
                ModelKind::RandomForest,
                ModelKind::LogisticRegression,
                ModelKind::DecisionTree,
                ModelKind::KNearestNeighbors,
            ])),
        );

        group.bench_with_input(BenchmarkId::new("run", n_rows), &dataset, |b, dataset| {
            b.iter(|| pipeline.run(black_box(dataset), &CancellationToken::new()).unwrap())
        });
    }

    group.finish();
}

criterion_group!(benches, bench_models, bench_pipeline);
criterion_main!(benches);
