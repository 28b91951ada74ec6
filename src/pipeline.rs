//! End-to-end analysis: profile, preprocess, train, ensemble, feedback, plot.
//!
//! [`AnalysisPipeline`] is shared by the HTTP server and the CLI. It returns
//! the serializable [`AnalysisReport`] together with the fitted
//! [`ModelBundle`] that a session keeps around.

use std::time::Instant;

use ndarray::Array1;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::data::Dataset;
use crate::ensemble::{select_top_models, SoftVotingEnsemble};
use crate::error::{HybridError, Result};
use crate::feedback::{Feedback, FeedbackSynthesizer};
use crate::preprocessing::{Preprocessor, StandardScaler};
use crate::profiling::{DatasetProfile, DatasetProfiler, DEFAULT_CLASSIFICATION_THRESHOLD};
use crate::reporting::{PlotBuilder, PlotStyle};
use crate::training::{
    CancellationToken, FittedModel, ModelKind, ModelTrainer, TrainTestSplit, TrainingConfig, TrainingResult,
};

/// Pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub plot_style: PlotStyle,
    /// Numeric targets with fewer distinct values are classification targets
    pub classification_threshold: usize,
    pub training: TrainingConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            plot_style: PlotStyle::default(),
            classification_threshold: DEFAULT_CLASSIFICATION_THRESHOLD,
            training: TrainingConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn with_plot_style(mut self, plot_style: PlotStyle) -> Self {
        self.plot_style = plot_style;
        self
    }

    pub fn with_classification_threshold(mut self, threshold: usize) -> Self {
        self.classification_threshold = threshold;
        self
    }

    pub fn with_training(mut self, training: TrainingConfig) -> Self {
        self.training = training;
        self
    }
}

/// Response body of a successful analysis
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub dataset_info: DatasetProfile,
    pub model_results: TrainingResult,
    pub feedback: Feedback,
    pub top_3_models: Vec<ModelKind>,
    /// Plotly figure as a JSON string
    pub plot_data: String,
    pub ensemble_created: bool,
}

/// Fitted artifacts of one analysis
#[derive(Debug, Clone)]
pub struct ModelBundle {
    pub preprocessor: Preprocessor,
    pub scaler: Option<StandardScaler>,
    pub models: Vec<FittedModel>,
    pub ensemble: Option<SoftVotingEnsemble>,
    pub split: Option<TrainTestSplit>,
}

impl ModelBundle {
    pub fn fitted(&self, kind: ModelKind) -> Option<&FittedModel> {
        self.models.iter().find(|m| m.kind == kind)
    }

    pub fn fitted_kinds(&self) -> Vec<ModelKind> {
        self.models.iter().map(|m| m.kind).collect()
    }

    /// Replace the ensemble with the named fitted models, in the given
    /// order. Fails if a name was never fitted.
    pub fn rebuild_ensemble(&mut self, names: &[ModelKind]) -> Result<Vec<ModelKind>> {
        let members = names
            .iter()
            .map(|kind| {
                self.fitted(*kind)
                    .cloned()
                    .ok_or_else(|| HybridError::Training(format!("model '{}' was not fitted", kind)))
            })
            .collect::<Result<Vec<_>>>()?;
        let ensemble = SoftVotingEnsemble::new(members)?;
        let kinds = ensemble.members();
        self.ensemble = Some(ensemble);
        Ok(kinds)
    }

    /// Class labels predicted by the ensemble for a dataset with the
    /// training layout
    pub fn predict(&self, dataset: &Dataset) -> Result<Vec<String>> {
        let ensemble = self.ensemble.as_ref().ok_or(HybridError::ModelNotFitted)?;
        let scaler = self.scaler.as_ref().ok_or(HybridError::ModelNotFitted)?;
        let features = scaler.transform(&self.preprocessor.transform(dataset)?)?;
        let predicted: Array1<f64> = ensemble.predict(&features)?;

        let labels = self.preprocessor.class_labels();
        predicted
            .iter()
            .map(|&class| {
                labels
                    .get(class as usize)
                    .cloned()
                    .ok_or_else(|| HybridError::Training(format!("class index {} has no label", class)))
            })
            .collect()
    }
}

/// Runs the analysis steps in order
#[derive(Debug, Clone, Default)]
pub struct AnalysisPipeline {
    config: PipelineConfig,
}

impl AnalysisPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Profile only
    pub fn profile(&self, dataset: &Dataset) -> Result<DatasetProfile> {
        DatasetProfiler::new(self.config.classification_threshold).profile(dataset)
    }

    /// Full analysis. Dataset-level problems (no target column, encoding
    /// failures) are errors; per-model failures are absorbed into the
    /// result.
    pub fn run(&self, dataset: &Dataset, cancel: &CancellationToken) -> Result<(AnalysisReport, ModelBundle)> {
        let start = Instant::now();

        let profile = self.profile(dataset)?;
        info!(
            rows = profile.n_rows(),
            columns = profile.n_cols(),
            target = %profile.target_column,
            classification = profile.is_classification,
            "Profiled dataset"
        );

        let (preprocessor, processed) = Preprocessor::fit_transform(dataset, &profile.target_column)?;
        debug!(
            features = processed.feature_names.len(),
            classes = processed.n_classes(),
            "Preprocessed dataset"
        );
        cancel.check()?;

        let outcome = ModelTrainer::new(self.config.training.clone()).train(
            &processed,
            profile.is_classification,
            cancel,
        );

        let top_models = select_top_models(&outcome.result, self.config.training.top_k);
        let ensemble = SoftVotingEnsemble::from_outcome(&outcome, &top_models);
        let ensemble_created = ensemble.is_some();

        let feedback = FeedbackSynthesizer::synthesize(&profile, &outcome.result);
        let plot_data = PlotBuilder::new(self.config.plot_style).build_json(&outcome.result, &top_models)?;

        info!(
            top_models = ?top_models.iter().map(|k| k.name()).collect::<Vec<_>>(),
            ensemble_created,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Analysis complete"
        );

        let report = AnalysisReport {
            success: true,
            session_id: None,
            dataset_info: profile,
            model_results: outcome.result,
            feedback,
            top_3_models: top_models,
            plot_data,
            ensemble_created,
        };
        let bundle = ModelBundle {
            preprocessor,
            scaler: outcome.scaler,
            models: outcome.models,
            ensemble,
            split: outcome.split,
        };

        Ok((report, bundle))
    }
}
