//! Hybrid ML - dataset analysis with a hybrid classifier ensemble
//!
//! An uploaded table is profiled, preprocessed and used to train a fixed
//! battery of eight classifiers. The three most accurate are combined into
//! a soft-voting ensemble, and the run is summarized as rule-based feedback
//! plus a Plotly chart specification.
//!
//! # Modules
//!
//! - [`data`] - CSV/Excel loading into a polars-backed [`data::Dataset`]
//! - [`profiling`] - Dataset profile and target inference
//! - [`preprocessing`] - Imputation, label encoding, scaling
//! - [`training`] - The classifier battery, split and metrics
//! - [`ensemble`] - Top-k selection and soft voting
//! - [`feedback`] - Quality warnings, insights and recommendations
//! - [`reporting`] - Chart payloads
//! - [`pipeline`] - The end-to-end analysis
//! - [`server`] - HTTP JSON API
//! - [`cli`] - Command-line interface

pub mod error;

pub mod data;
pub mod ensemble;
pub mod feedback;
pub mod pipeline;
pub mod preprocessing;
pub mod profiling;
pub mod reporting;
pub mod training;

pub mod cli;
pub mod server;

pub use error::{HybridError, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::data::{load_bytes, load_path, Dataset, FileFormat};
    pub use crate::ensemble::{select_top_models, SoftVotingEnsemble};
    pub use crate::error::{HybridError, Result};
    pub use crate::feedback::{Feedback, FeedbackSynthesizer};
    pub use crate::pipeline::{AnalysisPipeline, AnalysisReport, ModelBundle, PipelineConfig};
    pub use crate::preprocessing::{Preprocessor, ProcessedData, StandardScaler};
    pub use crate::profiling::{DatasetProfile, DatasetProfiler};
    pub use crate::reporting::{Figure, PlotBuilder, PlotStyle};
    pub use crate::training::{
        CancellationToken, Classifier, ModelKind, ModelMetrics, ModelTrainer, TrainingConfig, TrainingResult,
    };
}
