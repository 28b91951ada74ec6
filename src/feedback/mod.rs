//! Rule-based feedback on dataset quality and model performance.
//!
//! Every rule is evaluated independently against the profile and the
//! training result; the report carries the rendered messages.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::profiling::DatasetProfile;
use crate::training::TrainingResult;

/// Average missing percentage above which imputation is suggested
pub const HIGH_MISSING_PERCENTAGE: f64 = 10.0;

/// Fewer numeric columns than this triggers a feature warning
pub const MIN_NUMERIC_FEATURES: usize = 2;

/// Best accuracy below this is reported as weak
pub const LOW_ACCURACY: f64 = 0.7;

/// Best accuracy above this earns an insight
pub const EXCELLENT_ACCURACY: f64 = 0.9;

/// Advice attached to every report
pub const RECOMMENDATIONS: [&str; 4] = [
    "Consider feature scaling for better model performance",
    "Try ensemble methods for improved accuracy",
    "Perform cross-validation for more robust evaluation",
    "Consider feature selection to reduce overfitting",
];

/// Numeric/categorical column counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataTypeCounts {
    pub numeric: usize,
    pub categorical: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetQuality {
    pub size: String,
    pub missing_data: String,
    pub duplicates: String,
    pub memory_usage: String,
    pub data_types: DataTypeCounts,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AccuracyRange {
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelPerformance {
    pub best_model: String,
    pub best_accuracy: f64,
    pub model_count: usize,
    pub accuracy_range: AccuracyRange,
}

/// The feedback report returned with every analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feedback {
    pub dataset_quality: DatasetQuality,
    pub model_performance: ModelPerformance,
    pub warnings: Vec<String>,
    pub insights: Vec<String>,
    pub recommendations: Vec<String>,
}

/// A triggered warning rule
#[derive(Debug, Clone, PartialEq)]
pub enum FeedbackWarning {
    HighMissingness { average_percentage: f64 },
    DuplicateRows { count: usize },
    FewNumericFeatures { count: usize },
    LowAccuracy { best_accuracy: f64 },
}

impl fmt::Display for FeedbackWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedbackWarning::HighMissingness { .. } => write!(
                f,
                "High percentage of missing values detected. Consider data imputation strategies."
            ),
            FeedbackWarning::DuplicateRows { count } => {
                write!(f, "Found {} duplicate rows. Consider removing duplicates.", count)
            }
            FeedbackWarning::FewNumericFeatures { .. } => {
                write!(f, "Limited numeric features. Consider feature engineering.")
            }
            FeedbackWarning::LowAccuracy { .. } => write!(
                f,
                "Model performance is below 70%. Consider feature engineering or more data."
            ),
        }
    }
}

/// Builds [`Feedback`] from a profile and a training result
pub struct FeedbackSynthesizer;

impl FeedbackSynthesizer {
    pub fn synthesize(profile: &DatasetProfile, result: &TrainingResult) -> Feedback {
        let average_missing = profile.average_missing_percentage();

        let dataset_quality = DatasetQuality {
            size: format!("{} rows, {} columns", profile.n_rows(), profile.n_cols()),
            missing_data: format!("{:.1}% missing values on average", average_missing),
            duplicates: format!("{} duplicate rows", profile.duplicate_rows),
            memory_usage: format!("{:.2} MB", profile.memory_usage as f64 / 1024.0 / 1024.0),
            data_types: DataTypeCounts {
                numeric: profile.numeric_columns.len(),
                categorical: profile.categorical_columns.len(),
            },
        };

        let (best_model, best_accuracy) = result
            .best()
            .map(|r| (r.model.name().to_string(), r.metrics.accuracy))
            .unwrap_or_default();
        let (min, max) = result.accuracy_range().unwrap_or((0.0, 0.0));

        let model_performance = ModelPerformance {
            best_model,
            best_accuracy,
            model_count: result.len(),
            accuracy_range: AccuracyRange { min, max },
        };

        let warnings = Self::warnings(profile, best_accuracy)
            .iter()
            .map(ToString::to_string)
            .collect();

        let mut insights = Vec::new();
        if best_accuracy > EXCELLENT_ACCURACY {
            insights.push("Excellent model performance achieved!".to_string());
        }

        Feedback {
            dataset_quality,
            model_performance,
            warnings,
            insights,
            recommendations: RECOMMENDATIONS.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Triggered warning rules, in rule order
    pub fn warnings(profile: &DatasetProfile, best_accuracy: f64) -> Vec<FeedbackWarning> {
        let mut warnings = Vec::new();

        let average_percentage = profile.average_missing_percentage();
        if average_percentage > HIGH_MISSING_PERCENTAGE {
            warnings.push(FeedbackWarning::HighMissingness { average_percentage });
        }
        if profile.duplicate_rows > 0 {
            warnings.push(FeedbackWarning::DuplicateRows {
                count: profile.duplicate_rows,
            });
        }
        if profile.numeric_columns.len() < MIN_NUMERIC_FEATURES {
            warnings.push(FeedbackWarning::FewNumericFeatures {
                count: profile.numeric_columns.len(),
            });
        }
        if best_accuracy < LOW_ACCURACY {
            warnings.push(FeedbackWarning::LowAccuracy { best_accuracy });
        }

        warnings
    }
}
