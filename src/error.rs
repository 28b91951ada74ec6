//! Error types for the analysis pipeline

use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, HybridError>;

/// Main error type for the crate
#[derive(Error, Debug)]
pub enum HybridError {
    #[error("Data error: {0}")]
    Data(String),

    #[error("Dataset is empty")]
    EmptyDataset,

    #[error("Unsupported file format")]
    UnsupportedFormat(String),

    #[error("Could not identify target column")]
    NoTargetColumn,

    #[error("Preprocessing error: {0}")]
    Preprocessing(String),

    #[error("Unknown category '{value}' in column '{column}'")]
    UnknownCategory { column: String, value: String },

    #[error("Training error: {0}")]
    Training(String),

    #[error("training cancelled")]
    Cancelled,

    #[error("Need at least two classes to fit a classifier, found {0}")]
    InsufficientClasses(usize),

    #[error("Split error: {0}")]
    Split(String),

    #[error("Model not fitted")]
    ModelNotFitted,

    #[error("Invalid shape: expected {expected}, got {actual}")]
    ShapeError { expected: String, actual: String },

    #[error("Invalid parameter: {name} = {value}, {reason}")]
    InvalidParameter {
        name: String,
        value: String,
        reason: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<polars::error::PolarsError> for HybridError {
    fn from(err: polars::error::PolarsError) -> Self {
        HybridError::Data(err.to_string())
    }
}

impl From<calamine::Error> for HybridError {
    fn from(err: calamine::Error) -> Self {
        HybridError::Data(err.to_string())
    }
}

impl From<serde_json::Error> for HybridError {
    fn from(err: serde_json::Error) -> Self {
        HybridError::Serialization(err.to_string())
    }
}

impl From<ndarray::ShapeError> for HybridError {
    fn from(err: ndarray::ShapeError) -> Self {
        HybridError::ShapeError {
            expected: "valid shape".to_string(),
            actual: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = HybridError::Data("bad row".to_string());
        assert_eq!(err.to_string(), "Data error: bad row");
        assert_eq!(HybridError::NoTargetColumn.to_string(), "Could not identify target column");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: HybridError = io_err.into();
        assert!(matches!(err, HybridError::Io(_)));
    }

    #[test]
    fn test_unknown_category_message() {
        let err = HybridError::UnknownCategory {
            column: "color".to_string(),
            value: "teal".to_string(),
        };
        assert_eq!(err.to_string(), "Unknown category 'teal' in column 'color'");
    }
}
