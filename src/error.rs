//! Error types for the diagnostics engine

use thiserror::Error;

/// Result type alias for diagnostics operations
pub type Result<T> = std::result::Result<T, DiagnosticsError>;

/// Main error type for the diagnostics engine
#[derive(Error, Debug)]
pub enum DiagnosticsError {
    #[error("Data error: {0}")]
    DataError(String),

    #[error("Shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch { expected: String, actual: String },

    #[error("Feature not found: {0}")]
    FeatureNotFound(String),

    #[error("Model not fitted")]
    ModelNotFitted,

    #[error("Invalid parameter: {name} = {value}, {reason}")]
    InvalidParameter {
        name: String,
        value: String,
        reason: String,
    },

    #[error("Computation error: {0}")]
    ComputationError(String),

    #[error("Prediction error: {0}")]
    PredictionError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl DiagnosticsError {
    /// Shorthand for a length mismatch between two named inputs
    pub fn length_mismatch(what: &str, expected: usize, actual: usize) -> Self {
        DiagnosticsError::ShapeMismatch {
            expected: format!("{} length = {}", what, expected),
            actual: format!("{} length = {}", what, actual),
        }
    }
}

impl From<polars::error::PolarsError> for DiagnosticsError {
    fn from(err: polars::error::PolarsError) -> Self {
        DiagnosticsError::DataError(err.to_string())
    }
}

impl From<serde_json::Error> for DiagnosticsError {
    fn from(err: serde_json::Error) -> Self {
        DiagnosticsError::SerializationError(err.to_string())
    }
}

impl From<ndarray::ShapeError> for DiagnosticsError {
    fn from(err: ndarray::ShapeError) -> Self {
        DiagnosticsError::ShapeMismatch {
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
        let err = DiagnosticsError::DataError("test error".to_string());
        assert_eq!(err.to_string(), "Data error: test error");
    }

    #[test]
    fn test_length_mismatch_display() {
        let err = DiagnosticsError::length_mismatch("y_pred", 10, 9);
        assert_eq!(
            err.to_string(),
            "Shape mismatch: expected y_pred length = 10, got y_pred length = 9"
        );
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: DiagnosticsError = io_err.into();
        assert!(matches!(err, DiagnosticsError::IoError(_)));
    }

    #[test]
    fn test_error_from_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: DiagnosticsError = json_err.into();
        assert!(matches!(err, DiagnosticsError::SerializationError(_)));
    }
}
