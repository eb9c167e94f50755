//! Error types for spacetime aggregation and ranking metrics

use chrono::NaiveDate;
use thiserror::Error;

/// Result type alias for panel operations
pub type Result<T> = std::result::Result<T, PanelError>;

/// Main error type for the crate
#[derive(Error, Debug)]
pub enum PanelError {
    /// Malformed window token or configuration
    #[error("Parse error: {0}")]
    Parse(String),

    /// A numerator, denominator, weight or index reference did not resolve to a column
    #[error("Missing column: {0}")]
    MissingColumn(String),

    #[error("No snapshot stored for prefix '{prefix}' at {date}")]
    StorageNotFound { prefix: String, date: NaiveDate },

    /// Cut-off out of bounds or not enough labeled data for a metric
    #[error("Range error: {0}")]
    Range(String),

    /// Dtype restoration, union or pivot mismatch
    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Data error: {0}")]
    Data(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Thread pool error: {0}")]
    ThreadPool(String),
}

impl From<polars::error::PolarsError> for PanelError {
    fn from(err: polars::error::PolarsError) -> Self {
        PanelError::Data(err.to_string())
    }
}

impl From<serde_json::Error> for PanelError {
    fn from(err: serde_json::Error) -> Self {
        PanelError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PanelError::Parse("Invalid delta string: 3x".to_string());
        assert_eq!(err.to_string(), "Parse error: Invalid delta string: 3x");
    }

    #[test]
    fn test_storage_not_found_display() {
        let err = PanelError::StorageNotFound {
            prefix: "tests".to_string(),
            date: NaiveDate::from_ymd_opt(2013, 1, 1).unwrap(),
        };
        assert_eq!(
            err.to_string(),
            "No snapshot stored for prefix 'tests' at 2013-01-01"
        );
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: PanelError = io_err.into();
        assert!(matches!(err, PanelError::Io(_)));
    }
}
