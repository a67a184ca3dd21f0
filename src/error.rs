//! Error types for the forecast_train crate

use polars::prelude::PolarsError;
use thiserror::Error;

/// Custom error types for the forecast_train crate
#[derive(Debug, Error)]
pub enum TrainError {
    /// Error related to data validation or processing
    #[error("Data error: {0}")]
    DataError(String),

    /// Error from invalid parameters
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Error related to a single model training run
    #[error("Training error: {0}")]
    TrainingError(String),

    /// A resumed run was invoked with flags that differ from the prior run log
    #[error(
        "Run configuration conflict: prior run used inputs {prior} but this invocation \
         uses {current}. Revert the changed flags or start a new run name."
    )]
    ConfigConflict { prior: String, current: String },

    /// Every model/recipe combination failed for one partition
    #[error("No models were trained for partition '{0}': all model/recipe combinations failed")]
    NoModelsTrained(String),

    /// Fewer partitions were persisted than the run expected
    #[error(
        "Completion mismatch: expected {expected} completed partition outputs but found \
         {actual}. Re-run the training step to finish the missing partitions."
    )]
    CompletionMismatch { expected: usize, actual: usize },

    /// Error from the persistence layer
    #[error("Storage error: {0}")]
    StorageError(String),

    /// Error from IO operations
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Error from Polars operations
    #[error("Polars error: {0}")]
    PolarsError(String),

    /// Error from CSV serialization
    #[error("CSV error: {0}")]
    CsvError(String),

    /// Error from JSON serialization
    #[error("JSON error: {0}")]
    JsonError(String),
}

/// Result type with our custom error
pub type Result<T> = std::result::Result<T, TrainError>;

impl From<PolarsError> for TrainError {
    fn from(err: PolarsError) -> Self {
        TrainError::PolarsError(err.to_string())
    }
}

impl From<csv::Error> for TrainError {
    fn from(err: csv::Error) -> Self {
        TrainError::CsvError(err.to_string())
    }
}

impl From<serde_json::Error> for TrainError {
    fn from(err: serde_json::Error) -> Self {
        TrainError::JsonError(err.to_string())
    }
}
