//! Custom error types for the ETL pipeline.
//!
//! Errors follow a fixed taxonomy: data-quality findings are never
//! errors (they live in [`crate::types::ValidationReport`]); structural
//! and write failures abort the run and surface here.

use thiserror::Error;

/// The main error type for the ETL pipeline.
#[derive(Error, Debug)]
pub enum EtlError {
    /// Column was not found in the dataset.
    #[error("Column '{0}' not found in dataset")]
    ColumnNotFound(String),

    /// The input dataset has no rows.
    #[error("Dataset is empty")]
    EmptyDataset,

    /// A critical column is absent from the dataset.
    #[error("Critical column '{0}' is missing")]
    MissingCriticalColumn(String),

    /// Type coercion failed for a column.
    #[error("Failed to coerce column '{column}': {reason}")]
    CoercionFailed { column: String, reason: String },

    /// Imputation failed.
    #[error("Failed to impute missing values in column '{column}': {reason}")]
    ImputationFailed { column: String, reason: String },

    /// A validation gate returned FAIL.
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    /// A write batch failed to commit. Batches committed before this
    /// index remain in the destination table.
    #[error("Batch {index} failed to commit: {reason}")]
    BatchFailed { index: usize, reason: String },

    /// A value could not be mapped to a SQLite type.
    #[error("Unsupported value for load: {0}")]
    UnsupportedValue(String),

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Polars error wrapper.
    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    /// SQLite error wrapper.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context.
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<EtlError>,
    },
}

impl EtlError {
    /// Add context to an error.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        EtlError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Whether this error is a structural failure of the input data
    /// (as opposed to an IO/store failure).
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Self::EmptyDataset | Self::MissingCriticalColumn(_) | Self::ValidationFailed(_)
        )
    }
}

/// Result type alias for ETL operations.
pub type Result<T> = std::result::Result<T, EtlError>;

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error result.
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, polars::error::PolarsError> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| EtlError::Polars(e).with_context(context))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, rusqlite::Error> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| EtlError::Sqlite(e).with_context(context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_structural() {
        assert!(EtlError::EmptyDataset.is_structural());
        assert!(EtlError::MissingCriticalColumn("issue_d".into()).is_structural());
        assert!(
            !EtlError::BatchFailed {
                index: 2,
                reason: "disk full".into()
            }
            .is_structural()
        );
    }

    #[test]
    fn test_with_context() {
        let err = EtlError::ColumnNotFound("grade".to_string()).with_context("During profiling");
        assert!(err.to_string().contains("During profiling"));
        assert!(err.to_string().contains("grade"));
    }

    #[test]
    fn test_batch_failed_message() {
        let err = EtlError::BatchFailed {
            index: 1,
            reason: "constraint".into(),
        };
        assert!(err.to_string().contains("Batch 1"));
    }
}
