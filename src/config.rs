//! Configuration types for the loan ETL pipeline.
//!
//! This module provides configuration options using the builder pattern
//! for flexible and ergonomic pipeline setup.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for the ETL pipeline.
///
/// Use [`PipelineConfig::builder()`] to create a new configuration
/// with fluent API.
///
/// # Example
///
/// ```rust,ignore
/// use loan_etl::config::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .database_path("data/loans.db")
///     .batch_size(1000)
///     .remove_outliers(true)
///     .build();
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Whether to impute missing values and drop rows with missing
    /// critical fields.
    /// Default: true
    pub handle_missing: bool,

    /// Whether to canonicalise date columns to `YYYY-MM-DD` strings.
    /// Default: true
    pub convert_dates: bool,

    /// Whether to derive analytical features.
    /// Default: true
    pub create_features: bool,

    /// Whether to winsorize numeric columns before loading.
    /// Default: false
    pub remove_outliers: bool,

    /// Standard-deviation multiple used for winsorizing.
    /// Default: 3.0
    pub outlier_threshold: f64,

    /// Number of rows written per SQLite transaction.
    /// Default: 500
    pub batch_size: usize,

    /// Maximum number of columns kept in the final dataset.
    /// Default: 25
    pub max_columns: usize,

    /// Path to the SQLite database file.
    /// Default: "data/loans.db"
    pub database_path: PathBuf,

    /// Name of the destination table.
    /// Default: "loans"
    pub table_name: String,

    /// Directory where the cleaned dataset is checkpointed as CSV
    /// before loading.
    /// Default: "data/processed"
    pub processed_dir: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            handle_missing: true,
            convert_dates: true,
            create_features: true,
            remove_outliers: false,
            outlier_threshold: 3.0,
            batch_size: 500,
            max_columns: 25,
            database_path: PathBuf::from("data/loans.db"),
            table_name: "loans".to_string(),
            processed_dir: PathBuf::from("data/processed"),
        }
    }
}

impl PipelineConfig {
    /// Create a new configuration builder.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }

    /// Validate the configuration and return errors if invalid.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.outlier_threshold <= 0.0 || !self.outlier_threshold.is_finite() {
            return Err(ConfigValidationError::InvalidOutlierThreshold(
                self.outlier_threshold,
            ));
        }

        if self.batch_size == 0 {
            return Err(ConfigValidationError::InvalidBatchSize(self.batch_size));
        }

        if self.max_columns == 0 {
            return Err(ConfigValidationError::InvalidMaxColumns(self.max_columns));
        }

        if self.table_name.is_empty() {
            return Err(ConfigValidationError::EmptyTableName);
        }

        Ok(())
    }
}

/// Errors that can occur during configuration validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Invalid outlier threshold: {0} (must be positive and finite)")]
    InvalidOutlierThreshold(f64),

    #[error("Invalid batch size: {0} (must be at least 1)")]
    InvalidBatchSize(usize),

    #[error("Invalid max columns: {0} (must be at least 1)")]
    InvalidMaxColumns(usize),

    #[error("Table name must not be empty")]
    EmptyTableName,
}

/// Builder for [`PipelineConfig`] with fluent API.
#[derive(Debug, Default)]
pub struct PipelineConfigBuilder {
    handle_missing: Option<bool>,
    convert_dates: Option<bool>,
    create_features: Option<bool>,
    remove_outliers: Option<bool>,
    outlier_threshold: Option<f64>,
    batch_size: Option<usize>,
    max_columns: Option<usize>,
    database_path: Option<PathBuf>,
    table_name: Option<String>,
    processed_dir: Option<PathBuf>,
}

impl PipelineConfigBuilder {
    /// Enable or disable missing-value handling.
    pub fn handle_missing(mut self, enable: bool) -> Self {
        self.handle_missing = Some(enable);
        self
    }

    /// Enable or disable date canonicalisation.
    pub fn convert_dates(mut self, enable: bool) -> Self {
        self.convert_dates = Some(enable);
        self
    }

    /// Enable or disable feature derivation.
    pub fn create_features(mut self, enable: bool) -> Self {
        self.create_features = Some(enable);
        self
    }

    /// Enable or disable winsorizing of numeric columns.
    pub fn remove_outliers(mut self, enable: bool) -> Self {
        self.remove_outliers = Some(enable);
        self
    }

    /// Set the standard-deviation multiple used for winsorizing.
    pub fn outlier_threshold(mut self, threshold: f64) -> Self {
        self.outlier_threshold = Some(threshold);
        self
    }

    /// Set the number of rows per write transaction.
    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = Some(size);
        self
    }

    /// Set the maximum number of columns kept in the final dataset.
    pub fn max_columns(mut self, count: usize) -> Self {
        self.max_columns = Some(count);
        self
    }

    /// Set the SQLite database path.
    pub fn database_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.database_path = Some(path.into());
        self
    }

    /// Set the destination table name.
    pub fn table_name(mut self, name: impl Into<String>) -> Self {
        self.table_name = Some(name.into());
        self
    }

    /// Set the directory for the cleaned-data CSV checkpoint.
    pub fn processed_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.processed_dir = Some(path.into());
        self
    }

    /// Build the configuration.
    ///
    /// Returns a validated `PipelineConfig` or an error if validation fails.
    pub fn build(self) -> Result<PipelineConfig, ConfigValidationError> {
        let defaults = PipelineConfig::default();
        let config = PipelineConfig {
            handle_missing: self.handle_missing.unwrap_or(defaults.handle_missing),
            convert_dates: self.convert_dates.unwrap_or(defaults.convert_dates),
            create_features: self.create_features.unwrap_or(defaults.create_features),
            remove_outliers: self.remove_outliers.unwrap_or(defaults.remove_outliers),
            outlier_threshold: self.outlier_threshold.unwrap_or(defaults.outlier_threshold),
            batch_size: self.batch_size.unwrap_or(defaults.batch_size),
            max_columns: self.max_columns.unwrap_or(defaults.max_columns),
            database_path: self.database_path.unwrap_or(defaults.database_path),
            table_name: self.table_name.unwrap_or(defaults.table_name),
            processed_dir: self.processed_dir.unwrap_or(defaults.processed_dir),
        };

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert!(config.handle_missing);
        assert!(config.convert_dates);
        assert!(config.create_features);
        assert!(!config.remove_outliers);
        assert_eq!(config.outlier_threshold, 3.0);
        assert_eq!(config.batch_size, 500);
        assert_eq!(config.max_columns, 25);
        assert_eq!(config.table_name, "loans");
    }

    #[test]
    fn test_builder_defaults() {
        let config = PipelineConfig::builder().build().unwrap();
        assert_eq!(config.batch_size, 500);
        assert_eq!(config.database_path, PathBuf::from("data/loans.db"));
    }

    #[test]
    fn test_builder_custom_values() {
        let config = PipelineConfig::builder()
            .batch_size(100)
            .max_columns(10)
            .remove_outliers(true)
            .outlier_threshold(2.5)
            .database_path("out/test.db")
            .table_name("portfolio")
            .build()
            .unwrap();

        assert_eq!(config.batch_size, 100);
        assert_eq!(config.max_columns, 10);
        assert!(config.remove_outliers);
        assert_eq!(config.outlier_threshold, 2.5);
        assert_eq!(config.database_path, PathBuf::from("out/test.db"));
        assert_eq!(config.table_name, "portfolio");
    }

    #[test]
    fn test_validation_invalid_batch_size() {
        let result = PipelineConfig::builder().batch_size(0).build();
        assert!(matches!(
            result.unwrap_err(),
            ConfigValidationError::InvalidBatchSize(0)
        ));
    }

    #[test]
    fn test_validation_invalid_outlier_threshold() {
        let result = PipelineConfig::builder().outlier_threshold(-1.0).build();
        assert!(matches!(
            result.unwrap_err(),
            ConfigValidationError::InvalidOutlierThreshold(_)
        ));
    }

    #[test]
    fn test_validation_empty_table_name() {
        let result = PipelineConfig::builder().table_name("").build();
        assert!(matches!(
            result.unwrap_err(),
            ConfigValidationError::EmptyTableName
        ));
    }

    #[test]
    fn test_config_serialization() {
        let config = PipelineConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let deserialized: PipelineConfig = serde_json::from_str(&json).unwrap();

        assert_eq!(config.batch_size, deserialized.batch_size);
        assert_eq!(config.table_name, deserialized.table_name);
        assert_eq!(config.outlier_threshold, deserialized.outlier_threshold);
    }
}
