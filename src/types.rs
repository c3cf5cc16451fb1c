//! Shared data types used across the ETL pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Resolved logical type of a column after coercion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ColumnType {
    /// Whole numbers.
    Integer,
    /// Floating-point numbers.
    Real,
    /// Calendar dates, canonicalised to `YYYY-MM-DD` strings.
    Date,
    /// True/false values.
    Boolean,
    /// Low-cardinality strings with an enumerated value set.
    Categorical(Vec<String>),
    /// Free-form text.
    Text,
}

impl ColumnType {
    /// Whether the type is numeric (integer or real).
    pub fn is_numeric(&self) -> bool {
        matches!(self, ColumnType::Integer | ColumnType::Real)
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::Integer => write!(f, "integer"),
            ColumnType::Real => write!(f, "real"),
            ColumnType::Date => write!(f, "date"),
            ColumnType::Boolean => write!(f, "boolean"),
            ColumnType::Categorical(values) => write!(f, "categorical({} values)", values.len()),
            ColumnType::Text => write!(f, "text"),
        }
    }
}

/// Per-column profiling summary produced by one cleaning pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnProfile {
    pub name: String,
    /// Physical Polars dtype at profiling time.
    pub dtype: String,
    pub column_type: ColumnType,
    pub null_count: usize,
    pub null_percentage: f64,
    pub unique_count: usize,
}

/// The resolved schema of a cleaned record set. Computed once per
/// cleaning pass and passed by value; never mutated after creation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResolvedSchema {
    pub columns: Vec<ColumnProfile>,
}

impl ResolvedSchema {
    pub fn new(columns: Vec<ColumnProfile>) -> Self {
        Self { columns }
    }

    /// Look up the profile of a column by name.
    pub fn get(&self, name: &str) -> Option<&ColumnProfile> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// The resolved type of a column, if present.
    pub fn column_type(&self, name: &str) -> Option<&ColumnType> {
        self.get(name).map(|c| &c.column_type)
    }

    /// Names of all columns resolved as dates.
    pub fn date_columns(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.column_type == ColumnType::Date)
            .map(|c| c.name.as_str())
            .collect()
    }

    /// Names of all numeric columns.
    pub fn numeric_columns(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.column_type.is_numeric())
            .map(|c| c.name.as_str())
            .collect()
    }

    /// Names of all categorical columns.
    pub fn categorical_columns(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| matches!(c.column_type, ColumnType::Categorical(_)))
            .map(|c| c.name.as_str())
            .collect()
    }
}

/// Overall verdict of a validation gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationStatus {
    Pass,
    Warning,
    Fail,
}

impl fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationStatus::Pass => write!(f, "PASS"),
            ValidationStatus::Warning => write!(f, "WARNING"),
            ValidationStatus::Fail => write!(f, "FAIL"),
        }
    }
}

/// Dataset-level counts captured at validation time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationStats {
    pub row_count: usize,
    pub column_count: usize,
    pub missing_count: usize,
    pub duplicate_count: usize,
}

/// Outcome of a validation gate. Immutable after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub status: ValidationStatus,
    pub issues: Vec<String>,
    pub stats: ValidationStats,
}

impl ValidationReport {
    pub fn new(status: ValidationStatus, issues: Vec<String>, stats: ValidationStats) -> Self {
        Self {
            status,
            issues,
            stats,
        }
    }

    /// A failing report with a single issue.
    pub fn fail(issue: impl Into<String>, stats: ValidationStats) -> Self {
        Self::new(ValidationStatus::Fail, vec![issue.into()], stats)
    }

    pub fn is_fail(&self) -> bool {
        self.status == ValidationStatus::Fail
    }
}

/// Outcome of a batched load. Batches are committed independently;
/// a failure leaves earlier batches in place and stops the load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadResult {
    pub committed_batches: usize,
    pub failed_batch_index: Option<usize>,
    pub rows_written: usize,
}

impl LoadResult {
    /// Whether every batch committed.
    pub fn is_complete(&self) -> bool {
        self.failed_batch_index.is_none()
    }
}

/// Terminal status of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Success,
    Failed,
}

/// Per-stage timing and shape information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageStats {
    pub stage: String,
    pub rows: usize,
    pub columns: usize,
    pub duration_ms: u64,
}

/// Summary of a complete pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub status: RunStatus,
    pub duration_ms: u64,
    pub rows_processed: usize,
    pub database_path: String,
    pub stage_stats: Vec<StageStats>,
    pub error: Option<String>,
}
