//! Validation gates around the load.
//!
//! Data-quality findings are reported, never raised: a gate returns a
//! [`ValidationReport`] and only the orchestrator decides whether a
//! FAIL aborts the run.

use polars::prelude::*;
use rusqlite::Connection;
use tracing::{info, warn};

use crate::error::Result;
use crate::types::{ValidationReport, ValidationStats, ValidationStatus};

/// Columns a row cannot be loaded without.
pub const CRITICAL_COLUMNS: [&str; 3] = ["loan_amnt", "issue_d", "loan_status"];

/// Columns expected in a complete cleaned dataset. Absence is a
/// warning, not a failure.
pub const REQUIRED_COLUMNS: [&str; 5] =
    ["loan_amnt", "int_rate", "issue_d", "loan_status", "is_default"];

/// Share of all cells that may be missing before it becomes an issue.
const MISSING_RATIO_LIMIT: f64 = 0.05;

/// Allowed relative difference between expected and loaded row counts.
const ROW_COUNT_TOLERANCE: f64 = 0.01;

/// Validates the cleaned frame before load and the table after load.
pub struct DataValidator;

impl DataValidator {
    pub fn new() -> Self {
        Self
    }

    /// Gate the cleaned frame before it reaches the store.
    pub fn validate_cleaned(&self, df: &DataFrame) -> Result<ValidationReport> {
        let row_count = df.height();
        let column_count = df.width();
        let missing_count: usize = df
            .get_columns()
            .iter()
            .map(|c| c.as_materialized_series().null_count())
            .sum();

        if row_count == 0 {
            return Ok(ValidationReport::fail(
                "dataset is empty",
                ValidationStats {
                    row_count,
                    column_count,
                    missing_count,
                    duplicate_count: 0,
                },
            ));
        }

        let duplicate_count = row_count
            - df.unique::<&str, &str>(None, UniqueKeepStrategy::First, None)?
                .height();
        let stats = ValidationStats {
            row_count,
            column_count,
            missing_count,
            duplicate_count,
        };

        let mut issues = Vec::new();
        let mut status = ValidationStatus::Pass;

        for name in CRITICAL_COLUMNS {
            if df.column(name).is_err() {
                issues.push(format!("critical column '{name}' is missing"));
                status = ValidationStatus::Fail;
            }
        }
        if status == ValidationStatus::Fail {
            warn!(?issues, "cleaned dataset failed validation");
            return Ok(ValidationReport::new(status, issues, stats));
        }

        for name in REQUIRED_COLUMNS {
            if df.column(name).is_err() {
                issues.push(format!("required column '{name}' is missing"));
                status = ValidationStatus::Warning;
            }
        }

        if duplicate_count > 0 {
            issues.push(format!("{duplicate_count} duplicate rows"));
        }

        let cell_count = row_count * column_count;
        if cell_count > 0 && (missing_count as f64) > cell_count as f64 * MISSING_RATIO_LIMIT {
            issues.push(format!(
                "{missing_count} missing values exceed {:.0}% of all cells",
                MISSING_RATIO_LIMIT * 100.0
            ));
        }

        if let Some(count) = count_where(df, "loan_amnt", |v| v <= 0.0)? {
            if count > 0 {
                issues.push(format!("{count} non-positive loan amounts"));
            }
        }
        if let Some(count) = count_where(df, "annual_inc", |v| v < 0.0)? {
            if count > 0 {
                issues.push(format!("{count} negative annual incomes"));
            }
        }

        if status == ValidationStatus::Pass && !issues.is_empty() {
            status = ValidationStatus::Warning;
        }

        info!(%status, issue_count = issues.len(), "cleaned dataset validated");
        Ok(ValidationReport::new(status, issues, stats))
    }

    /// Gate the destination table after the load.
    pub fn validate_loaded(
        &self,
        conn: &Connection,
        table: &str,
        expected_rows: usize,
    ) -> Result<ValidationReport> {
        let actual: i64 =
            conn.query_row(&format!("SELECT COUNT(*) FROM \"{table}\""), [], |row| {
                row.get(0)
            })?;
        let actual = actual.max(0) as usize;

        let mut issues = Vec::new();
        let mut status = ValidationStatus::Pass;

        let tolerance = expected_rows as f64 * ROW_COUNT_TOLERANCE;
        let delta = expected_rows.abs_diff(actual) as f64;
        if delta > tolerance {
            issues.push(format!(
                "row count mismatch: expected {expected_rows}, found {actual}"
            ));
            status = ValidationStatus::Fail;
        }

        for name in CRITICAL_COLUMNS {
            // Absent columns were reported before the load; skip them here.
            let query = format!("SELECT COUNT(*) FROM \"{table}\" WHERE \"{name}\" IS NULL");
            let Ok(nulls) = conn.query_row::<i64, _, _>(&query, [], |row| row.get(0)) else {
                continue;
            };
            if nulls > 0 {
                issues.push(format!("{nulls} null values in critical column '{name}'"));
                if status == ValidationStatus::Pass {
                    status = ValidationStatus::Warning;
                }
            }
        }

        info!(%status, rows = actual, "loaded table validated");
        Ok(ValidationReport::new(
            status,
            issues,
            ValidationStats {
                row_count: actual,
                column_count: 0,
                missing_count: 0,
                duplicate_count: 0,
            },
        ))
    }
}

impl Default for DataValidator {
    fn default() -> Self {
        Self::new()
    }
}

/// Count rows of a numeric column matching a predicate. `None` when
/// the column is absent.
fn count_where(
    df: &DataFrame,
    name: &str,
    predicate: impl Fn(f64) -> bool,
) -> Result<Option<usize>> {
    let Ok(column) = df.column(name) else {
        return Ok(None);
    };
    let series = column.as_materialized_series().cast(&DataType::Float64)?;
    let count = series
        .f64()?
        .into_iter()
        .flatten()
        .filter(|v| predicate(*v))
        .count();
    Ok(Some(count))
}
