//! Column profiling and logical type inference.
//!
//! Profiling is a pure pass over the frame: it produces a
//! [`ResolvedSchema`] value and never mutates the data, so profiling
//! the same frame twice yields the same schema.

use once_cell::sync::Lazy;
use polars::prelude::*;
use regex::Regex;
use tracing::debug;

use crate::error::Result;
use crate::types::{ColumnProfile, ColumnType, ResolvedSchema};
use crate::utils::{
    collect_string_samples, is_boolean_string, is_integer_dtype, is_null_marker, is_numeric_dtype,
    is_numeric_string, looks_like_float,
};

/// Distinct-count ceiling for categorical columns.
const CATEGORICAL_MAX_UNIQUE: usize = 50;

/// Distinct-to-row ratio ceiling for categorical columns.
const CATEGORICAL_MAX_UNIQUE_RATIO: f64 = 0.10;

/// Number of leading non-null values inspected per string column.
const SAMPLE_SIZE: usize = 20;

/// Share of samples that must parse as numeric for a string column to
/// be treated as numeric.
const NUMERIC_SAMPLE_THRESHOLD: f64 = 0.7;

// Field names that hold dates in loan exports without containing
// "date" in the name.
static DATE_NAME_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(date|_d$|^last_|^next_|^earliest)").expect("Invalid regex: date column names")
});

/// Whether a column name lexically indicates a date field.
pub fn is_date_named(name: &str) -> bool {
    DATE_NAME_PATTERN.is_match(&name.to_ascii_lowercase())
}

/// Profiles each column of a frame and resolves its logical type.
pub struct DataProfiler;

impl DataProfiler {
    pub fn new() -> Self {
        Self
    }

    /// Profile every column of the frame.
    pub fn profile(&self, df: &DataFrame) -> Result<ResolvedSchema> {
        let row_count = df.height();
        let mut columns = Vec::with_capacity(df.width());

        for column in df.get_columns() {
            let series = column.as_materialized_series();
            let null_count = series.null_count();
            let null_percentage = if row_count == 0 {
                0.0
            } else {
                null_count as f64 / row_count as f64 * 100.0
            };
            let unique_count = series.n_unique()?;

            let column_type = infer_column_type(series, row_count)?;
            debug!(
                column = %series.name(),
                dtype = %series.dtype(),
                resolved = %column_type,
                null_pct = null_percentage,
                "profiled column"
            );

            columns.push(ColumnProfile {
                name: series.name().to_string(),
                dtype: series.dtype().to_string(),
                column_type,
                null_count,
                null_percentage,
                unique_count,
            });
        }

        Ok(ResolvedSchema::new(columns))
    }
}

impl Default for DataProfiler {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolve the logical type of one column.
///
/// Lexical date detection runs first so fields like issue_d are never
/// mistaken for categoricals. The coercion engine falls back to
/// [`infer_value_type`] when a date-named column turns out to hold no
/// parseable dates.
fn infer_column_type(series: &Series, row_count: usize) -> Result<ColumnType> {
    if series.dtype() == &DataType::String
        && series.null_count() < series.len()
        && is_date_named(series.name())
    {
        return Ok(ColumnType::Date);
    }
    infer_value_type(series, row_count)
}

/// Resolve the logical type of one column from its values alone.
pub(crate) fn infer_value_type(series: &Series, row_count: usize) -> Result<ColumnType> {
    if is_numeric_dtype(series.dtype()) {
        if is_integer_dtype(series.dtype()) {
            return Ok(ColumnType::Integer);
        }
        return Ok(ColumnType::Real);
    }

    if series.dtype() == &DataType::Boolean {
        return Ok(ColumnType::Boolean);
    }

    if series.dtype() == &DataType::Date {
        return Ok(ColumnType::Date);
    }

    let non_null = series.drop_nulls();
    if non_null.is_empty() {
        return Ok(ColumnType::Text);
    }

    if series.dtype() == &DataType::String {
        let samples = collect_string_samples(&non_null, SAMPLE_SIZE);
        let informative: Vec<&str> = samples
            .iter()
            .map(|s| s.trim())
            .filter(|s| !is_null_marker(s))
            .collect();

        if !informative.is_empty() {
            let numeric = informative.iter().filter(|s| is_numeric_string(s)).count();
            let ratio = numeric as f64 / informative.len() as f64;
            if ratio >= NUMERIC_SAMPLE_THRESHOLD {
                let any_float = informative.iter().any(|s| looks_like_float(s));
                return Ok(if any_float {
                    ColumnType::Real
                } else {
                    ColumnType::Integer
                });
            }

            if informative.iter().all(|s| is_boolean_string(s)) {
                return Ok(ColumnType::Boolean);
            }
        }

        let unique = non_null.n_unique()?;
        if unique < CATEGORICAL_MAX_UNIQUE
            && (unique as f64) < row_count as f64 * CATEGORICAL_MAX_UNIQUE_RATIO
        {
            let mut values: Vec<String> = non_null
                .unique()?
                .str()?
                .into_iter()
                .flatten()
                .map(|v| v.to_string())
                .collect();
            values.sort();
            return Ok(ColumnType::Categorical(values));
        }
    }

    Ok(ColumnType::Text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn wide_frame(values: &[&str], name: &str) -> DataFrame {
        DataFrame::new(vec![Series::new(name.into(), values).into()]).unwrap()
    }

    #[test]
    fn test_is_date_named() {
        assert!(is_date_named("issue_d"));
        assert!(is_date_named("earliest_cr_line"));
        assert!(is_date_named("last_pymnt_d"));
        assert!(is_date_named("next_pymnt_d"));
        assert!(is_date_named("settlement_date"));
        assert!(!is_date_named("loan_amnt"));
        assert!(!is_date_named("grade"));
    }

    #[test]
    fn test_profile_native_numeric() {
        let df = df! {
            "loan_amnt" => &[1000i64, 2000, 3000],
            "int_rate" => &[10.5f64, 12.0, 13.5],
        }
        .unwrap();

        let schema = DataProfiler::new().profile(&df).unwrap();
        assert_eq!(
            schema.column_type("loan_amnt"),
            Some(&ColumnType::Integer)
        );
        assert_eq!(schema.column_type("int_rate"), Some(&ColumnType::Real));
    }

    #[test]
    fn test_profile_numeric_strings() {
        let df = wide_frame(&["100", "200", "300"], "installment");
        let schema = DataProfiler::new().profile(&df).unwrap();
        assert_eq!(
            schema.column_type("installment"),
            Some(&ColumnType::Integer)
        );
    }

    #[test]
    fn test_profile_percent_strings_are_real() {
        let df = wide_frame(&["10.5%", "12.0%", "13.5%"], "revol_util");
        let schema = DataProfiler::new().profile(&df).unwrap();
        assert_eq!(schema.column_type("revol_util"), Some(&ColumnType::Real));
    }

    #[test]
    fn test_profile_date_named_column() {
        let df = wide_frame(&["Dec-2018", "Jan-2019", "Feb-2019"], "issue_d");
        let schema = DataProfiler::new().profile(&df).unwrap();
        assert_eq!(schema.column_type("issue_d"), Some(&ColumnType::Date));
    }

    #[test]
    fn test_profile_categorical() {
        let values: Vec<&str> = (0..40)
            .map(|i| if i % 2 == 0 { "A" } else { "B" })
            .collect();
        let df = wide_frame(&values, "grade");
        let schema = DataProfiler::new().profile(&df).unwrap();
        assert_eq!(
            schema.column_type("grade"),
            Some(&ColumnType::Categorical(vec!["A".into(), "B".into()]))
        );
    }

    #[test]
    fn test_profile_high_cardinality_is_text() {
        let values: Vec<String> = (0..30).map(|i| format!("title-{i}")).collect();
        let refs: Vec<&str> = values.iter().map(|s| s.as_str()).collect();
        let df = wide_frame(&refs, "emp_title");
        let schema = DataProfiler::new().profile(&df).unwrap();
        assert_eq!(schema.column_type("emp_title"), Some(&ColumnType::Text));
    }

    #[test]
    fn test_profile_all_null_is_text() {
        let series = Series::new("empty".into(), &[None::<&str>, None, None]);
        let df = DataFrame::new(vec![series.into()]).unwrap();
        let schema = DataProfiler::new().profile(&df).unwrap();
        assert_eq!(schema.column_type("empty"), Some(&ColumnType::Text));
        assert_eq!(schema.get("empty").unwrap().null_count, 3);
    }

    #[test]
    fn test_profile_is_idempotent() {
        let df = df! {
            "loan_amnt" => &[1000i64, 2000, 3000],
            "grade" => &["A", "B", "A"],
        }
        .unwrap();

        let profiler = DataProfiler::new();
        let first = profiler.profile(&df).unwrap();
        let second = profiler.profile(&df).unwrap();

        for (a, b) in first.columns.iter().zip(second.columns.iter()) {
            assert_eq!(a.name, b.name);
            assert_eq!(a.column_type, b.column_type);
            assert_eq!(a.null_count, b.null_count);
        }
    }

    #[test]
    fn test_profile_null_percentage() {
        let series = Series::new("dti".into(), &[Some(1.0f64), None, None, Some(2.0)]);
        let df = DataFrame::new(vec![series.into()]).unwrap();
        let schema = DataProfiler::new().profile(&df).unwrap();
        let profile = schema.get("dti").unwrap();
        assert_eq!(profile.null_count, 2);
        assert!((profile.null_percentage - 50.0).abs() < 1e-9);
    }
}
