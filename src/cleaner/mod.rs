//! Type coercion and text sanitisation.
//!
//! The coercion engine standardises column names, normalises text,
//! resolves a logical type per column and rewrites each column to its
//! resolved type. Uncoercible values become null; an uncoercible
//! column stays text. Both are information-loss events, logged and
//! never fatal.

pub mod dates;

use once_cell::sync::Lazy;
use polars::prelude::*;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::profiler::DataProfiler;
use crate::types::{ColumnProfile, ColumnType, ResolvedSchema};
use crate::utils::{is_boolean_false, is_boolean_true, is_null_marker, parse_numeric_string};

use dates::canonicalize_dates;

/// Text columns normalised to upper case during sanitisation.
const UPPERCASE_COLUMNS: [&str; 4] = ["loan_status", "grade", "sub_grade", "emp_title"];

static NON_WORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\w]+").expect("Invalid regex: non-word run"));

/// Standardise a single column name: lower case, non-word runs to `_`.
pub fn standardize_name(name: &str) -> String {
    NON_WORD.replace_all(&name.to_lowercase(), "_").to_string()
}

/// Rewrites a raw frame into a typed, sanitised one.
pub struct TypeCoercer {
    profiler: DataProfiler,
}

impl TypeCoercer {
    pub fn new() -> Self {
        Self {
            profiler: DataProfiler::new(),
        }
    }

    /// Coerce a frame. Returns the rewritten frame, its resolved
    /// schema and a log of the transformation steps applied.
    pub fn coerce(
        &self,
        mut df: DataFrame,
        convert_dates: bool,
    ) -> Result<(DataFrame, ResolvedSchema, Vec<String>)> {
        let mut steps = Vec::new();

        let renamed = standardize_column_names(&mut df)?;
        if renamed > 0 {
            steps.push(format!("standardized {renamed} column names"));
        }

        let sanitized = sanitize_text_columns(&mut df)?;
        if sanitized > 0 {
            steps.push(format!("sanitized {sanitized} text columns"));
        }

        let initial = self.profiler.profile(&df)?;
        let mut profiles = Vec::with_capacity(initial.columns.len());

        for profile in &initial.columns {
            let resolved =
                coerce_column(&mut df, profile, convert_dates, &mut steps)?;
            profiles.push(resolved);
        }

        info!(
            columns = profiles.len(),
            rows = df.height(),
            "type coercion complete"
        );
        Ok((df, ResolvedSchema::new(profiles), steps))
    }
}

impl Default for TypeCoercer {
    fn default() -> Self {
        Self::new()
    }
}

/// Standardise all column names in place. Returns how many changed.
fn standardize_column_names(df: &mut DataFrame) -> Result<usize> {
    let mut seen = std::collections::HashSet::new();
    let mut names = Vec::with_capacity(df.width());
    let mut renamed = 0usize;

    for name in df.get_column_names() {
        let mut standardized = standardize_name(name.as_str());
        // Suffix collisions so the frame keeps unique names.
        let mut suffix = 1;
        while !seen.insert(standardized.clone()) {
            standardized = format!("{}_{suffix}", standardize_name(name.as_str()));
            suffix += 1;
        }
        if standardized != name.as_str() {
            renamed += 1;
        }
        names.push(standardized);
    }

    df.set_column_names(names)?;
    Ok(renamed)
}

/// Trim values, normalise null markers and upper-case status-like
/// columns. Returns how many columns were touched.
fn sanitize_text_columns(df: &mut DataFrame) -> Result<usize> {
    let names: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|n| n.to_string())
        .collect();
    let mut touched = 0usize;

    for name in names {
        let series = df.column(&name)?.as_materialized_series().clone();
        if series.dtype() != &DataType::String {
            continue;
        }

        let uppercase = UPPERCASE_COLUMNS.contains(&name.as_str());
        let values = series.str()?;
        let cleaned: Vec<Option<String>> = values
            .into_iter()
            .map(|v| {
                v.and_then(|s| {
                    let trimmed = s.trim();
                    if is_null_marker(trimmed) {
                        None
                    } else if uppercase {
                        Some(trimmed.to_uppercase())
                    } else {
                        Some(trimmed.to_string())
                    }
                })
            })
            .collect();

        df.replace(&name, Series::new(series.name().clone(), cleaned))?;
        touched += 1;
    }

    Ok(touched)
}

/// Coerce one column to its resolved type and return the final profile.
fn coerce_column(
    df: &mut DataFrame,
    profile: &ColumnProfile,
    convert_dates: bool,
    steps: &mut Vec<String>,
) -> Result<ColumnProfile> {
    let name = profile.name.as_str();
    let series = df.column(name)?.as_materialized_series().clone();

    let (final_series, final_type) = match &profile.column_type {
        ColumnType::Integer => {
            if series.dtype() == &DataType::Int64 {
                (series, ColumnType::Integer)
            } else if series.dtype() == &DataType::String {
                parse_integer_column(&series, steps)
            } else {
                (series.cast(&DataType::Int64)?, ColumnType::Integer)
            }
        }
        ColumnType::Real => {
            if series.dtype() == &DataType::String {
                let coerced = parse_real_column(&series, steps);
                (coerced, ColumnType::Real)
            } else {
                (series.cast(&DataType::Float64)?, ColumnType::Real)
            }
        }
        ColumnType::Boolean => {
            if series.dtype() == &DataType::Boolean {
                (series, ColumnType::Boolean)
            } else {
                (parse_boolean_column(&series)?, ColumnType::Boolean)
            }
        }
        ColumnType::Date if convert_dates && series.dtype() == &DataType::String => {
            match canonicalize_dates(&series)? {
                Some(result) => {
                    if result.format.ambiguous {
                        warn!(
                            column = name,
                            format = result.format.name,
                            "date column matched an ambiguous day/month layout"
                        );
                    }
                    if result.unparsed > 0 {
                        debug!(
                            column = name,
                            unparsed = result.unparsed,
                            "date values not matching the winning format became null"
                        );
                    }
                    steps.push(format!(
                        "canonicalized {name} as dates ({})",
                        result.format.name
                    ));
                    (result.series, ColumnType::Date)
                }
                None => {
                    // Date-named but no layout matched. Fall back to
                    // value-based inference; amount fields like
                    // last_pymnt_amnt land here.
                    let fallback = crate::profiler::infer_value_type(&series, df.height())?;
                    debug!(
                        column = name,
                        fallback = %fallback,
                        "no date format matched, falling back to value-based type"
                    );
                    let fallback_profile = ColumnProfile {
                        column_type: fallback,
                        ..profile.clone()
                    };
                    return coerce_column(df, &fallback_profile, convert_dates, steps);
                }
            }
        }
        ColumnType::Date => (series, ColumnType::Date),
        other => (series, other.clone()),
    };

    let null_count = final_series.null_count();
    let len = final_series.len();
    let unique_count = final_series.n_unique()?;
    let dtype = final_series.dtype().to_string();
    df.replace(name, final_series)?;

    Ok(ColumnProfile {
        name: name.to_string(),
        dtype,
        column_type: final_type,
        null_count,
        null_percentage: if len == 0 {
            0.0
        } else {
            null_count as f64 / len as f64 * 100.0
        },
        unique_count,
    })
}

/// Parse a string column sampled as integer. Fractional values beyond
/// the sample promote the whole column to real instead of truncating.
fn parse_integer_column(series: &Series, steps: &mut Vec<String>) -> (Series, ColumnType) {
    let mut lost = 0usize;
    let mut fractional = false;
    let values: Vec<Option<f64>> = series
        .str()
        .map(|chunked| {
            chunked
                .into_iter()
                .map(|v| {
                    v.and_then(|s| match parse_numeric_string(s) {
                        Some(n) => {
                            if n.fract() != 0.0 {
                                fractional = true;
                            }
                            Some(n)
                        }
                        None => {
                            lost += 1;
                            None
                        }
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    if lost > 0 {
        steps.push(format!(
            "coerced {} to {} ({lost} unparseable values nulled)",
            series.name(),
            if fractional { "real" } else { "integer" }
        ));
    }

    if fractional {
        steps.push(format!(
            "promoted {} to real (fractional values present)",
            series.name()
        ));
        return (Series::new(series.name().clone(), values), ColumnType::Real);
    }

    let whole: Vec<Option<i64>> = values.iter().map(|v| v.map(|n| n as i64)).collect();
    (
        Series::new(series.name().clone(), whole),
        ColumnType::Integer,
    )
}

fn parse_real_column(series: &Series, steps: &mut Vec<String>) -> Series {
    let mut lost = 0usize;
    let values: Vec<Option<f64>> = series
        .str()
        .map(|chunked| {
            chunked
                .into_iter()
                .map(|v| {
                    v.and_then(|s| match parse_numeric_string(s) {
                        Some(n) => Some(n),
                        None => {
                            lost += 1;
                            None
                        }
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    if lost > 0 {
        steps.push(format!(
            "coerced {} to real ({lost} unparseable values nulled)",
            series.name()
        ));
    }
    Series::new(series.name().clone(), values)
}

fn parse_boolean_column(series: &Series) -> Result<Series> {
    let values: Vec<Option<bool>> = series
        .str()?
        .into_iter()
        .map(|v| {
            v.and_then(|s| {
                if is_boolean_true(s) {
                    Some(true)
                } else if is_boolean_false(s) {
                    Some(false)
                } else {
                    None
                }
            })
        })
        .collect();
    Ok(Series::new(series.name().clone(), values))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_standardize_name() {
        assert_eq!(standardize_name("Loan Amount"), "loan_amount");
        assert_eq!(standardize_name("Int.Rate (%)"), "int_rate_");
        assert_eq!(standardize_name("issue_d"), "issue_d");
    }

    #[test]
    fn test_column_names_are_standardized() {
        let df = df! {
            "Loan Amount" => &[1000i64, 2000],
            "Grade" => &["A", "B"],
        }
        .unwrap();

        let (out, _, _) = TypeCoercer::new().coerce(df, true).unwrap();
        let names: Vec<String> = out
            .get_column_names()
            .iter()
            .map(|n| n.to_string())
            .collect();
        assert_eq!(names, vec!["loan_amount", "grade"]);
    }

    #[test]
    fn test_percent_strings_become_real() {
        let df = df! {
            "int_rate" => &["10.5%", "15.2%"],
        }
        .unwrap();

        let (out, schema, _) = TypeCoercer::new().coerce(df, true).unwrap();
        assert_eq!(schema.column_type("int_rate"), Some(&ColumnType::Real));
        let values = out.column("int_rate").unwrap().f64().unwrap();
        assert_eq!(values.get(0), Some(10.5));
        assert_eq!(values.get(1), Some(15.2));
    }

    #[test]
    fn test_null_markers_become_null() {
        let df = df! {
            "emp_length" => &["10+ years", "nan", "NONE", ""],
        }
        .unwrap();

        let (out, _, _) = TypeCoercer::new().coerce(df, true).unwrap();
        assert_eq!(out.column("emp_length").unwrap().null_count(), 3);
    }

    #[test]
    fn test_status_columns_uppercased() {
        let df = df! {
            "loan_status" => &["fully paid", "Charged Off"],
            "grade" => &["a", "b"],
        }
        .unwrap();

        let (out, _, _) = TypeCoercer::new().coerce(df, true).unwrap();
        let status = out.column("loan_status").unwrap().str().unwrap();
        assert_eq!(status.get(0), Some("FULLY PAID"));
        assert_eq!(status.get(1), Some("CHARGED OFF"));
        let grade = out.column("grade").unwrap().str().unwrap();
        assert_eq!(grade.get(0), Some("A"));
    }

    #[test]
    fn test_dates_canonicalized() {
        let df = df! {
            "issue_d" => &["Dec-2018", "Jan-2019"],
        }
        .unwrap();

        let (out, schema, steps) = TypeCoercer::new().coerce(df, true).unwrap();
        assert_eq!(schema.column_type("issue_d"), Some(&ColumnType::Date));
        let values = out.column("issue_d").unwrap().str().unwrap();
        assert_eq!(values.get(0), Some("2018-12-01"));
        assert!(steps.iter().any(|s| s.contains("canonicalized issue_d")));
    }

    #[test]
    fn test_date_named_column_without_dates_falls_back() {
        let df = df! {
            "last_pymnt_amnt" => &["120.50", "310.00", "98.75"],
        }
        .unwrap();

        let (out, schema, _) = TypeCoercer::new().coerce(df, true).unwrap();
        assert_eq!(
            schema.column_type("last_pymnt_amnt"),
            Some(&ColumnType::Real)
        );
        let values = out.column("last_pymnt_amnt").unwrap().f64().unwrap();
        assert_eq!(values.get(0), Some(120.50));
    }

    #[test]
    fn test_date_named_text_column_stays_untyped() {
        let values: Vec<String> = (0..30).map(|i| format!("note {i}")).collect();
        let refs: Vec<&str> = values.iter().map(|s| s.as_str()).collect();
        let series = Series::new("last_note".into(), refs);
        let df = DataFrame::new(vec![series.into()]).unwrap();

        let (_, schema, _) = TypeCoercer::new().coerce(df, true).unwrap();
        assert_eq!(schema.column_type("last_note"), Some(&ColumnType::Text));
    }

    #[test]
    fn test_convert_dates_disabled_keeps_raw_values() {
        let df = df! {
            "issue_d" => &["Dec-2018", "Jan-2019"],
        }
        .unwrap();

        let (out, _, _) = TypeCoercer::new().coerce(df, false).unwrap();
        let values = out.column("issue_d").unwrap().str().unwrap();
        assert_eq!(values.get(0), Some("Dec-2018"));
    }

    #[test]
    fn test_unparseable_numeric_values_nulled() {
        let df = df! {
            "installment" => &["100", "oops", "300"],
        }
        .unwrap();

        let (out, schema, steps) = TypeCoercer::new().coerce(df, true).unwrap();
        assert_eq!(
            schema.column_type("installment"),
            Some(&ColumnType::Integer)
        );
        assert_eq!(out.column("installment").unwrap().null_count(), 1);
        assert!(steps.iter().any(|s| s.contains("unparseable")));
    }

    #[test]
    fn test_fractional_value_beyond_sample_promotes_to_real() {
        // Twenty whole-number samples type the column as integer; the
        // fractional value past the sample window must not truncate.
        let mut values: Vec<String> = (1..=20).map(|i| (i * 100).to_string()).collect();
        values.push("10.5".to_string());
        let refs: Vec<&str> = values.iter().map(|s| s.as_str()).collect();
        let series = Series::new("installment".into(), refs);
        let df = DataFrame::new(vec![series.into()]).unwrap();

        let (out, schema, steps) = TypeCoercer::new().coerce(df, true).unwrap();
        assert_eq!(schema.column_type("installment"), Some(&ColumnType::Real));
        let parsed = out.column("installment").unwrap().f64().unwrap();
        assert_eq!(parsed.get(0), Some(100.0));
        assert_eq!(parsed.get(20), Some(10.5));
        assert!(steps.iter().any(|s| s.contains("promoted installment")));
    }

    #[test]
    fn test_coercion_is_idempotent() {
        let df = df! {
            "loan_amnt" => &["10000", "12000"],
            "int_rate" => &["10.5%", "15.2%"],
            "issue_d" => &["Dec-2018", "Jan-2019"],
        }
        .unwrap();

        let coercer = TypeCoercer::new();
        let (once, first, _) = coercer.coerce(df, true).unwrap();
        let (twice, second, _) = coercer.coerce(once.clone(), true).unwrap();

        assert!(twice.equals_missing(&once));
        for (a, b) in first.columns.iter().zip(second.columns.iter()) {
            assert_eq!(a.name, b.name);
            assert_eq!(a.column_type, b.column_type);
            assert_eq!(a.null_count, b.null_count);
        }
    }

    #[test]
    fn test_duplicate_standardized_names_get_suffix() {
        let df = df! {
            "Grade" => &["A", "B"],
            "grade " => &["C", "D"],
        }
        .unwrap();

        let (out, _, _) = TypeCoercer::new().coerce(df, true).unwrap();
        let names: Vec<String> = out
            .get_column_names()
            .iter()
            .map(|n| n.to_string())
            .collect();
        assert!(names.contains(&"grade".to_string()));
        assert_eq!(names.len(), 2);
    }
}
