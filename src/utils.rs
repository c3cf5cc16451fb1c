//! Shared utilities for the ETL pipeline.
//!
//! Common helper functions used across multiple modules to reduce
//! duplication and keep parsing behaviour consistent.

use polars::prelude::*;

// =============================================================================
// Data Type Utilities
// =============================================================================

/// Check if a DataType is numeric (integer or float).
#[inline]
pub fn is_numeric_dtype(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
            | DataType::Float32
            | DataType::Float64
    )
}

/// Check if a DataType is an integer type.
#[inline]
pub fn is_integer_dtype(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
    )
}

// =============================================================================
// String Parsing Utilities
// =============================================================================

/// Characters commonly used in numeric formatting that should be stripped.
pub const NUMERIC_FORMAT_CHARS: [char; 4] = [',', '$', '%', ' '];

/// Text markers that represent a missing value.
pub const NULL_MARKERS: [&str; 5] = ["nan", "none", "null", "na", ""];

/// Check if a string is a null marker.
///
/// # Example
///
/// ```rust,ignore
/// use loan_etl::utils::is_null_marker;
///
/// assert!(is_null_marker("NaN"));
/// assert!(is_null_marker("  null  "));
/// assert!(!is_null_marker("42"));
/// ```
pub fn is_null_marker(s: &str) -> bool {
    let lower = s.trim().to_ascii_lowercase();
    NULL_MARKERS.iter().any(|&marker| lower == marker)
}

/// Clean a string for numeric parsing by removing formatting characters.
///
/// # Example
///
/// ```rust,ignore
/// use loan_etl::utils::clean_numeric_string;
///
/// assert_eq!(clean_numeric_string("$1,234.56"), "1234.56");
/// assert_eq!(clean_numeric_string("  13.5%  "), "13.5");
/// ```
pub fn clean_numeric_string(s: &str) -> String {
    let mut result = s.trim().to_string();
    for c in NUMERIC_FORMAT_CHARS {
        result = result.replace(c, "");
    }
    result
}

/// Try to parse a string as a numeric value (f64).
///
/// Handles percentage suffixes, currency symbols and thousands separators.
pub fn parse_numeric_string(s: &str) -> Option<f64> {
    let cleaned = clean_numeric_string(s);
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok()
}

/// Check if a string can be parsed as a numeric value.
pub fn is_numeric_string(s: &str) -> bool {
    parse_numeric_string(s).is_some()
}

/// Check if a string value looks like a float (has a decimal point or
/// fractional part).
pub fn looks_like_float(s: &str) -> bool {
    let cleaned = clean_numeric_string(s);
    if let Ok(num) = cleaned.parse::<f64>() {
        cleaned.contains('.') || num.fract() != 0.0
    } else {
        false
    }
}

// =============================================================================
// Series Statistics Utilities
// =============================================================================

/// Calculate the mode (most frequent value) of a string Series.
///
/// Ties break lexicographically so the result is deterministic.
pub fn string_mode(series: &Series) -> Option<String> {
    let non_null = series.drop_nulls();
    if non_null.is_empty() {
        return None;
    }

    let str_series = non_null.cast(&DataType::String).ok()?;
    let str_chunked = str_series.str().ok()?;

    let mut value_counts: std::collections::HashMap<String, usize> =
        std::collections::HashMap::new();
    for val in str_chunked.into_iter().flatten() {
        *value_counts.entry(val.to_string()).or_insert(0) += 1;
    }

    value_counts
        .into_iter()
        .max_by(|(a_val, a_count), (b_val, b_count)| {
            a_count.cmp(b_count).then(b_val.cmp(a_val))
        })
        .map(|(val, _)| val)
}

/// Count values in a string Series that can be parsed as numeric.
pub fn count_numeric_values(series: &Series) -> (usize, usize) {
    let mut numeric_count = 0;
    let mut total_count = 0;

    if let Ok(str_series) = series.str() {
        for val in str_series.into_iter().flatten() {
            let trimmed = val.trim();
            if is_null_marker(trimmed) {
                continue;
            }
            total_count += 1;
            if is_numeric_string(trimmed) {
                numeric_count += 1;
            }
        }
    }

    (numeric_count, total_count)
}

/// Get the ratio of numeric-parseable values in a string Series.
pub fn numeric_ratio(series: &Series) -> f64 {
    let (numeric_count, total_count) = count_numeric_values(series);
    if total_count == 0 {
        0.0
    } else {
        numeric_count as f64 / total_count as f64
    }
}

// =============================================================================
// Series Transformation Utilities
// =============================================================================

/// Fill null values in a numeric Series with a specific value.
pub fn fill_numeric_nulls(series: &Series, fill_value: f64) -> PolarsResult<Series> {
    let float_series = series.cast(&DataType::Float64)?;
    let values = float_series.f64()?;
    let filled: Vec<f64> = values
        .into_iter()
        .map(|v| v.unwrap_or(fill_value))
        .collect();
    Ok(Series::new(series.name().clone(), filled))
}

/// Fill null values in a string Series with a specific value.
pub fn fill_string_nulls(series: &Series, fill_value: &str) -> PolarsResult<Series> {
    let str_series = series.cast(&DataType::String)?;
    let values = str_series.str()?;
    let filled: Vec<String> = values
        .into_iter()
        .map(|v| v.unwrap_or(fill_value).to_string())
        .collect();
    Ok(Series::new(series.name().clone(), filled))
}

/// Collect up to `max_samples` non-null string values from a Series.
pub fn collect_string_samples(series: &Series, max_samples: usize) -> Vec<String> {
    let mut samples = Vec::new();
    if let Ok(str_series) = series.str() {
        for val in str_series.into_iter().flatten() {
            if samples.len() >= max_samples {
                break;
            }
            samples.push(val.to_string());
        }
    }
    samples
}

// =============================================================================
// Boolean Detection Utilities
// =============================================================================

/// Common boolean true representations.
pub const BOOLEAN_TRUE_VALUES: [&str; 6] = ["true", "yes", "t", "y", "on", "1"];

/// Common boolean false representations.
pub const BOOLEAN_FALSE_VALUES: [&str; 6] = ["false", "no", "f", "n", "off", "0"];

/// Check if a string represents a boolean true value.
pub fn is_boolean_true(s: &str) -> bool {
    let lower = s.trim().to_ascii_lowercase();
    BOOLEAN_TRUE_VALUES.iter().any(|&v| v == lower)
}

/// Check if a string represents a boolean false value.
pub fn is_boolean_false(s: &str) -> bool {
    let lower = s.trim().to_ascii_lowercase();
    BOOLEAN_FALSE_VALUES.iter().any(|&v| v == lower)
}

/// Check if a string represents a boolean value (true or false).
pub fn is_boolean_string(s: &str) -> bool {
    is_boolean_true(s) || is_boolean_false(s)
}

// =============================================================================
// Tests
// =============================================================================
