//! Missing-value resolution.
//!
//! Fill values are derived from the column itself under a fixed policy
//! table, then rows missing any critical field are dropped. Date
//! columns are left null; fabricating dates would poison the derived
//! calendar features.

use polars::prelude::*;
use tracing::{debug, info};

use crate::error::Result;
use crate::quality::CRITICAL_COLUMNS;
use crate::types::{ColumnType, ResolvedSchema};
use crate::utils::{fill_numeric_nulls, fill_string_nulls, string_mode};

/// Sentinel for categorical values that cannot be recovered.
pub const UNKNOWN_SENTINEL: &str = "UNKNOWN";

/// Missing-share above which the mode is no longer trusted for
/// categorical columns and rates fall back to zero.
const HIGH_MISSING_PCT: f64 = 30.0;

/// Resolves missing values per column, then enforces critical fields.
pub struct MissingValueResolver;

impl MissingValueResolver {
    pub fn new() -> Self {
        Self
    }

    /// Fill missing values, then drop rows still missing a critical
    /// field.
    ///
    /// Returns the resolved frame and the exact number of rows dropped.
    pub fn resolve(
        &self,
        mut df: DataFrame,
        schema: &ResolvedSchema,
        steps: &mut Vec<String>,
    ) -> Result<(DataFrame, usize)> {
        for profile in &schema.columns {
            let name = profile.name.as_str();
            let series = df.column(name)?.as_materialized_series().clone();
            let null_count = series.null_count();
            if null_count == 0 {
                continue;
            }
            let missing_pct = null_count as f64 / series.len().max(1) as f64 * 100.0;

            match &profile.column_type {
                ColumnType::Categorical(_) | ColumnType::Text => {
                    let fill = if missing_pct <= HIGH_MISSING_PCT {
                        string_mode(&series).unwrap_or_else(|| UNKNOWN_SENTINEL.to_string())
                    } else {
                        UNKNOWN_SENTINEL.to_string()
                    };
                    let filled = fill_string_nulls(&series, &fill)?;
                    df.replace(name, filled)?;
                    steps.push(format!("imputed {name} with '{fill}' ({null_count} values)"));
                }
                ColumnType::Boolean => {
                    if let Some(fill) = boolean_mode(&series)? {
                        let values: Vec<bool> = series
                            .bool()?
                            .into_iter()
                            .map(|v| v.unwrap_or(fill))
                            .collect();
                        df.replace(name, Series::new(series.name().clone(), values))?;
                        steps.push(format!("imputed {name} with {fill} ({null_count} values)"));
                    }
                }
                ColumnType::Integer | ColumnType::Real => {
                    let rate_like = name.contains("rate") || name.contains("pct");
                    let fill = if missing_pct > HIGH_MISSING_PCT && rate_like {
                        0.0
                    } else {
                        series.median().unwrap_or(0.0)
                    };
                    let filled = fill_numeric_nulls(&series, fill)?;
                    let filled = if profile.column_type == ColumnType::Integer {
                        filled.cast(&DataType::Int64)?
                    } else {
                        filled
                    };
                    df.replace(name, filled)?;
                    steps.push(format!("imputed {name} with {fill} ({null_count} values)"));
                }
                ColumnType::Date => {
                    debug!(column = name, nulls = null_count, "date nulls left in place");
                }
            }
        }

        // Only gaps imputation could not repair remain; in practice
        // these are dates that failed every parse pattern. Rows still
        // null in a critical field are unusable.
        let before = df.height();
        let df = drop_rows_missing_critical(df)?;
        let dropped = before - df.height();
        if dropped > 0 {
            info!(rows = dropped, "dropped rows missing critical fields");
            steps.push(format!("dropped {dropped} rows missing critical fields"));
        }

        Ok((df, dropped))
    }
}

impl Default for MissingValueResolver {
    fn default() -> Self {
        Self::new()
    }
}

/// Most frequent boolean value, if any non-null values exist.
fn boolean_mode(series: &Series) -> Result<Option<bool>> {
    let values = series.bool()?;
    let mut trues = 0usize;
    let mut falses = 0usize;
    for v in values.into_iter().flatten() {
        if v {
            trues += 1;
        } else {
            falses += 1;
        }
    }
    if trues == 0 && falses == 0 {
        return Ok(None);
    }
    Ok(Some(trues >= falses))
}

/// Drop rows that are null in any critical column present in the frame.
fn drop_rows_missing_critical(df: DataFrame) -> Result<DataFrame> {
    let mut mask: Option<BooleanChunked> = None;
    for name in CRITICAL_COLUMNS {
        let Ok(column) = df.column(name) else {
            continue;
        };
        let nulls = column.as_materialized_series().is_null();
        mask = Some(match mask {
            Some(m) => &m | &nulls,
            None => nulls,
        });
    }

    match mask {
        Some(m) => Ok(df.filter(&!m)?),
        None => Ok(df),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profiler::DataProfiler;
    use pretty_assertions::assert_eq;

    fn resolve(df: DataFrame) -> (DataFrame, usize, Vec<String>) {
        let schema = DataProfiler::new().profile(&df).unwrap();
        let mut steps = Vec::new();
        let (out, dropped) = MissingValueResolver::new()
            .resolve(df, &schema, &mut steps)
            .unwrap();
        (out, dropped, steps)
    }

    #[test]
    fn test_numeric_median_imputation() {
        let df = df! {
            "installment" => &[Some(100.0f64), None, Some(300.0)],
        }
        .unwrap();

        let (out, _, steps) = resolve(df);
        let values = out.column("installment").unwrap().f64().unwrap();
        assert_eq!(values.get(1), Some(200.0));
        assert!(steps.iter().any(|s| s.contains("imputed installment")));
    }

    #[test]
    fn test_rate_column_high_missing_fills_zero() {
        let df = df! {
            "util_rate" => &[Some(10.0f64), None, None, None],
        }
        .unwrap();

        let (out, _, _) = resolve(df);
        let values = out.column("util_rate").unwrap().f64().unwrap();
        assert_eq!(values.get(1), Some(0.0));
        assert_eq!(out.column("util_rate").unwrap().null_count(), 0);
    }

    #[test]
    fn test_categorical_mode_imputation() {
        let values: Vec<Option<&str>> = vec![
            Some("A"), Some("A"), Some("B"), None, Some("A"),
            Some("B"), Some("A"), Some("B"), Some("A"), Some("B"),
            Some("A"), Some("B"), Some("A"), Some("B"), Some("A"),
            Some("B"), Some("A"), Some("B"), Some("A"), Some("B"),
            Some("A"),
        ];
        let series = Series::new("grade".into(), values);
        let df = DataFrame::new(vec![series.into()]).unwrap();

        let (out, _, _) = resolve(df);
        let values = out.column("grade").unwrap().str().unwrap();
        assert_eq!(values.get(3), Some("A"));
    }

    #[test]
    fn test_high_missing_categorical_gets_sentinel() {
        let values: Vec<Option<&str>> = vec![
            Some("A"), None, None, None, None,
            None, None, None, None, None,
        ];
        let series = Series::new("purpose".into(), values);
        let df = DataFrame::new(vec![series.into()]).unwrap();

        let (out, _, _) = resolve(df);
        let values = out.column("purpose").unwrap().str().unwrap();
        assert_eq!(values.get(1), Some("UNKNOWN"));
    }

    #[test]
    fn test_date_nulls_left_in_place_without_critical_columns() {
        let df = df! {
            "last_pymnt_d" => &[Some("2019-01-01"), None],
        }
        .unwrap();

        let (out, dropped, _) = resolve(df);
        assert_eq!(dropped, 0);
        assert_eq!(out.column("last_pymnt_d").unwrap().null_count(), 1);
    }

    #[test]
    fn test_null_critical_numeric_is_filled_and_kept() {
        let df = df! {
            "loan_amnt" => &[Some(1000.0f64), None, Some(3000.0)],
            "issue_d" => &[Some("2019-01-01"), Some("2019-02-01"), Some("2019-03-01")],
            "loan_status" => &[Some("FULLY PAID"), Some("CURRENT"), Some("FULLY PAID")],
        }
        .unwrap();

        let (out, dropped, _) = resolve(df);
        assert_eq!(dropped, 0);
        assert_eq!(out.height(), 3);
        let amounts = out.column("loan_amnt").unwrap().f64().unwrap();
        assert_eq!(amounts.get(1), Some(2000.0));
    }

    #[test]
    fn test_rows_with_unrecoverable_critical_fields_dropped() {
        let df = df! {
            "loan_amnt" => &[Some(1000.0f64), Some(2000.0), Some(3000.0)],
            "issue_d" => &[Some("2019-01-01"), None, Some("2019-03-01")],
            "loan_status" => &[Some("FULLY PAID"), Some("CURRENT"), None],
        }
        .unwrap();

        // The null status is imputed; only the date gap survives
        // imputation and drops its row.
        let (out, dropped, _) = resolve(df);
        assert_eq!(dropped, 1);
        assert_eq!(out.height(), 2);
        let amounts = out.column("loan_amnt").unwrap().f64().unwrap();
        assert_eq!(amounts.get(0), Some(1000.0));
        assert_eq!(amounts.get(1), Some(3000.0));
        let statuses = out.column("loan_status").unwrap().str().unwrap();
        assert_eq!(statuses.get(1), Some("UNKNOWN"));
    }

    #[test]
    fn test_fully_null_column_does_not_crash() {
        let series = Series::new("mths_since".into(), &[None::<f64>, None, None]);
        let df = DataFrame::new(vec![series.into()]).unwrap();

        let (out, _, _) = resolve(df);
        assert_eq!(out.column("mths_since").unwrap().null_count(), 0);
        let values = out.column("mths_since").unwrap().f64().unwrap();
        assert_eq!(values.get(0), Some(0.0));
    }
}
