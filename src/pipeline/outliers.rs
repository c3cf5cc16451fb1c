//! Winsorizing of numeric columns.

use polars::prelude::*;
use tracing::debug;

use crate::error::Result;
use crate::utils::{is_integer_dtype, is_numeric_dtype};

/// Label columns that must never be clipped.
const PROTECTED_COLUMNS: [&str; 2] = ["is_default", "is_fully_paid"];

/// Clamps numeric columns to `mean ± threshold·stddev`.
pub struct Winsorizer {
    threshold: f64,
}

impl Winsorizer {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    /// Clip every unprotected numeric column in place.
    pub fn clip(&self, mut df: DataFrame, steps: &mut Vec<String>) -> Result<DataFrame> {
        let names: Vec<String> = df
            .get_column_names()
            .iter()
            .map(|n| n.to_string())
            .collect();

        for name in names {
            if PROTECTED_COLUMNS.contains(&name.as_str()) {
                continue;
            }
            let series = df.column(&name)?.as_materialized_series().clone();
            if !is_numeric_dtype(series.dtype()) {
                continue;
            }

            let (Some(mean), Some(std)) = (series.mean(), series.std(1)) else {
                continue;
            };
            if std == 0.0 || !std.is_finite() {
                continue;
            }

            let lower = mean - self.threshold * std;
            let upper = mean + self.threshold * std;

            let values = series.cast(&DataType::Float64)?;
            let mut clipped = 0usize;
            let out: Vec<Option<f64>> = values
                .f64()?
                .into_iter()
                .map(|v| {
                    v.map(|x| {
                        if x < lower {
                            clipped += 1;
                            lower
                        } else if x > upper {
                            clipped += 1;
                            upper
                        } else {
                            x
                        }
                    })
                })
                .collect();

            if clipped > 0 {
                debug!(column = %name, clipped, lower, upper, "winsorized column");
                steps.push(format!("winsorized {name} ({clipped} values clipped)"));
                let mut replacement = Series::new(series.name().clone(), out);
                // Integral columns keep their dtype so the SQL type
                // inferred at load time does not change.
                if is_integer_dtype(series.dtype()) {
                    replacement = replacement.cast(series.dtype())?;
                }
                df.replace(&name, replacement)?;
            }
        }

        Ok(df)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_extreme_values_clipped() {
        let df = df! {
            "loan_amnt" => &[10.0f64, 11.0, 9.0, 10.0, 1_000_000.0],
        }
        .unwrap();

        let mut steps = Vec::new();
        let out = Winsorizer::new(1.0).clip(df, &mut steps).unwrap();
        let values = out.column("loan_amnt").unwrap().f64().unwrap();

        let max = values.into_iter().flatten().fold(f64::MIN, f64::max);
        assert!(max < 1_000_000.0);
        assert!(steps.iter().any(|s| s.contains("winsorized loan_amnt")));
    }

    #[test]
    fn test_integer_column_keeps_integer_type() {
        let df = df! {
            "revol_bal" => &[10i64, 11, 9, 10, 1_000_000],
        }
        .unwrap();

        let mut steps = Vec::new();
        let out = Winsorizer::new(1.0).clip(df, &mut steps).unwrap();
        let values = out.column("revol_bal").unwrap().i64().unwrap();
        assert!(values.get(4).unwrap() < 1_000_000);
        assert_eq!(values.get(0), Some(10));
    }

    #[test]
    fn test_label_columns_untouched() {
        let df = df! {
            "is_default" => &[0i64, 0, 0, 0, 1],
        }
        .unwrap();

        let mut steps = Vec::new();
        let out = Winsorizer::new(1.0).clip(df, &mut steps).unwrap();
        let values = out.column("is_default").unwrap().i64().unwrap();
        assert_eq!(values.get(4), Some(1));
        assert!(steps.is_empty());
    }

    #[test]
    fn test_constant_column_untouched() {
        let df = df! {
            "dti" => &[5.0f64, 5.0, 5.0],
        }
        .unwrap();

        let mut steps = Vec::new();
        let out = Winsorizer::new(3.0).clip(df, &mut steps).unwrap();
        let values = out.column("dti").unwrap().f64().unwrap();
        assert_eq!(values.get(0), Some(5.0));
        assert!(steps.is_empty());
    }

    #[test]
    fn test_string_columns_ignored() {
        let df = df! {
            "grade" => &["A", "B"],
        }
        .unwrap();

        let mut steps = Vec::new();
        let out = Winsorizer::new(3.0).clip(df, &mut steps).unwrap();
        assert_eq!(out.column("grade").unwrap().str().unwrap().get(0), Some("A"));
    }
}
