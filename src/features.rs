//! Analytical feature derivation.
//!
//! Each feature is a pure function over the frame with a declared
//! input-column list. Features are evaluated in a fixed order; a
//! feature whose inputs are absent is skipped with a log line, and
//! derived values that come out NaN or infinite are stored as null.

use chrono::{Datelike, NaiveDate};
use polars::prelude::*;
use tracing::{debug, info};

use crate::error::Result;

/// Loan statuses counted as defaulted.
pub const DEFAULT_STATUSES: [&str; 5] = [
    "CHARGED OFF",
    "DEFAULT",
    "LATE (31-120 DAYS)",
    "LATE (16-30 DAYS)",
    "IN GRACE PERIOD",
];

/// Loan status counted as fully repaid.
pub const FULLY_PAID_STATUS: &str = "FULLY PAID";

const INCOME_EDGES: [f64; 5] = [0.0, 30_000.0, 60_000.0, 100_000.0, 200_000.0];
const INCOME_LABELS: [&str; 5] = ["Very low", "Low", "Medium", "High", "Very high"];

const CREDIT_AGE_EDGES: [f64; 5] = [0.0, 2.0, 5.0, 10.0, 20.0];
const CREDIT_AGE_LABELS: [&str; 5] = ["0-2 yrs", "2-5 yrs", "5-10 yrs", "10-20 yrs", "20+ yrs"];

const INT_RATE_EDGES: [f64; 6] = [0.0, 5.0, 10.0, 15.0, 20.0, 30.0];
const INT_RATE_LABELS: [&str; 6] = ["0-5%", "5-10%", "10-15%", "15-20%", "20-30%", "30%+"];

/// A named derivation with a declared input-column list.
pub struct DerivedFeatureSpec {
    pub name: &'static str,
    pub inputs: &'static [&'static str],
    build: fn(&DataFrame) -> Result<Vec<Series>>,
}

/// Derivations in evaluation order.
pub const FEATURE_SPECS: [DerivedFeatureSpec; 7] = [
    DerivedFeatureSpec {
        name: "loan_outcomes",
        inputs: &["loan_status"],
        build: build_loan_outcomes,
    },
    DerivedFeatureSpec {
        name: "income_category",
        inputs: &["annual_inc"],
        build: build_income_category,
    },
    DerivedFeatureSpec {
        name: "loan_to_income_ratio",
        inputs: &["loan_amnt", "annual_inc"],
        build: build_loan_to_income_ratio,
    },
    DerivedFeatureSpec {
        name: "credit_age",
        inputs: &["issue_d", "earliest_cr_line"],
        build: build_credit_age,
    },
    DerivedFeatureSpec {
        name: "risk_category",
        inputs: &["grade"],
        build: build_risk_category,
    },
    DerivedFeatureSpec {
        name: "issue_date_parts",
        inputs: &["issue_d"],
        build: build_issue_date_parts,
    },
    DerivedFeatureSpec {
        name: "int_rate_category",
        inputs: &["int_rate"],
        build: build_int_rate_category,
    },
];

/// Evaluates the derivation set against a cleaned frame.
pub struct FeatureDeriver;

impl FeatureDeriver {
    pub fn new() -> Self {
        Self
    }

    /// Derive all features whose inputs are present.
    pub fn derive(&self, mut df: DataFrame, steps: &mut Vec<String>) -> Result<DataFrame> {
        let mut derived = 0usize;
        for spec in FEATURE_SPECS.iter() {
            let missing: Vec<&str> = spec
                .inputs
                .iter()
                .filter(|c| df.column(c).is_err())
                .copied()
                .collect();
            if !missing.is_empty() {
                debug!(
                    feature = spec.name,
                    missing = ?missing,
                    "skipping feature, inputs absent"
                );
                steps.push(format!("skipped {} (missing inputs)", spec.name));
                continue;
            }

            for series in (spec.build)(&df)? {
                df.with_column(series)?;
                derived += 1;
            }
            steps.push(format!("derived {}", spec.name));
        }

        info!(columns = derived, "feature derivation complete");
        Ok(df)
    }
}

impl Default for FeatureDeriver {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Builders
// =============================================================================

fn build_loan_outcomes(df: &DataFrame) -> Result<Vec<Series>> {
    let statuses = string_values(df, "loan_status")?;

    let is_default: Vec<Option<i64>> = statuses
        .iter()
        .map(|s| {
            s.as_deref().map(|status| {
                let upper = status.to_uppercase();
                i64::from(DEFAULT_STATUSES.iter().any(|d| *d == upper))
            })
        })
        .collect();

    let is_fully_paid: Vec<Option<i64>> = statuses
        .iter()
        .map(|s| {
            s.as_deref()
                .map(|status| i64::from(status.to_uppercase() == FULLY_PAID_STATUS))
        })
        .collect();

    Ok(vec![
        Series::new("is_default".into(), is_default),
        Series::new("is_fully_paid".into(), is_fully_paid),
    ])
}

fn build_income_category(df: &DataFrame) -> Result<Vec<Series>> {
    let incomes = numeric_values(df, "annual_inc")?;
    let categories: Vec<Option<&str>> = incomes
        .iter()
        .map(|v| v.and_then(|inc| bucket(inc, &INCOME_EDGES, &INCOME_LABELS)))
        .collect();
    Ok(vec![Series::new("income_category".into(), categories)])
}

fn build_loan_to_income_ratio(df: &DataFrame) -> Result<Vec<Series>> {
    let amounts = numeric_values(df, "loan_amnt")?;
    let incomes = numeric_values(df, "annual_inc")?;

    let ratios: Vec<Option<f64>> = amounts
        .iter()
        .zip(incomes.iter())
        .map(|(amount, income)| match (amount, income) {
            (Some(a), Some(i)) if *i != 0.0 => {
                let ratio = a / i;
                ratio.is_finite().then_some(ratio)
            }
            _ => None,
        })
        .collect();

    Ok(vec![Series::new("loan_to_income_ratio".into(), ratios)])
}

fn build_credit_age(df: &DataFrame) -> Result<Vec<Series>> {
    let issued = string_values(df, "issue_d")?;
    let earliest = string_values(df, "earliest_cr_line")?;

    let years: Vec<Option<f64>> = issued
        .iter()
        .zip(earliest.iter())
        .map(|(issue, first_line)| {
            let issue = issue.as_deref().and_then(parse_canonical_date)?;
            let first = first_line.as_deref().and_then(parse_canonical_date)?;
            Some((issue - first).num_days() as f64 / 365.25)
        })
        .collect();

    let categories: Vec<Option<&str>> = years
        .iter()
        .map(|v| v.and_then(|y| bucket(y, &CREDIT_AGE_EDGES, &CREDIT_AGE_LABELS)))
        .collect();

    Ok(vec![
        Series::new("credit_age_years".into(), years),
        Series::new("credit_age_category".into(), categories),
    ])
}

fn build_risk_category(df: &DataFrame) -> Result<Vec<Series>> {
    let grades = string_values(df, "grade")?;
    let categories: Vec<Option<&str>> = grades
        .iter()
        .map(|g| g.as_deref().and_then(risk_for_grade))
        .collect();
    Ok(vec![Series::new("risk_category".into(), categories)])
}

fn build_issue_date_parts(df: &DataFrame) -> Result<Vec<Series>> {
    let issued = string_values(df, "issue_d")?;
    let dates: Vec<Option<NaiveDate>> = issued
        .iter()
        .map(|v| v.as_deref().and_then(parse_canonical_date))
        .collect();

    let years: Vec<Option<i64>> = dates.iter().map(|d| d.map(|d| d.year() as i64)).collect();
    let months: Vec<Option<i64>> = dates.iter().map(|d| d.map(|d| d.month() as i64)).collect();
    let quarters: Vec<Option<i64>> = dates
        .iter()
        .map(|d| d.map(|d| ((d.month() - 1) / 3 + 1) as i64))
        .collect();
    let seasons: Vec<Option<&str>> = dates
        .iter()
        .map(|d| d.map(|d| season_for_month(d.month())))
        .collect();

    Ok(vec![
        Series::new("issue_year".into(), years),
        Series::new("issue_month".into(), months),
        Series::new("issue_quarter".into(), quarters),
        Series::new("issue_season".into(), seasons),
    ])
}

fn build_int_rate_category(df: &DataFrame) -> Result<Vec<Series>> {
    let rates = numeric_values(df, "int_rate")?;
    let categories: Vec<Option<&str>> = rates
        .iter()
        .map(|v| v.and_then(|rate| bucket(rate, &INT_RATE_EDGES, &INT_RATE_LABELS)))
        .collect();
    Ok(vec![Series::new("int_rate_category".into(), categories)])
}

// =============================================================================
// Helpers
// =============================================================================

/// Map a grade letter to its risk label.
pub fn risk_for_grade(grade: &str) -> Option<&'static str> {
    match grade.trim().to_uppercase().as_str() {
        "A" => Some("Low risk"),
        "B" => Some("Moderate risk"),
        "C" => Some("Medium risk"),
        "D" => Some("High risk"),
        "E" => Some("Very high risk"),
        "F" | "G" => Some("Extreme risk"),
        _ => None,
    }
}

/// Map a calendar month to its season.
pub fn season_for_month(month: u32) -> &'static str {
    match month {
        12 | 1 | 2 => "Winter",
        3..=5 => "Spring",
        6..=8 => "Summer",
        _ => "Autumn",
    }
}

fn parse_canonical_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()
}

/// Left-closed bucketing: `edges[i] <= value < edges[i + 1]`, with the
/// last bucket open-ended. Values below the first edge or non-finite
/// values get no bucket.
fn bucket(value: f64, edges: &[f64], labels: &[&'static str]) -> Option<&'static str> {
    if !value.is_finite() || value < edges[0] {
        return None;
    }
    for i in (0..edges.len()).rev() {
        if value >= edges[i] {
            return Some(labels[i]);
        }
    }
    None
}

fn numeric_values(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    let series = df
        .column(name)?
        .as_materialized_series()
        .cast(&DataType::Float64)?;
    Ok(series.f64()?.into_iter().collect())
}

fn string_values(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>> {
    let series = df
        .column(name)?
        .as_materialized_series()
        .cast(&DataType::String)?;
    Ok(series
        .str()?
        .into_iter()
        .map(|v| v.map(|s| s.to_string()))
        .collect())
}
