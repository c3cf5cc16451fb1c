//! Date parsing and canonicalisation.
//!
//! Loan exports mix several textual date layouts. Formats are tried in
//! a fixed order; the first format that parses at least one non-null
//! value wins for the whole column, and values that miss the winning
//! format become null. Day-first versus month-first layouts are
//! inherently ambiguous, so a win by one of those is reported to the
//! caller instead of being guessed silently.

use chrono::NaiveDate;
use polars::prelude::*;

use crate::error::Result;

/// A candidate textual date layout.
#[derive(Debug, Clone, Copy)]
pub struct DateFormat {
    /// Human-readable name of the layout.
    pub name: &'static str,
    /// chrono format string.
    pub pattern: &'static str,
    /// The value carries no day component ("Dec-2018"); the first of
    /// the month is assumed.
    pub month_only: bool,
    /// Day and month positions cannot be told apart for values <= 12.
    pub ambiguous: bool,
}

/// Formats in resolution order. Order is part of the contract: the
/// unambiguous ISO layout is tried before either slash/dash layout.
pub static DATE_FORMATS: [DateFormat; 4] = [
    DateFormat {
        name: "month-year",
        pattern: "%b-%Y",
        month_only: true,
        ambiguous: false,
    },
    DateFormat {
        name: "iso",
        pattern: "%Y-%m-%d",
        month_only: false,
        ambiguous: false,
    },
    DateFormat {
        name: "us-slash",
        pattern: "%m/%d/%Y",
        month_only: false,
        ambiguous: true,
    },
    DateFormat {
        name: "day-first-dash",
        pattern: "%d-%m-%Y",
        month_only: false,
        ambiguous: true,
    },
];

/// Parse one value under one format.
pub fn parse_date(value: &str, format: &DateFormat) -> Option<NaiveDate> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    if format.month_only {
        NaiveDate::parse_from_str(&format!("01-{trimmed}"), "%d-%b-%Y").ok()
    } else {
        NaiveDate::parse_from_str(trimmed, format.pattern).ok()
    }
}

/// Outcome of canonicalising one date column.
pub struct CanonicalDates {
    /// `YYYY-MM-DD` strings, null where parsing failed.
    pub series: Series,
    /// The winning format.
    pub format: &'static DateFormat,
    /// Number of non-null inputs the winning format failed to parse.
    pub unparsed: usize,
}

/// Canonicalise a string column of dates to `YYYY-MM-DD`.
///
/// Returns `None` when no format parses a single non-null value; the
/// caller keeps the column as text in that case.
pub fn canonicalize_dates(series: &Series) -> Result<Option<CanonicalDates>> {
    let str_series = series.cast(&DataType::String)?;
    let values = str_series.str()?;

    for format in DATE_FORMATS.iter() {
        let mut parsed_any = false;
        let mut unparsed = 0usize;
        let mut out: Vec<Option<String>> = Vec::with_capacity(values.len());

        for value in values.into_iter() {
            match value {
                Some(v) => match parse_date(v, format) {
                    Some(date) => {
                        parsed_any = true;
                        out.push(Some(date.format("%Y-%m-%d").to_string()));
                    }
                    None => {
                        unparsed += 1;
                        out.push(None);
                    }
                },
                None => out.push(None),
            }
        }

        if parsed_any {
            return Ok(Some(CanonicalDates {
                series: Series::new(series.name().clone(), out),
                format,
                unparsed,
            }));
        }
    }

    Ok(None)
}
