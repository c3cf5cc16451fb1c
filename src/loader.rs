//! Batched SQLite loading.
//!
//! The destination table is replaced on every load (`DROP TABLE IF
//! EXISTS` + `CREATE TABLE`), rows are written in fixed-size batches
//! with one transaction per batch, and a failed batch rolls back only
//! itself. Committed batches stay in place; the outcome is reported as
//! an explicit [`LoadResult`].

use polars::prelude::*;
use rusqlite::{Connection, params_from_iter, types::Value as SqlValue};
use std::path::Path;
use tracing::{debug, info, warn};

use crate::error::{EtlError, Result};
use crate::types::LoadResult;

/// Columns indexed after a complete load.
const INDEX_COLUMNS: [&str; 4] = ["grade", "loan_status", "issue_d", "is_default"];

/// Analytical views created over the destination table.
const VIEWS: [(&str, &str); 3] = [
    (
        "dashboard_kpis",
        "SELECT COUNT(*) AS total_loans,
                SUM(loan_amnt) AS total_volume,
                AVG(loan_amnt) AS avg_loan_amnt,
                AVG(int_rate) AS avg_int_rate,
                AVG(is_default) * 100.0 AS default_rate_pct",
    ),
    (
        "grade_analysis",
        "SELECT grade,
                COUNT(*) AS loan_count,
                AVG(loan_amnt) AS avg_loan_amnt,
                AVG(int_rate) AS avg_int_rate,
                AVG(is_default) * 100.0 AS default_rate_pct",
    ),
    (
        "time_analysis",
        "SELECT issue_d,
                COUNT(*) AS loan_count,
                SUM(loan_amnt) AS total_volume,
                AVG(is_default) * 100.0 AS default_rate_pct",
    ),
];

/// Writes a cleaned frame into a SQLite table in batches.
pub struct SqliteLoader {
    conn: Connection,
    table: String,
    batch_size: usize,
}

impl SqliteLoader {
    /// Open (or create) the database and tune it for bulk writes.
    pub fn open(path: impl AsRef<Path>, table: impl Into<String>, batch_size: usize) -> Result<Self> {
        let conn = Connection::open(path.as_ref())?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA cache_size = -64000;",
        )?;
        info!(path = %path.as_ref().display(), "opened database");
        Ok(Self {
            conn,
            table: table.into(),
            batch_size,
        })
    }

    /// Open an in-memory database.
    pub fn open_in_memory(table: impl Into<String>, batch_size: usize) -> Result<Self> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
            table: table.into(),
            batch_size,
        })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Replace the table, write all batches and, when every batch
    /// committed, create the index set.
    pub fn load(&mut self, df: &DataFrame) -> Result<LoadResult> {
        self.create_table(df)?;
        let result = self.insert_batches(df)?;
        if result.is_complete() {
            self.create_indexes(df);
        }
        Ok(result)
    }

    /// Drop and recreate the destination table from the frame schema.
    pub fn create_table(&self, df: &DataFrame) -> Result<()> {
        let columns: Vec<String> = df
            .get_columns()
            .iter()
            .map(|c| {
                let series = c.as_materialized_series();
                format!("\"{}\" {}", series.name(), infer_sql_type(series))
            })
            .collect();

        self.conn
            .execute(&format!("DROP TABLE IF EXISTS \"{}\"", self.table), [])?;
        self.conn.execute(
            &format!("CREATE TABLE \"{}\" ({})", self.table, columns.join(", ")),
            [],
        )?;
        debug!(table = %self.table, columns = columns.len(), "table recreated");
        Ok(())
    }

    /// Write the frame in `batch_size` row slices, one transaction per
    /// slice. The first failed batch stops the load; earlier batches
    /// stay committed.
    pub fn insert_batches(&mut self, df: &DataFrame) -> Result<LoadResult> {
        let names: Vec<String> = df
            .get_column_names()
            .iter()
            .map(|n| format!("\"{n}\""))
            .collect();
        let placeholders: Vec<&str> = names.iter().map(|_| "?").collect();
        let insert_sql = format!(
            "INSERT INTO \"{}\" ({}) VALUES ({})",
            self.table,
            names.join(", "),
            placeholders.join(", ")
        );

        let height = df.height();
        let mut committed_batches = 0usize;
        let mut rows_written = 0usize;

        for (batch_index, offset) in (0..height).step_by(self.batch_size.max(1)).enumerate() {
            let len = self.batch_size.min(height - offset);
            let batch = df.slice(offset as i64, len);

            // Extract before opening the transaction so a frame error
            // cannot leave one dangling.
            let rows = extract_rows(&batch)?;

            let tx = self.conn.transaction()?;
            let outcome = (|| -> std::result::Result<(), rusqlite::Error> {
                let mut stmt = tx.prepare(&insert_sql)?;
                for row in &rows {
                    stmt.execute(params_from_iter(row.iter()))?;
                }
                Ok(())
            })();

            match outcome {
                Ok(()) => {
                    tx.commit()?;
                    committed_batches += 1;
                    rows_written += len;
                    debug!(batch = batch_index, rows = len, "batch committed");
                }
                Err(e) => {
                    // Dropping the transaction rolls it back.
                    drop(tx);
                    warn!(batch = batch_index, error = %e, "batch failed, rolled back");
                    return Ok(LoadResult {
                        committed_batches,
                        failed_batch_index: Some(batch_index),
                        rows_written,
                    });
                }
            }
        }

        info!(
            table = %self.table,
            batches = committed_batches,
            rows = rows_written,
            "load complete"
        );
        Ok(LoadResult {
            committed_batches,
            failed_batch_index: None,
            rows_written,
        })
    }

    /// Create the standard index set. Failures are logged and skipped;
    /// indexes are an optimisation, not part of the load contract.
    pub fn create_indexes(&self, df: &DataFrame) {
        for column in INDEX_COLUMNS {
            if df.column(column).is_err() {
                continue;
            }
            let sql = format!(
                "CREATE INDEX IF NOT EXISTS \"idx_{table}_{column}\" ON \"{table}\" (\"{column}\")",
                table = self.table
            );
            if let Err(e) = self.conn.execute(&sql, []) {
                warn!(column, error = %e, "index creation failed, skipping");
            }
        }
    }

    /// Create the analytical views. Idempotent and safe to re-run.
    pub fn create_views(&self) -> Result<()> {
        for (name, select) in VIEWS {
            let group_by = match name {
                "grade_analysis" => " FROM \"{table}\" GROUP BY grade ORDER BY grade",
                "time_analysis" => " FROM \"{table}\" GROUP BY issue_d ORDER BY issue_d",
                _ => " FROM \"{table}\"",
            }
            .replace("{table}", &self.table);
            let sql = format!("CREATE VIEW IF NOT EXISTS \"{name}\" AS {select}{group_by}");
            self.conn.execute(&sql, [])?;
        }
        debug!(views = VIEWS.len(), "analytical views in place");
        Ok(())
    }

    /// Number of rows currently in the destination table.
    pub fn row_count(&self) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM \"{}\"", self.table),
            [],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as usize)
    }
}

/// SQL column type from the first non-null value of a series.
fn infer_sql_type(series: &Series) -> &'static str {
    match series.dtype() {
        dtype if crate::utils::is_integer_dtype(dtype) => return "INTEGER",
        DataType::Float32 | DataType::Float64 => return "REAL",
        DataType::Boolean => return "INTEGER",
        _ => {}
    }

    let non_null = series.drop_nulls();
    if let Ok(values) = non_null.str() {
        if let Some(first) = values.into_iter().flatten().next() {
            if looks_like_iso_date(first) {
                return "DATE";
            }
        }
    }
    "TEXT"
}

/// `YYYY-MM-DD`, the canonical date layout produced by cleaning.
fn looks_like_iso_date(value: &str) -> bool {
    let bytes = value.as_bytes();
    bytes.len() == 10
        && bytes[4] == b'-'
        && bytes[7] == b'-'
        && bytes
            .iter()
            .enumerate()
            .all(|(i, b)| matches!(i, 4 | 7) || b.is_ascii_digit())
}

/// Convert one frame slice into rows of SQLite values.
fn extract_rows(batch: &DataFrame) -> Result<Vec<Vec<SqlValue>>> {
    let height = batch.height();
    let mut rows: Vec<Vec<SqlValue>> = (0..height)
        .map(|_| Vec::with_capacity(batch.width()))
        .collect();

    for column in batch.get_columns() {
        let series = column.as_materialized_series();
        for (i, row) in rows.iter_mut().enumerate() {
            let value = series.get(i)?;
            row.push(anyvalue_to_sql(&value)?);
        }
    }

    Ok(rows)
}

/// Map a Polars value to a SQLite value. Non-finite floats become null.
fn anyvalue_to_sql(value: &AnyValue) -> Result<SqlValue> {
    Ok(match value {
        AnyValue::Null => SqlValue::Null,
        AnyValue::Boolean(b) => SqlValue::Integer(i64::from(*b)),
        AnyValue::String(s) => SqlValue::Text((*s).to_string()),
        AnyValue::StringOwned(s) => SqlValue::Text(s.to_string()),
        AnyValue::Float32(f) => {
            let f = f64::from(*f);
            if f.is_finite() {
                SqlValue::Real(f)
            } else {
                SqlValue::Null
            }
        }
        AnyValue::Float64(f) => {
            if f.is_finite() {
                SqlValue::Real(*f)
            } else {
                SqlValue::Null
            }
        }
        other => {
            if let Ok(i) = other.try_extract::<i64>() {
                SqlValue::Integer(i)
            } else if let Ok(f) = other.try_extract::<f64>() {
                SqlValue::Real(f)
            } else {
                return Err(EtlError::UnsupportedValue(format!("{other:?}")));
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample_frame() -> DataFrame {
        df! {
            "loan_amnt" => &[1000.0f64, 2000.0, 3000.0, 4000.0, 5000.0],
            "issue_d" => &["2019-01-01", "2019-02-01", "2019-03-01", "2019-04-01", "2019-05-01"],
            "loan_status" => &["FULLY PAID", "CURRENT", "CHARGED OFF", "CURRENT", "FULLY PAID"],
            "is_default" => &[0i64, 0, 1, 0, 0],
        }
        .unwrap()
    }

    #[test]
    fn test_infer_sql_types() {
        let df = df! {
            "a" => &[1i64, 2],
            "b" => &[1.5f64, 2.5],
            "c" => &["2019-01-01", "2019-02-01"],
            "d" => &["hello", "world"],
            "e" => &[true, false],
        }
        .unwrap();

        let types: Vec<&str> = df
            .get_columns()
            .iter()
            .map(|c| infer_sql_type(c.as_materialized_series()))
            .collect();
        assert_eq!(types, vec!["INTEGER", "REAL", "DATE", "TEXT", "INTEGER"]);
    }

    #[test]
    fn test_looks_like_iso_date() {
        assert!(looks_like_iso_date("2019-01-01"));
        assert!(!looks_like_iso_date("2019-1-1"));
        assert!(!looks_like_iso_date("01/01/2019"));
        assert!(!looks_like_iso_date("2019-01-01x"));
    }

    #[test]
    fn test_load_round_trip() {
        let mut loader = SqliteLoader::open_in_memory("loans", 2).unwrap();
        let df = sample_frame();

        let result = loader.load(&df).unwrap();
        assert!(result.is_complete());
        assert_eq!(result.committed_batches, 3);
        assert_eq!(result.rows_written, 5);
        assert_eq!(loader.row_count().unwrap(), 5);

        let status: String = loader
            .connection()
            .query_row(
                "SELECT loan_status FROM loans WHERE loan_amnt = 3000",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(status, "CHARGED OFF");
    }

    #[test]
    fn test_load_replaces_table() {
        let mut loader = SqliteLoader::open_in_memory("loans", 100).unwrap();
        loader.load(&sample_frame()).unwrap();
        loader.load(&sample_frame()).unwrap();
        assert_eq!(loader.row_count().unwrap(), 5);
    }

    #[test]
    fn test_failed_batch_keeps_earlier_batches() {
        let mut loader = SqliteLoader::open_in_memory("loans", 2).unwrap();
        let df = sample_frame();
        loader.create_table(&df).unwrap();

        // Abort any insert in the second batch.
        loader
            .connection()
            .execute_batch(
                "CREATE TRIGGER reject_mid BEFORE INSERT ON loans
                 WHEN NEW.loan_amnt = 3000.0
                 BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
            )
            .unwrap();

        let result = loader.insert_batches(&df).unwrap();
        assert_eq!(result.committed_batches, 1);
        assert_eq!(result.failed_batch_index, Some(1));
        assert_eq!(result.rows_written, 2);
        assert_eq!(loader.row_count().unwrap(), 2);
    }

    #[test]
    fn test_nulls_round_trip() {
        let df = df! {
            "loan_amnt" => &[Some(1000.0f64), None],
            "issue_d" => &[Some("2019-01-01"), None],
        }
        .unwrap();

        let mut loader = SqliteLoader::open_in_memory("loans", 500).unwrap();
        let result = loader.load(&df).unwrap();
        assert!(result.is_complete());

        let nulls: i64 = loader
            .connection()
            .query_row(
                "SELECT COUNT(*) FROM loans WHERE loan_amnt IS NULL",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(nulls, 1);
    }

    #[test]
    fn test_views_created_and_idempotent() {
        let mut loader = SqliteLoader::open_in_memory("loans", 500).unwrap();
        let df = df! {
            "loan_amnt" => &[1000.0f64, 2000.0],
            "int_rate" => &[10.0f64, 12.0],
            "grade" => &["A", "B"],
            "issue_d" => &["2019-01-01", "2019-02-01"],
            "is_default" => &[0i64, 1],
        }
        .unwrap();

        loader.load(&df).unwrap();
        loader.create_views().unwrap();
        loader.create_views().unwrap();

        let total: f64 = loader
            .connection()
            .query_row("SELECT total_volume FROM dashboard_kpis", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(total, 3000.0);

        let grades: i64 = loader
            .connection()
            .query_row("SELECT COUNT(*) FROM grade_analysis", [], |row| row.get(0))
            .unwrap();
        assert_eq!(grades, 2);
    }

    #[test]
    fn test_boolean_stored_as_integer() {
        let df = df! {
            "flag" => &[true, false],
        }
        .unwrap();

        let mut loader = SqliteLoader::open_in_memory("loans", 500).unwrap();
        loader.load(&df).unwrap();

        let ones: i64 = loader
            .connection()
            .query_row("SELECT COUNT(*) FROM loans WHERE flag = 1", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(ones, 1);
    }
}
