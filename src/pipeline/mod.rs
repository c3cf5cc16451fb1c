//! Pipeline orchestration.
//!
//! The orchestrator wires the stages in a strict forward order:
//! coercion, missing-value resolution, feature derivation, optional
//! winsorizing, column selection, the pre-load validation gate, a CSV
//! checkpoint, the batched load and the post-load gate. The input
//! frame is borrowed read-only and never mutated.

pub mod outliers;

use polars::prelude::*;
use static_assertions::assert_impl_all;
use std::path::Path;
use std::time::Instant;
use tracing::{error, info};

use crate::cleaner::TypeCoercer;
use crate::config::PipelineConfig;
use crate::error::{EtlError, Result, ResultExt};
use crate::features::FeatureDeriver;
use crate::imputers::MissingValueResolver;
use crate::loader::SqliteLoader;
use crate::quality::DataValidator;
use crate::types::{RunReport, RunStatus, StageStats};

use outliers::Winsorizer;

/// Columns always kept when present, in priority order.
const ESSENTIAL_COLUMNS: [&str; 17] = [
    "loan_amnt",
    "int_rate",
    "term",
    "grade",
    "issue_d",
    "loan_status",
    "annual_inc",
    "dti",
    "home_ownership",
    "emp_length",
    "purpose",
    "addr_state",
    "delinq_2yrs",
    "revol_util",
    "total_pymnt",
    "is_default",
    "is_fully_paid",
];

/// Columns kept after the essentials while room remains.
const ADDITIONAL_COLUMNS: [&str; 14] = [
    "funded_amnt",
    "installment",
    "sub_grade",
    "verification_status",
    "earliest_cr_line",
    "inq_last_6mths",
    "open_acc",
    "pub_rec",
    "revol_bal",
    "total_acc",
    "total_rec_prncp",
    "total_rec_int",
    "last_pymnt_d",
    "last_pymnt_amnt",
];

/// The complete transform-and-load pipeline.
pub struct EtlPipeline {
    config: PipelineConfig,
}

assert_impl_all!(EtlPipeline: Send);

impl EtlPipeline {
    /// Create a pipeline with a validated configuration.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| EtlError::InvalidConfig(e.to_string()))?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run the full pipeline. Never panics and never retries; the
    /// first captured error surfaces in the report.
    pub fn run(&self, df: &DataFrame) -> RunReport {
        let started = Instant::now();
        match self.run_internal(df) {
            Ok((rows_processed, stage_stats)) => {
                let duration_ms = started.elapsed().as_millis() as u64;
                info!(rows = rows_processed, duration_ms, "pipeline run succeeded");
                RunReport {
                    status: RunStatus::Success,
                    duration_ms,
                    rows_processed,
                    database_path: self.config.database_path.display().to_string(),
                    stage_stats,
                    error: None,
                }
            }
            Err(e) => {
                let duration_ms = started.elapsed().as_millis() as u64;
                error!(error = %e, duration_ms, "pipeline run failed");
                RunReport {
                    status: RunStatus::Failed,
                    duration_ms,
                    rows_processed: 0,
                    database_path: self.config.database_path.display().to_string(),
                    stage_stats: Vec::new(),
                    error: Some(e.to_string()),
                }
            }
        }
    }

    fn run_internal(&self, df: &DataFrame) -> Result<(usize, Vec<StageStats>)> {
        let mut stage_stats = Vec::new();

        let started = Instant::now();
        let cleaned = self.transform(df)?;
        stage_stats.push(StageStats {
            stage: "transform".to_string(),
            rows: cleaned.height(),
            columns: cleaned.width(),
            duration_ms: started.elapsed().as_millis() as u64,
        });

        let started = Instant::now();
        let rows_loaded = self.load(&cleaned)?;
        stage_stats.push(StageStats {
            stage: "load".to_string(),
            rows: rows_loaded,
            columns: cleaned.width(),
            duration_ms: started.elapsed().as_millis() as u64,
        });

        Ok((rows_loaded, stage_stats))
    }

    /// The transform stage: returns the cleaned, validated and
    /// checkpointed frame.
    pub fn transform(&self, df: &DataFrame) -> Result<DataFrame> {
        let mut steps = Vec::new();

        let (df, schema, mut coercion_steps) = TypeCoercer::new()
            .coerce(df.clone(), self.config.convert_dates)
            .context("type coercion")?;
        steps.append(&mut coercion_steps);

        let df = if self.config.handle_missing {
            let (df, _dropped) = MissingValueResolver::new()
                .resolve(df, &schema, &mut steps)
                .context("missing-value resolution")?;
            df
        } else {
            df
        };

        let df = if self.config.create_features {
            FeatureDeriver::new()
                .derive(df, &mut steps)
                .context("feature derivation")?
        } else {
            df
        };

        let df = if self.config.remove_outliers {
            Winsorizer::new(self.config.outlier_threshold)
                .clip(df, &mut steps)
                .context("winsorizing")?
        } else {
            df
        };

        let df = select_columns(df, self.config.max_columns)?;

        let report = DataValidator::new().validate_cleaned(&df)?;
        if report.is_fail() {
            return Err(EtlError::ValidationFailed(report.issues.join("; ")));
        }

        self.checkpoint(&df)?;
        info!(steps = steps.len(), rows = df.height(), "transform complete");
        Ok(df)
    }

    /// The load stage: batched write, views, post-load gate.
    fn load(&self, df: &DataFrame) -> Result<usize> {
        if let Some(parent) = self.config.database_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut loader = SqliteLoader::open(
            &self.config.database_path,
            &self.config.table_name,
            self.config.batch_size,
        )?;
        let result = loader.load(df).context("batched load")?;
        if let Some(index) = result.failed_batch_index {
            return Err(EtlError::BatchFailed {
                index,
                reason: format!(
                    "{} of {} rows committed before the failure",
                    result.rows_written,
                    df.height()
                ),
            });
        }

        loader.create_views().context("view creation")?;

        let report =
            DataValidator::new().validate_loaded(loader.connection(), &self.config.table_name, df.height())?;
        if report.is_fail() {
            return Err(EtlError::ValidationFailed(report.issues.join("; ")));
        }

        Ok(result.rows_written)
    }

    /// Write the cleaned frame as CSV into the processed directory.
    fn checkpoint(&self, df: &DataFrame) -> Result<()> {
        std::fs::create_dir_all(&self.config.processed_dir)?;
        let path = self.config.processed_dir.join("cleaned_loans.csv");
        write_csv(df, &path)?;
        info!(path = %path.display(), "checkpoint written");
        Ok(())
    }
}

/// Keep essential then additional columns in priority order, then the
/// remaining columns in frame order, capped at `max_columns`.
fn select_columns(df: DataFrame, max_columns: usize) -> Result<DataFrame> {
    let present: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|n| n.to_string())
        .collect();

    let mut selected: Vec<String> = Vec::new();
    for name in ESSENTIAL_COLUMNS
        .iter()
        .chain(ADDITIONAL_COLUMNS.iter())
        .map(|n| n.to_string())
        .chain(present.iter().cloned())
    {
        if selected.len() >= max_columns {
            break;
        }
        if present.contains(&name) && !selected.contains(&name) {
            selected.push(name);
        }
    }

    if selected.len() < present.len() {
        info!(
            kept = selected.len(),
            dropped = present.len() - selected.len(),
            "column selection applied"
        );
    }
    Ok(df.select(selected)?)
}

fn write_csv(df: &DataFrame, path: &Path) -> Result<()> {
    let mut file = std::fs::File::create(path)?;
    let mut df = df.clone();
    CsvWriter::new(&mut file).finish(&mut df)?;
    Ok(())
}
