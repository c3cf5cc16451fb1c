//! CLI entry point for the loan ETL pipeline.

use anyhow::{Result, anyhow};
use clap::Parser;
use loan_etl::{EtlPipeline, PipelineConfig, RunStatus};
use polars::io::csv::read::CsvReadOptions;
use polars::prelude::*;
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Loan-portfolio ETL: clean, enrich and load into SQLite",
    long_about = "Reads a raw loan-portfolio CSV, resolves column types, fills missing\n\
                  values, derives analytical features and loads the result into a\n\
                  SQLite table in validated transactional batches.\n\n\
                  EXAMPLES:\n  \
                  # Basic usage\n  \
                  loan-etl -i loans.csv\n\n  \
                  # Custom database and table\n  \
                  loan-etl -i loans.csv --database out/loans.db --table portfolio\n\n  \
                  # Winsorize numeric columns before loading\n  \
                  loan-etl -i loans.csv --remove-outliers --outlier-threshold 2.5"
)]
struct Args {
    /// Path to the CSV file to process
    #[arg(short, long)]
    input: String,

    /// Path to the SQLite database file
    #[arg(long, default_value = "data/loans.db")]
    database: String,

    /// Destination table name
    #[arg(long, default_value = "loans")]
    table: String,

    /// Rows per write transaction
    #[arg(long, default_value = "500")]
    batch_size: usize,

    /// Maximum number of columns kept in the final dataset
    #[arg(long, default_value = "25")]
    max_columns: usize,

    /// Winsorize numeric columns before loading
    #[arg(long)]
    remove_outliers: bool,

    /// Standard-deviation multiple for winsorizing
    #[arg(long, default_value = "3.0")]
    outlier_threshold: f64,

    /// Skip missing-value handling
    #[arg(long)]
    no_missing_handling: bool,

    /// Skip date canonicalisation
    #[arg(long)]
    no_date_conversion: bool,

    /// Skip feature derivation
    #[arg(long)]
    no_features: bool,

    /// Directory for the cleaned-data CSV checkpoint
    #[arg(long, default_value = "data/processed")]
    processed_dir: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

fn init_logging(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level);

    if !std::path::Path::new(&args.input).exists() {
        return Err(anyhow!("Input file not found: {}", args.input));
    }

    info!("Loading dataset from: {}", args.input);
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .try_into_reader_with_file_path(Some(args.input.clone().into()))?
        .finish()?;
    info!("Dataset loaded: {:?}", df.shape());

    let config = PipelineConfig::builder()
        .database_path(&args.database)
        .table_name(&args.table)
        .batch_size(args.batch_size)
        .max_columns(args.max_columns)
        .remove_outliers(args.remove_outliers)
        .outlier_threshold(args.outlier_threshold)
        .handle_missing(!args.no_missing_handling)
        .convert_dates(!args.no_date_conversion)
        .create_features(!args.no_features)
        .processed_dir(&args.processed_dir)
        .build()?;

    let pipeline = EtlPipeline::new(config)?;
    let report = pipeline.run(&df);

    println!("{}", serde_json::to_string_pretty(&report)?);

    match report.status {
        RunStatus::Success => Ok(()),
        RunStatus::Failed => Err(anyhow!(
            "pipeline failed: {}",
            report.error.unwrap_or_else(|| "unknown error".to_string())
        )),
    }
}
