//! Loan-Portfolio ETL Library
//!
//! A transformation-and-validated-load pipeline for tabular loan data,
//! built with Rust and Polars.
//!
//! # Overview
//!
//! The pipeline takes a raw loan export and carries it through a fixed
//! sequence of stages:
//!
//! - **Type Coercion**: column-name standardisation, text sanitisation,
//!   logical type resolution and date canonicalisation
//! - **Missing-Value Resolution**: policy-driven imputation and the
//!   critical-field row drop
//! - **Feature Derivation**: default/repayment flags, income and rate
//!   buckets, credit age, risk and calendar features
//! - **Validation Gates**: one before the load, one against the table
//!   after it
//! - **Batched Load**: transactional SQLite writes with indexes and
//!   analytical views
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use loan_etl::{EtlPipeline, PipelineConfig};
//! use polars::io::csv::read::CsvReadOptions;
//! use polars::prelude::*;
//!
//! let df = CsvReadOptions::default()
//!     .with_has_header(true)
//!     .try_into_reader_with_file_path(Some("loans.csv".into()))?
//!     .finish()?;
//!
//! let config = PipelineConfig::builder()
//!     .database_path("data/loans.db")
//!     .batch_size(500)
//!     .build()?;
//!
//! let report = EtlPipeline::new(config)?.run(&df);
//! println!("{:?} in {} ms", report.status, report.duration_ms);
//! ```

pub mod cleaner;
pub mod config;
pub mod error;
pub mod features;
pub mod imputers;
pub mod loader;
pub mod pipeline;
pub mod profiler;
pub mod quality;
pub mod types;
pub mod utils;

pub use cleaner::TypeCoercer;
pub use config::{ConfigValidationError, PipelineConfig};
pub use error::{EtlError, Result, ResultExt};
pub use features::FeatureDeriver;
pub use imputers::MissingValueResolver;
pub use loader::SqliteLoader;
pub use pipeline::EtlPipeline;
pub use pipeline::outliers::Winsorizer;
pub use profiler::DataProfiler;
pub use quality::DataValidator;
pub use types::{
    ColumnProfile, ColumnType, LoadResult, ResolvedSchema, RunReport, RunStatus, StageStats,
    ValidationReport, ValidationStats, ValidationStatus,
};
