//! Latest-loan resolution and default cohort analysis for consumer loan
//! exports.
//!
//! The pipeline runs in four pure stages:
//!
//! 1. [`loader::load`] validates the schema and types every row,
//! 2. [`analyzer::resolve_current`] keeps each borrower's latest loan,
//! 3. [`analyzer::split_cohorts`] separates defaulted from not defaulted,
//! 4. [`analyzer::aggregate`] builds summary tables per cohort.
//!
//! [`source`] (CSV and spreadsheet input) and [`report`] are the I/O edges
//! used by the runner binary.

pub mod analyzer;
pub mod buckets;
pub mod error;
pub mod loader;
pub mod models;
pub mod report;
pub mod source;
pub mod stats;

pub use analyzer::{
    aggregate, resolve_current, resolve_current_with, split_cohorts, AggregateOp, AggregateTable,
    Cohort, Cohorts, GroupKey, GroupValue, LoanAnalysis, LoanAnalyzer, TieBreak,
};
pub use buckets::{
    bucketize, BucketScheme, BucketSchemeError, BucketSchemeKind, CustomBucketScheme,
};
pub use error::{PipelineError, PipelineResult};
pub use loader::{load, RawTable, TabularSource};
pub use models::{Config, CurrentLoanState, DataSourceMode, LoanEvent, UserId, ValueField};
