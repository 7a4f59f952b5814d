//! Metrics queries: timeseries, formulas and the query that wraps them.
//!
//! Metrics queries are rendered as MQL (see `printer::mql`) and can be
//! parsed back with `mql::parse_mql`. A timeseries query can also be lowered
//! to an event query (see `printer::metrics`).

pub mod context;
pub mod formula;
pub mod query;
pub mod timeseries;

use thiserror::Error;

use crate::ast::error::StructuralError;

pub use context::{IndexerValue, MqlContext, RollupContext};
pub use formula::{ArithmeticOperator, Formula, FormulaFunction, FormulaParameter};
pub use query::{MetricsExpr, MetricsQuery, MetricsScope, Rollup, ALLOWED_GRANULARITIES};
pub use timeseries::{Metric, Timeseries};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum MetricsError {
    #[error("invalid metric: {0}")]
    InvalidMetric(String),

    #[error("invalid timeseries: {0}")]
    InvalidTimeseries(String),

    #[error("invalid formula: {0}")]
    InvalidFormula(String),

    #[error("invalid rollup: {0}")]
    InvalidRollup(String),

    #[error("invalid scope: {0}")]
    InvalidScope(String),

    #[error("invalid metrics query: {0}")]
    InvalidQuery(String),

    #[error(transparent)]
    Structural(#[from] StructuralError),

    #[error("failed to serialize mql context: {0}")]
    Serialize(String),
}

pub type MetricsResult<T> = Result<T, MetricsError>;
