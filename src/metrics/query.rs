//! Metrics queries: an expression plus the time range, rollup and scope it runs over.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ast::condition::ConditionGroup;
use crate::ast::expr::Expr;
use crate::ast::query::{Direction, Limit, Offset};

use super::context::{IndexerValue, MqlContext, RollupContext};
use super::formula::{Formula, FormulaParameter};
use super::timeseries::Timeseries;
use super::{MetricsError, MetricsResult};

/// Granularities the engine stores data at, in seconds.
pub const ALLOWED_GRANULARITIES: [u32; 4] = [10, 60, 3600, 86400];

const MIN_INTERVAL: u32 = 10;

// =============================================================================
// Expression
// =============================================================================

/// The body of a metrics query.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricsExpr {
    Timeseries(Timeseries),
    Formula(Formula),
}

impl MetricsExpr {
    pub fn check(&self) -> MetricsResult<()> {
        match self {
            MetricsExpr::Timeseries(ts) => ts.check(),
            MetricsExpr::Formula(f) => f.check(),
        }
    }

    pub fn filters(&self) -> &[ConditionGroup] {
        match self {
            MetricsExpr::Timeseries(ts) => &ts.filters,
            MetricsExpr::Formula(f) => &f.filters,
        }
    }

    pub fn groupby(&self) -> &[Expr] {
        match self {
            MetricsExpr::Timeseries(ts) => &ts.groupby,
            MetricsExpr::Formula(f) => &f.groupby,
        }
    }

    /// Every timeseries in the tree, left to right.
    pub fn timeseries(&self) -> Vec<&Timeseries> {
        let mut found = Vec::new();
        match self {
            MetricsExpr::Timeseries(ts) => found.push(ts),
            MetricsExpr::Formula(f) => collect_timeseries(f, &mut found),
        }
        found
    }

    pub fn set_filters(&self, filters: Vec<ConditionGroup>) -> MetricsResult<MetricsExpr> {
        Ok(match self {
            MetricsExpr::Timeseries(ts) => MetricsExpr::Timeseries(ts.set_filters(filters)?),
            MetricsExpr::Formula(f) => MetricsExpr::Formula(f.set_filters(filters)?),
        })
    }

    pub fn set_groupby(&self, groupby: Vec<Expr>) -> MetricsResult<MetricsExpr> {
        Ok(match self {
            MetricsExpr::Timeseries(ts) => MetricsExpr::Timeseries(ts.set_groupby(groupby)?),
            MetricsExpr::Formula(f) => MetricsExpr::Formula(f.set_groupby(groupby)?),
        })
    }
}

fn collect_timeseries<'a>(formula: &'a Formula, found: &mut Vec<&'a Timeseries>) {
    for param in &formula.parameters {
        match param {
            FormulaParameter::Timeseries(ts) => found.push(ts),
            FormulaParameter::Formula(f) => collect_timeseries(f, found),
            FormulaParameter::Int(_) | FormulaParameter::Float(_) | FormulaParameter::String(_) => {}
        }
    }
}

impl From<Timeseries> for MetricsExpr {
    fn from(ts: Timeseries) -> Self {
        MetricsExpr::Timeseries(ts)
    }
}

impl From<Formula> for MetricsExpr {
    fn from(f: Formula) -> Self {
        MetricsExpr::Formula(f)
    }
}

// =============================================================================
// Rollup and scope
// =============================================================================

/// How results are bucketed in time: by `interval` seconds, or as a single
/// totals row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rollup {
    pub interval: Option<u32>,
    pub totals: Option<bool>,
    pub orderby: Option<Direction>,
    pub granularity: Option<u32>,
}

impl Rollup {
    /// A timeseries rollup. The granularity is the largest allowed one that
    /// divides the interval.
    pub fn interval(interval: u32) -> MetricsResult<Self> {
        let rollup = Self {
            interval: Some(interval),
            totals: None,
            orderby: None,
            granularity: infer_granularity(interval),
        };
        rollup.check()?;
        Ok(rollup)
    }

    /// A single totals row.
    pub fn totals(orderby: Option<Direction>, granularity: Option<u32>) -> MetricsResult<Self> {
        let rollup = Self {
            interval: None,
            totals: Some(true),
            orderby,
            granularity,
        };
        rollup.check()?;
        Ok(rollup)
    }

    pub fn with_granularity(self, granularity: u32) -> MetricsResult<Self> {
        let rollup = Self {
            granularity: Some(granularity),
            ..self
        };
        rollup.check()?;
        Ok(rollup)
    }

    pub fn check(&self) -> MetricsResult<()> {
        if let Some(granularity) = self.granularity {
            if !ALLOWED_GRANULARITIES.contains(&granularity) {
                return Err(MetricsError::InvalidRollup(format!(
                    "granularity must be one of {ALLOWED_GRANULARITIES:?}"
                )));
            }
        }

        let totals = self.totals.unwrap_or(false);
        match self.interval {
            Some(_) if totals => {
                return Err(MetricsError::InvalidRollup(
                    "only one of interval and totals can be set".to_string(),
                ))
            }
            Some(interval) => {
                if interval < MIN_INTERVAL {
                    return Err(MetricsError::InvalidRollup(format!(
                        "interval must be at least {MIN_INTERVAL} seconds"
                    )));
                }
                if self.granularity.is_some_and(|g| interval < g) {
                    return Err(MetricsError::InvalidRollup(
                        "interval must be greater than or equal to granularity".to_string(),
                    ));
                }
                if self.orderby.is_some() {
                    return Err(MetricsError::InvalidRollup(
                        "timeseries queries can't be ordered when using interval".to_string(),
                    ));
                }
            }
            None if !totals => {
                return Err(MetricsError::InvalidRollup(
                    "rollup must have one of interval or totals".to_string(),
                ))
            }
            None => {}
        }
        Ok(())
    }

    pub(crate) fn to_context(self) -> RollupContext {
        RollupContext {
            orderby: self.orderby.map(|d| d.as_str().to_string()),
            granularity: self.granularity,
            interval: self.interval,
            with_totals: self.totals.map(|t| if t { "True" } else { "False" }.to_string()),
        }
    }

    pub(crate) fn from_context(ctx: &RollupContext) -> MetricsResult<Self> {
        let orderby = match ctx.orderby.as_deref() {
            None => None,
            Some("ASC") => Some(Direction::Asc),
            Some("DESC") => Some(Direction::Desc),
            Some(other) => {
                return Err(MetricsError::InvalidRollup(format!(
                    "unknown orderby direction '{other}'"
                )))
            }
        };
        let totals = match ctx.with_totals.as_deref() {
            None => None,
            Some("True") => Some(true),
            Some("False") => Some(false),
            Some(other) => {
                return Err(MetricsError::InvalidRollup(format!(
                    "with_totals must be True or False, got '{other}'"
                )))
            }
        };
        let rollup = Self {
            interval: ctx.interval,
            totals,
            orderby,
            granularity: ctx.granularity.or_else(|| ctx.interval.and_then(infer_granularity)),
        };
        rollup.check()?;
        Ok(rollup)
    }
}

fn infer_granularity(interval: u32) -> Option<u32> {
    ALLOWED_GRANULARITIES
        .iter()
        .rev()
        .copied()
        .find(|g| interval % g == 0)
}

/// The organisation, projects and use case every metrics query is confined to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MetricsScope {
    pub org_ids: Vec<i64>,
    pub project_ids: Vec<i64>,
    pub use_case_id: Option<String>,
}

impl MetricsScope {
    pub fn new(org_ids: Vec<i64>, project_ids: Vec<i64>) -> Self {
        Self {
            org_ids,
            project_ids,
            use_case_id: None,
        }
    }

    pub fn with_use_case_id(self, use_case_id: &str) -> Self {
        Self {
            use_case_id: Some(use_case_id.to_string()),
            ..self
        }
    }

    pub fn check(&self) -> MetricsResult<()> {
        if self.org_ids.is_empty() {
            return Err(MetricsError::InvalidScope("org_ids must not be empty".to_string()));
        }
        if self.project_ids.is_empty() {
            return Err(MetricsError::InvalidScope(
                "project_ids must not be empty".to_string(),
            ));
        }
        if matches!(self.use_case_id.as_deref(), Some("")) {
            return Err(MetricsError::InvalidScope(
                "use_case_id must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Query
// =============================================================================

/// A query over one metrics expression. Built incrementally and only
/// validated when asked to, so intermediate values may be incomplete.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricsQuery {
    pub query: Option<MetricsExpr>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub rollup: Option<Rollup>,
    pub scope: Option<MetricsScope>,
    pub limit: Option<Limit>,
    pub offset: Option<Offset>,
    pub indexer_mappings: BTreeMap<String, IndexerValue>,
}

impl MetricsQuery {
    pub fn new(query: impl Into<MetricsExpr>) -> Self {
        Self {
            query: Some(query.into()),
            ..Self::default()
        }
    }

    pub fn set_query(&self, query: impl Into<MetricsExpr>) -> MetricsQuery {
        Self {
            query: Some(query.into()),
            ..self.clone()
        }
    }

    pub fn set_start(&self, start: DateTime<Utc>) -> MetricsQuery {
        Self {
            start: Some(start),
            ..self.clone()
        }
    }

    pub fn set_end(&self, end: DateTime<Utc>) -> MetricsQuery {
        Self {
            end: Some(end),
            ..self.clone()
        }
    }

    pub fn set_rollup(&self, rollup: Rollup) -> MetricsQuery {
        Self {
            rollup: Some(rollup),
            ..self.clone()
        }
    }

    pub fn set_scope(&self, scope: MetricsScope) -> MetricsQuery {
        Self {
            scope: Some(scope),
            ..self.clone()
        }
    }

    pub fn set_limit(&self, limit: u32) -> MetricsResult<MetricsQuery> {
        Ok(Self {
            limit: Some(Limit::new(limit)?),
            ..self.clone()
        })
    }

    pub fn set_offset(&self, offset: u64) -> MetricsQuery {
        Self {
            offset: Some(Offset::new(offset)),
            ..self.clone()
        }
    }

    pub fn set_indexer_mappings(&self, mappings: BTreeMap<String, IndexerValue>) -> MetricsQuery {
        Self {
            indexer_mappings: mappings,
            ..self.clone()
        }
    }

    /// Everything needed to send the query must be present and consistent.
    pub fn validate(&self) -> MetricsResult<()> {
        tracing::debug!("validating metrics query");
        self.query.as_ref().ok_or_else(|| missing("query"))?.check()?;

        let start = self.start.ok_or_else(|| missing("start"))?;
        let end = self.end.ok_or_else(|| missing("end"))?;
        if start >= end {
            return Err(MetricsError::InvalidQuery(
                "start must be before end".to_string(),
            ));
        }

        let rollup = self.rollup.as_ref().ok_or_else(|| missing("rollup"))?;
        rollup.check()?;
        if rollup.granularity.is_none() {
            return Err(MetricsError::InvalidRollup(
                "granularity must be set before the query is sent".to_string(),
            ));
        }

        self.scope.as_ref().ok_or_else(|| missing("scope"))?.check()
    }

    /// The out-of-grammar part of the query.
    pub fn context(&self) -> MetricsResult<MqlContext> {
        let start = self.start.ok_or_else(|| missing("start"))?;
        let end = self.end.ok_or_else(|| missing("end"))?;
        let rollup = self.rollup.ok_or_else(|| missing("rollup"))?;
        let scope = self.scope.clone().ok_or_else(|| missing("scope"))?;
        Ok(MqlContext {
            start: format_timestamp(start),
            end: format_timestamp(end),
            rollup: rollup.to_context(),
            scope,
            limit: self.limit.map(|l| l.get()),
            offset: self.offset.map(|o| o.get()),
            indexer_mappings: self.indexer_mappings.clone(),
        })
    }

    /// Validate, then return `{"mql": <text>, "mql_context": <context>}`.
    pub fn serialize_to_mql(&self) -> MetricsResult<Value> {
        self.validate()?;
        let query = self.query.as_ref().ok_or_else(|| missing("query"))?;
        if let Some(ts) = query.timeseries().into_iter().find(|ts| ts.metric.mql_name().is_none()) {
            return Err(MetricsError::InvalidMetric(format!(
                "metric {} needs an mri or public name to be printed",
                ts.metric.id.unwrap_or_default()
            )));
        }
        let mql = query.to_mql();
        tracing::debug!(mql = %mql, "serializing metrics query");
        let context = serde_json::to_value(self.context()?)
            .map_err(|e| MetricsError::Serialize(e.to_string()))?;
        Ok(serde_json::json!({
            "mql": mql,
            "mql_context": context,
        }))
    }

    /// Fill the fields carried by a context. Fields the context does not
    /// describe are left as they are.
    pub fn apply_context(&self, context: &MqlContext) -> MetricsResult<MetricsQuery> {
        Ok(Self {
            start: Some(parse_timestamp("start", &context.start)?),
            end: Some(parse_timestamp("end", &context.end)?),
            rollup: Some(Rollup::from_context(&context.rollup)?),
            scope: Some(context.scope.clone()),
            limit: context.limit.map(Limit::new).transpose()?,
            offset: context.offset.map(Offset::new),
            indexer_mappings: context.indexer_mappings.clone(),
            ..self.clone()
        })
    }
}

pub(crate) fn missing(field: &str) -> MetricsError {
    MetricsError::InvalidQuery(format!("{field} is required for a metrics query"))
}

/// RFC 3339 with an explicit `+00:00` offset.
fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(chrono::SecondsFormat::AutoSi, false)
}

fn parse_timestamp(field: &str, value: &str) -> MetricsResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| MetricsError::InvalidQuery(format!("{field} '{value}' is not RFC 3339: {e}")))
}
