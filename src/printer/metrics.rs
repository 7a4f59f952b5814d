//! Metrics queries in the event dialect.
//!
//! A timeseries query is lowered onto an ordinary `Query` over the metric's
//! entity and printed by the event printer:
//!
//! ```text
//! MATCH (entity) SELECT agg(value) AS aggregate_value
//! BY toStartOfInterval(...) AS time, <groupby>
//! WHERE granularity = g AND metric_id = id AND <filters> AND <scope> AND <time range>
//! ORDER BY time ASC
//! ```
//!
//! Formulas have no event form.

use crate::ast::condition::{Condition, ConditionGroup, Op};
use crate::ast::entity::Entity;
use crate::ast::expr::{col, func, func_as, Column, CurriedFunction, Expr, Function, Scalar};
use crate::ast::query::{Direction, OrderBy, Query};
use crate::metrics::query::missing;
use crate::metrics::{
    MetricsError, MetricsExpr, MetricsQuery, MetricsResult, MetricsScope, Rollup, Timeseries,
};

use super::Printer;

/// Alias of the aggregated value; totals rollups order by it.
pub const AGGREGATE_ALIAS: &str = "aggregate_value";

/// Alias of the time bucket of an interval rollup.
pub const TIME_ALIAS: &str = "time";

impl MetricsQuery {
    /// Validate, then build the event query this metrics query stands for.
    pub fn to_event_query(&self) -> MetricsResult<Query> {
        self.validate()?;
        let ts = match self.query.as_ref().ok_or_else(|| missing("query"))? {
            MetricsExpr::Timeseries(ts) => ts,
            MetricsExpr::Formula(_) => {
                return Err(MetricsError::InvalidQuery(
                    "formulas cannot be rendered as SnQL".to_string(),
                ))
            }
        };
        let rollup = self.rollup.ok_or_else(|| missing("rollup"))?;
        let scope = self.scope.as_ref().ok_or_else(|| missing("scope"))?;
        let start = self.start.ok_or_else(|| missing("start"))?;
        let end = self.end.ok_or_else(|| missing("end"))?;

        let (entity, metric_id) = match (&ts.metric.entity, ts.metric.id) {
            (Some(entity), Some(id)) => (entity, id),
            _ => {
                return Err(MetricsError::InvalidMetric(
                    "metric needs an entity and an id to be rendered as SnQL".to_string(),
                ))
            }
        };

        let mut groupby = Vec::new();
        if let Some(interval) = rollup.interval {
            groupby.push(time_bucket(interval)?);
        }
        groupby.extend(ts.groupby.iter().cloned());

        let mut where_ = vec![
            eq("granularity", rollup_granularity(&rollup)?)?,
            eq("metric_id", Scalar::Int(metric_id))?,
        ];
        where_.extend(ts.filters.iter().cloned());
        where_.extend(scope_conditions(scope)?);
        where_.push(binary("timestamp", Op::Gte, start)?);
        where_.push(binary("timestamp", Op::Lt, end)?);

        let mut query = Query::new(Entity::new(entity)?)
            .set_select(vec![aggregate(ts)?])?
            .set_where(where_);
        if !groupby.is_empty() {
            query = query.set_groupby(groupby)?;
        }
        if let Some(orderby) = rollup_orderby(&rollup)? {
            query = query.set_orderby(vec![orderby]);
        }
        if let Some(limit) = self.limit {
            query = query.set_limit(limit.get())?;
        }
        if let Some(offset) = self.offset {
            query = query.set_offset(offset.get());
        }
        // A totals row only means something next to grouped rows.
        if rollup.totals == Some(true) && !query.groupby().is_empty() {
            query = query.set_totals(true);
        }
        Ok(query)
    }

    /// Single-line event query text.
    pub fn serialize_to_snql(&self) -> MetricsResult<String> {
        Printer::new(false).print_metrics_query(self)
    }
}

impl Printer {
    /// Render a timeseries metrics query in the event dialect.
    pub fn print_metrics_query(&self, query: &MetricsQuery) -> MetricsResult<String> {
        let lowered = query.to_event_query()?;
        Ok(self.print_query(&lowered))
    }
}

/// `agg(value)` or `agg(params)(value)`, aliased.
fn aggregate(ts: &Timeseries) -> MetricsResult<Expr> {
    let aggregate = ts
        .aggregate
        .as_deref()
        .ok_or_else(|| MetricsError::InvalidTimeseries("aggregate is required".to_string()))?;
    let value = vec![col("value")?];
    let expr = if ts.aggregate_params.is_empty() {
        Expr::Function(Function::new(aggregate, value)?.with_alias(AGGREGATE_ALIAS)?)
    } else {
        let params = ts.aggregate_params.iter().cloned().map(Expr::Scalar).collect();
        Expr::CurriedFunction(
            CurriedFunction::new(aggregate, params, value)?.with_alias(AGGREGATE_ALIAS)?,
        )
    };
    Ok(expr)
}

fn time_bucket(interval: u32) -> MetricsResult<Expr> {
    let step = func("toIntervalSecond", vec![Expr::lit(interval)])?;
    Ok(func_as(
        "toStartOfInterval",
        vec![col("timestamp")?, step, Expr::lit("Universal")],
        TIME_ALIAS,
    )?)
}

fn rollup_granularity(rollup: &Rollup) -> MetricsResult<Scalar> {
    rollup
        .granularity
        .map(Scalar::from)
        .ok_or_else(|| MetricsError::InvalidRollup("granularity must be set".to_string()))
}

/// Interval rollups come back in time order; totals follow the rollup's direction.
fn rollup_orderby(rollup: &Rollup) -> MetricsResult<Option<OrderBy>> {
    let orderby = match (rollup.interval, rollup.orderby) {
        (Some(_), _) => Some(OrderBy::new(col(TIME_ALIAS)?, Direction::Asc)?),
        (None, Some(direction)) => Some(OrderBy::new(col(AGGREGATE_ALIAS)?, direction)?),
        (None, None) => None,
    };
    Ok(orderby)
}

fn scope_conditions(scope: &MetricsScope) -> MetricsResult<Vec<ConditionGroup>> {
    let ids = |ids: &[i64]| Scalar::List(ids.iter().copied().map(Scalar::Int).collect());
    let mut conditions = vec![
        binary("org_id", Op::In, ids(&scope.org_ids))?,
        binary("project_id", Op::In, ids(&scope.project_ids))?,
    ];
    if let Some(use_case_id) = &scope.use_case_id {
        conditions.push(eq("use_case_id", use_case_id.as_str())?);
    }
    Ok(conditions)
}

fn eq(column: &str, value: impl Into<Scalar>) -> MetricsResult<ConditionGroup> {
    binary(column, Op::Eq, value)
}

fn binary(column: &str, op: Op, value: impl Into<Scalar>) -> MetricsResult<ConditionGroup> {
    let lhs = Column::new(column)?;
    Ok(Condition::binary(lhs, op, Expr::lit(value))?.into())
}
