//! Lowering: MQL syntax tree to metrics types.

use crate::ast::condition::{BooleanCondition, Condition, ConditionGroup, Op};
use crate::ast::error::StructuralResult;
use crate::ast::expr::{Column, Expr, Scalar};
use crate::metrics::{
    Formula, FormulaParameter, Metric, MetricsError, MetricsExpr, Timeseries,
};

use super::parser::{FilterNode, InnerFilter, MetricRef, Node, Number, Param, TagKey, TagValue};
use super::{MqlError, MAX_DEPTH};

type LowerResult<T> = Result<T, MqlError>;

fn structural<T>(result: StructuralResult<T>) -> LowerResult<T> {
    result.map_err(|e| MqlError::Invalid(e.into()))
}

fn variables_unsupported() -> MqlError {
    MqlError::Unsupported("variables are not supported yet".to_string())
}

/// Lower a whole expression. The root must be a timeseries or a formula.
pub(crate) fn lower(node: &Node) -> LowerResult<MetricsExpr> {
    let expr = match operand(node, 0)? {
        FormulaParameter::Timeseries(ts) => MetricsExpr::Timeseries(ts),
        FormulaParameter::Formula(f) => MetricsExpr::Formula(f),
        FormulaParameter::Int(_) | FormulaParameter::Float(_) | FormulaParameter::String(_) => {
            return Err(MqlError::Invalid(MetricsError::InvalidQuery(
                "mql must describe a timeseries or a formula, not a literal".to_string(),
            )))
        }
    };
    // Catches metrics that never received an aggregate.
    expr.check()?;
    Ok(expr)
}

/// Formulas nest one level per operator in a chain and per function call.
/// `depth` counts the levels above `node`; past `MAX_DEPTH` the tree would be
/// too deep to print or drop safely.
fn nested(depth: usize, levels: usize) -> LowerResult<usize> {
    let depth = depth + levels;
    if depth > MAX_DEPTH {
        return Err(MqlError::TooDeep { max: MAX_DEPTH });
    }
    Ok(depth)
}

fn operand(node: &Node, depth: usize) -> LowerResult<FormulaParameter> {
    match node {
        Node::Number(Number::Int(n)) => Ok(FormulaParameter::Int(*n)),
        Node::Number(Number::Float(f)) => Ok(FormulaParameter::Float(*f)),
        Node::String(s) => Ok(FormulaParameter::String(s.clone())),
        Node::Negate(inner) => match operand(inner, nested(depth, 1)?)? {
            FormulaParameter::Int(n) => Ok(FormulaParameter::Int(-n)),
            FormulaParameter::Float(f) => Ok(FormulaParameter::Float(-f)),
            FormulaParameter::String(s) => Err(MqlError::Invalid(MetricsError::InvalidFormula(
                format!("cannot negate the string {s:?}"),
            ))),
            other => Ok(Formula::named("negate", vec![other])?.into()),
        },
        Node::Chain { first, rest } => {
            let depth = nested(depth, rest.len())?;
            let mut lhs = operand(first, depth)?;
            for (op, rhs) in rest {
                lhs = Formula::arithmetic(*op, lhs, operand(rhs, depth)?)?.into();
            }
            Ok(lhs)
        }
        Node::Filter {
            target,
            filters,
            groupby,
        } => with_suffix(operand(target, depth)?, filters.as_ref(), groupby),
        Node::Aggregate {
            name,
            params,
            inner,
        } => {
            let ts = inner_filter(inner)?;
            let params = aggregate_params(params.as_deref().unwrap_or_default());
            Ok(ts.set_aggregate(name, params)?.into())
        }
        Node::Function { name, params, args } => {
            function(name, params.as_deref(), args, nested(depth, 1)?)
        }
        Node::Metric(metric) => Ok(Timeseries::bare(metric_ref(metric)).into()),
        Node::Variable(_) => Err(variables_unsupported()),
    }
}

fn function(
    name: &str,
    params: Option<&[Param]>,
    args: &[Node],
    depth: usize,
) -> LowerResult<FormulaParameter> {
    let args = args
        .iter()
        .map(|arg| operand(arg, depth))
        .collect::<LowerResult<Vec<_>>>()?;

    if let Some(params) = params {
        // `name(params)(metric)` over a bare metric is a curried aggregate.
        if let [FormulaParameter::Timeseries(ts)] = args.as_slice() {
            if ts.aggregate.is_none() {
                return Ok(ts.set_aggregate(name, aggregate_params(params))?.into());
            }
        }
        return Ok(Formula::named(name, args)?
            .with_aggregate_params(aggregate_params(params))?
            .into());
    }

    if matches!(args.first(), Some(FormulaParameter::Timeseries(ts)) if ts.aggregate.is_none()) {
        return Err(MqlError::Invalid(MetricsError::InvalidFormula(format!(
            "cannot apply {name} to a metric without an aggregate"
        ))));
    }
    Ok(Formula::named(name, args)?.into())
}

/// Outer filters go first, then whatever the target already carried.
fn with_suffix(
    target: FormulaParameter,
    filters: Option<&FilterNode>,
    groupby: &[String],
) -> LowerResult<FormulaParameter> {
    let mut expr = match target {
        FormulaParameter::Timeseries(ts) => MetricsExpr::Timeseries(ts),
        FormulaParameter::Formula(f) => MetricsExpr::Formula(f),
        FormulaParameter::Int(_) | FormulaParameter::Float(_) | FormulaParameter::String(_) => {
            return Err(MqlError::Invalid(MetricsError::InvalidFormula(
                "filters and groupby need a timeseries or formula".to_string(),
            )))
        }
    };
    if let Some(filter) = filters {
        let mut merged = vec![condition_group(filter)?];
        merged.extend(expr.filters().iter().cloned());
        expr = expr.set_filters(merged)?;
    }
    if !groupby.is_empty() {
        let mut merged = columns(groupby)?;
        merged.extend(expr.groupby().iter().cloned());
        expr = expr.set_groupby(merged)?;
    }
    Ok(match expr {
        MetricsExpr::Timeseries(ts) => ts.into(),
        MetricsExpr::Formula(f) => f.into(),
    })
}

fn inner_filter(inner: &InnerFilter) -> LowerResult<Timeseries> {
    let mut ts = Timeseries::bare(metric_ref(&inner.metric));
    if let Some(filter) = &inner.filters {
        ts = ts.set_filters(vec![condition_group(filter)?])?;
    }
    if !inner.groupby.is_empty() {
        ts = ts.set_groupby(columns(&inner.groupby)?)?;
    }
    Ok(ts)
}

fn metric_ref(metric: &MetricRef) -> Metric {
    match metric {
        MetricRef::Mri(mri) => Metric::from_mri(mri),
        MetricRef::PublicName(name) => Metric::from_public_name(name),
    }
}

fn aggregate_params(params: &[Param]) -> Vec<Scalar> {
    params
        .iter()
        .map(|p| match p {
            Param::Number(Number::Int(n)) => Scalar::Int(*n),
            Param::Number(Number::Float(f)) => Scalar::Float(*f),
            Param::String(s) => Scalar::String(s.clone()),
        })
        .collect()
}

fn columns(names: &[String]) -> LowerResult<Vec<Expr>> {
    names
        .iter()
        .map(|name| structural(Column::new(name)).map(Expr::Column))
        .collect()
}

fn condition_group(node: &FilterNode) -> LowerResult<ConditionGroup> {
    match node {
        FilterNode::Tag {
            negated,
            key,
            value,
        } => {
            let column = match key {
                TagKey::Name(name) => structural(Column::new(name))?,
                TagKey::Variable(_) => return Err(variables_unsupported()),
            };
            let (op, rhs) = match value {
                TagValue::Exact(v) => (Op::Eq, Scalar::String(v.clone())),
                TagValue::Wildcard(v) => (Op::Like, Scalar::String(v.clone())),
                TagValue::List(items) => (
                    Op::In,
                    Scalar::List(items.iter().cloned().map(Scalar::String).collect()),
                ),
                TagValue::Variable(_) => return Err(variables_unsupported()),
            };
            let op = if *negated { op.negated() } else { op };
            Ok(structural(Condition::binary(column, op, Expr::lit(rhs)))?.into())
        }
        FilterNode::And(nodes) => {
            let groups = nodes.iter().map(condition_group).collect::<LowerResult<Vec<_>>>()?;
            Ok(structural(BooleanCondition::and(groups))?.into())
        }
        FilterNode::Or(nodes) => {
            let groups = nodes.iter().map(condition_group).collect::<LowerResult<Vec<_>>>()?;
            Ok(structural(BooleanCondition::or(groups))?.into())
        }
    }
}
