//! Metrics and timeseries: the leaves of a metrics query.

use crate::ast::condition::{ConditionGroup, Op};
use crate::ast::expr::{is_valid_function_name, Expr, Scalar};

use super::{MetricsError, MetricsResult};

// =============================================================================
// Metric
// =============================================================================

/// A raw metric, addressed by public name, MRI or indexed id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Metric {
    pub public_name: Option<String>,
    pub mri: Option<String>,
    pub id: Option<i64>,
    pub entity: Option<String>,
}

impl Metric {
    pub fn from_public_name(public_name: &str) -> Self {
        Self {
            public_name: Some(public_name.to_string()),
            ..Self::default()
        }
    }

    pub fn from_mri(mri: &str) -> Self {
        Self {
            mri: Some(mri.to_string()),
            ..Self::default()
        }
    }

    pub fn from_id(id: i64) -> Self {
        Self {
            id: Some(id),
            ..Self::default()
        }
    }

    pub fn with_mri(self, mri: &str) -> Self {
        Self {
            mri: Some(mri.to_string()),
            ..self
        }
    }

    pub fn with_public_name(self, public_name: &str) -> Self {
        Self {
            public_name: Some(public_name.to_string()),
            ..self
        }
    }

    pub fn with_entity(self, entity: &str) -> Self {
        Self {
            entity: Some(entity.to_string()),
            ..self
        }
    }

    pub fn check(&self) -> MetricsResult<()> {
        if self.public_name.is_none() && self.mri.is_none() && self.id.is_none() {
            return Err(MetricsError::InvalidMetric(
                "metric must have at least one of public_name, mri or id".to_string(),
            ));
        }
        if matches!(self.public_name.as_deref(), Some("")) || matches!(self.mri.as_deref(), Some("")) {
            return Err(MetricsError::InvalidMetric(
                "metric names cannot be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// The name used in MQL text: the MRI when known, else the public name.
    pub fn mql_name(&self) -> Option<&str> {
        self.mri.as_deref().or(self.public_name.as_deref())
    }
}

// =============================================================================
// Timeseries
// =============================================================================

/// One metric aggregated by a function, optionally filtered and grouped by tags.
///
/// `aggregate` is `None` only for a bare metric that has not been wrapped in
/// an aggregate yet; such a timeseries never passes `check`.
#[derive(Debug, Clone, PartialEq)]
pub struct Timeseries {
    pub metric: Metric,
    pub aggregate: Option<String>,
    pub aggregate_params: Vec<Scalar>,
    pub filters: Vec<ConditionGroup>,
    pub groupby: Vec<Expr>,
}

impl Timeseries {
    pub fn new(metric: Metric, aggregate: &str) -> MetricsResult<Self> {
        metric.check()?;
        check_aggregate(aggregate)?;
        Ok(Self::bare(metric).with_aggregate(aggregate))
    }

    /// A timeseries without an aggregate.
    pub(crate) fn bare(metric: Metric) -> Self {
        Self {
            metric,
            aggregate: None,
            aggregate_params: Vec::new(),
            filters: Vec::new(),
            groupby: Vec::new(),
        }
    }

    fn with_aggregate(self, aggregate: &str) -> Self {
        Self {
            aggregate: Some(aggregate.to_string()),
            ..self
        }
    }

    pub fn set_metric(&self, metric: Metric) -> MetricsResult<Timeseries> {
        metric.check()?;
        Ok(Self {
            metric,
            ..self.clone()
        })
    }

    pub fn set_aggregate(&self, aggregate: &str, params: Vec<Scalar>) -> MetricsResult<Timeseries> {
        check_aggregate(aggregate)?;
        check_aggregate_params(&params)?;
        Ok(Self {
            aggregate: Some(aggregate.to_string()),
            aggregate_params: params,
            ..self.clone()
        })
    }

    pub fn set_filters(&self, filters: Vec<ConditionGroup>) -> MetricsResult<Timeseries> {
        check_filters(&filters)?;
        Ok(Self {
            filters,
            ..self.clone()
        })
    }

    pub fn set_groupby(&self, groupby: Vec<Expr>) -> MetricsResult<Timeseries> {
        check_groupby(&groupby)?;
        Ok(Self {
            groupby,
            ..self.clone()
        })
    }

    pub fn check(&self) -> MetricsResult<()> {
        self.metric.check()?;
        match &self.aggregate {
            Some(aggregate) => check_aggregate(aggregate)?,
            None => {
                return Err(MetricsError::InvalidTimeseries(format!(
                    "metric '{}' has no aggregate",
                    self.metric.mql_name().unwrap_or_default()
                )))
            }
        }
        check_aggregate_params(&self.aggregate_params)?;
        check_filters(&self.filters)?;
        check_groupby(&self.groupby)
    }
}

fn check_aggregate(aggregate: &str) -> MetricsResult<()> {
    if aggregate.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') && !aggregate.is_empty() {
        Ok(())
    } else {
        Err(MetricsError::InvalidTimeseries(format!(
            "aggregate '{aggregate}' is not a valid function name"
        )))
    }
}

pub(crate) fn check_aggregate_params(params: &[Scalar]) -> MetricsResult<()> {
    for param in params {
        match param {
            Scalar::Int(_) | Scalar::String(_) => {}
            Scalar::Float(f) if f.is_finite() => {}
            other => {
                return Err(MetricsError::InvalidTimeseries(format!(
                    "aggregate parameter {other:?} must be a number or a string"
                )))
            }
        }
    }
    Ok(())
}

/// Filters must be tag conditions: a column compared with a literal.
pub(crate) fn check_filters(filters: &[ConditionGroup]) -> MetricsResult<()> {
    for group in filters {
        match group {
            ConditionGroup::Condition(c) => {
                c.check()?;
                if c.lhs_column().is_none() {
                    return Err(MetricsError::InvalidTimeseries(
                        "filters must compare a tag column".to_string(),
                    ));
                }
                if c.op.is_unary() || !matches!(c.rhs, Some(Expr::Scalar(_))) {
                    return Err(MetricsError::InvalidTimeseries(format!(
                        "filter on '{}' must compare against a literal",
                        c.lhs_column().map(|col| col.name.as_str()).unwrap_or_default()
                    )));
                }
                if !matches!(
                    c.op,
                    Op::Eq | Op::Neq | Op::In | Op::NotIn | Op::Like | Op::NotLike
                ) {
                    return Err(MetricsError::InvalidTimeseries(format!(
                        "operator {} cannot be used in a metrics filter",
                        c.op
                    )));
                }
                if let Some(Expr::Scalar(value)) = &c.rhs {
                    check_tag_value(c.op, value).map_err(|reason| {
                        MetricsError::InvalidTimeseries(format!(
                            "filter on '{}' {reason}",
                            c.lhs_column().map(|col| col.name.as_str()).unwrap_or_default()
                        ))
                    })?;
                }
            }
            ConditionGroup::Boolean(b) => {
                if b.conditions.len() < 2 {
                    return Err(MetricsError::InvalidTimeseries(format!(
                        "{} filter must have at least two conditions",
                        b.op.as_str()
                    )));
                }
                check_filters(&b.conditions)?
            }
        }
    }
    Ok(())
}

/// Tag values are strings. A LIKE pattern is a prefix ending in a `*`
/// wildcard, and only LIKE values may end in one.
fn check_tag_value(op: Op, value: &Scalar) -> Result<(), &'static str> {
    match (op, value) {
        (Op::Eq | Op::Neq, Scalar::String(s)) if ends_in_wildcard(s) => {
            Err("has a trailing '*', use LIKE for a prefix match")
        }
        (Op::Eq | Op::Neq, Scalar::String(_)) => Ok(()),
        (Op::Like | Op::NotLike, Scalar::String(s)) if ends_in_wildcard(s) => Ok(()),
        (Op::Like | Op::NotLike, Scalar::String(_)) => Err("must end in a '*' wildcard"),
        (Op::In | Op::NotIn, Scalar::List(items) | Scalar::Tuple(items)) => {
            if items.iter().all(|item| matches!(item, Scalar::String(_))) {
                Ok(())
            } else {
                Err("must compare against a list of strings")
            }
        }
        (Op::In | Op::NotIn, _) => Err("must compare against a list of strings"),
        _ => Err("must compare against a string"),
    }
}

/// A `*` after a backslash is a literal star, not a wildcard.
fn ends_in_wildcard(s: &str) -> bool {
    s.ends_with('*') && !s.ends_with("\\*")
}

pub(crate) fn check_groupby(groupby: &[Expr]) -> MetricsResult<()> {
    for expr in groupby {
        if !matches!(expr, Expr::Column(_) | Expr::Aliased(_)) {
            return Err(MetricsError::InvalidTimeseries(
                "groupby must be a list of columns".to_string(),
            ));
        }
    }
    Ok(())
}

pub(crate) fn check_function_name(name: &str) -> MetricsResult<()> {
    if is_valid_function_name(name) {
        Ok(())
    } else {
        Err(MetricsError::InvalidFormula(format!(
            "'{name}' is not a valid function name"
        )))
    }
}
