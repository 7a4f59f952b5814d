//! Condition rewrites that keep query semantics.
//!
//! `OrOptimizer` folds `a = 1 OR a = 2 OR a = 3` into `a IN (1, 2, 3)`.

use crate::ast::condition::{BooleanCondition, BooleanOp, Condition, ConditionGroup, Op};
use crate::ast::expr::{Expr, Scalar};
use crate::ast::query::Query;
use crate::metrics::{MetricsExpr, MetricsResult};

/// Rewrites `OR` groups of equality checks on one column into a single `IN`.
#[derive(Debug, Clone, Copy, Default)]
pub struct OrOptimizer;

impl OrOptimizer {
    pub fn new() -> Self {
        Self
    }

    /// The rewritten group, or `None` when nothing changed.
    ///
    /// `AND` groups are searched for rewritable members. An `OR` is rewritten
    /// only when every member is an `=` on the same lhs with a scalar rhs;
    /// nested groups inside an `OR` leave it untouched.
    pub fn optimize(&self, group: &ConditionGroup) -> Option<ConditionGroup> {
        let ConditionGroup::Boolean(boolean) = group else {
            return None;
        };
        match boolean.op {
            BooleanOp::Or => self.fold_or(boolean),
            BooleanOp::And => {
                let conditions = self.optimize_all(&boolean.conditions)?;
                BooleanCondition::and(conditions).ok().map(Into::into)
            }
        }
    }

    /// Optimize every group of a list, or `None` when none changed.
    pub fn optimize_all(&self, groups: &[ConditionGroup]) -> Option<Vec<ConditionGroup>> {
        let mut changed = false;
        let optimized = groups
            .iter()
            .map(|group| match self.optimize(group) {
                Some(rewritten) => {
                    changed = true;
                    rewritten
                }
                None => group.clone(),
            })
            .collect();
        changed.then_some(optimized)
    }

    fn fold_or(&self, boolean: &BooleanCondition) -> Option<ConditionGroup> {
        let mut shared_lhs: Option<&Expr> = None;
        let mut values = Vec::with_capacity(boolean.conditions.len());

        for member in &boolean.conditions {
            let ConditionGroup::Condition(condition) = member else {
                return None;
            };
            if condition.op != Op::Eq {
                return None;
            }
            match shared_lhs {
                Some(lhs) if *lhs != condition.lhs => return None,
                Some(_) => {}
                None => shared_lhs = Some(&condition.lhs),
            }
            match &condition.rhs {
                Some(Expr::Scalar(value)) if !value.is_iterable() => values.push(value.clone()),
                _ => return None,
            }
        }

        let lhs = shared_lhs?.clone();
        tracing::debug!(values = values.len(), "folding OR of equalities into IN");
        Condition::binary(lhs, Op::In, Expr::Scalar(Scalar::Tuple(values)))
            .ok()
            .map(Into::into)
    }
}

impl Query {
    /// A copy of the query with its `where` clause run through `OrOptimizer`.
    pub fn optimize_where(&self) -> Query {
        match OrOptimizer::new().optimize_all(self.where_()) {
            Some(conditions) => self.set_where(conditions),
            None => self.clone(),
        }
    }
}

impl MetricsExpr {
    /// The same expression with its top-level filters run through `OrOptimizer`.
    pub fn optimize_filters(&self) -> MetricsResult<MetricsExpr> {
        match OrOptimizer::new().optimize_all(self.filters()) {
            Some(filters) => self.set_filters(filters),
            None => Ok(self.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::entity::Entity;
    use crate::ast::expr::{col, Column};
    use crate::metrics::{Metric, Timeseries};

    fn eq(name: &str, value: impl Into<Scalar>) -> ConditionGroup {
        Condition::binary(Column::new(name).unwrap(), Op::Eq, Expr::lit(value))
            .unwrap()
            .into()
    }

    fn or(groups: Vec<ConditionGroup>) -> ConditionGroup {
        BooleanCondition::or(groups).unwrap().into()
    }

    #[test]
    fn test_or_of_equalities_becomes_in() {
        let group = or(vec![eq("transaction", "a"), eq("transaction", "b"), eq("transaction", "c")]);
        let expected: ConditionGroup = Condition::binary(
            Column::new("transaction").unwrap(),
            Op::In,
            Expr::Scalar(Scalar::Tuple(vec!["a".into(), "b".into(), "c".into()])),
        )
        .unwrap()
        .into();
        assert_eq!(OrOptimizer::new().optimize(&group), Some(expected));
    }

    #[test]
    fn test_nested_or_is_left_alone() {
        let group = or(vec![
            eq("transaction", "a"),
            or(vec![eq("transaction", "b"), eq("transaction", "c")]),
        ]);
        assert_eq!(OrOptimizer::new().optimize(&group), None);
    }

    #[test]
    fn test_mixed_columns_or_operators_are_left_alone() {
        let optimizer = OrOptimizer::new();
        assert_eq!(optimizer.optimize(&or(vec![eq("a", 1), eq("b", 2)])), None);

        let neq: ConditionGroup = Condition::binary(Column::new("a").unwrap(), Op::Neq, Expr::lit(2))
            .unwrap()
            .into();
        assert_eq!(optimizer.optimize(&or(vec![eq("a", 1), neq])), None);
        assert_eq!(optimizer.optimize(&eq("a", 1)), None);
    }

    #[test]
    fn test_and_members_are_rewritten() {
        let group: ConditionGroup = BooleanCondition::and(vec![
            eq("project_id", 1),
            or(vec![eq("environment", "prod"), eq("environment", "dev")]),
        ])
        .unwrap()
        .into();
        let Some(ConditionGroup::Boolean(and)) = OrOptimizer::new().optimize(&group) else {
            panic!("expected a rewritten AND group");
        };
        assert_eq!(and.conditions[0], eq("project_id", 1));
        assert!(matches!(
            &and.conditions[1],
            ConditionGroup::Condition(c) if c.op == Op::In
        ));
    }

    #[test]
    fn test_optimize_where_renders_in() {
        let query = Query::new(Entity::new("events").unwrap())
            .set_select(vec![col("event_id").unwrap()])
            .unwrap()
            .set_where(vec![or(vec![
                eq("transaction", "a"),
                eq("transaction", "b"),
                eq("transaction", "c"),
            ])])
            .set_limit(10)
            .unwrap();
        insta::assert_snapshot!(
            query.optimize_where().serialize(),
            @"MATCH (events) SELECT event_id WHERE transaction IN ('a', 'b', 'c') LIMIT 10"
        );

        let untouched = query.set_where(vec![eq("transaction", "a")]);
        assert_eq!(untouched.optimize_where(), untouched);
    }

    #[test]
    fn test_optimize_metrics_filters() {
        let ts = Timeseries::new(Metric::from_public_name("transaction.duration"), "sum")
            .unwrap()
            .set_filters(vec![or(vec![eq("environment", "prod"), eq("environment", "dev")])])
            .unwrap();
        let optimized = MetricsExpr::from(ts).optimize_filters().unwrap();
        insta::assert_snapshot!(
            optimized.to_mql(),
            @r#"sum(transaction.duration){environment:["prod", "dev"]}"#
        );
    }
}
