//! Metrics printer.
//!
//! `agg(params)(metric){filters} by (groupby)` for timeseries and
//! `(lhs op rhs)` or `name(params)(args)` for formulas.

use crate::ast::condition::{BooleanCondition, BooleanOp, Condition, ConditionGroup, Op};
use crate::ast::expr::{Expr, Scalar};
use crate::metrics::{Formula, FormulaFunction, FormulaParameter, MetricsExpr, Timeseries};

use super::dialect::{Dialect, ListKind};
use super::snql::{list, scalar};
use super::token::{Token, TokenStream, COMMA_SPACE};

impl MetricsExpr {
    /// MQL text for this expression.
    pub fn to_mql(&self) -> String {
        match self {
            MetricsExpr::Timeseries(ts) => ts.to_mql(),
            MetricsExpr::Formula(f) => f.to_mql(),
        }
    }
}

impl Timeseries {
    pub fn to_mql(&self) -> String {
        timeseries(self).serialize(Dialect::Mql)
    }
}

impl Formula {
    pub fn to_mql(&self) -> String {
        formula(self).serialize(Dialect::Mql)
    }
}

fn timeseries(ts: &Timeseries) -> TokenStream {
    let metric = ts
        .metric
        .mql_name()
        .map(str::to_string)
        .or_else(|| ts.metric.id.map(|id| id.to_string()))
        .unwrap_or_default();

    let mut out = TokenStream::new();
    match &ts.aggregate {
        Some(aggregate) => {
            out.push(Token::Ident(aggregate.clone()));
            if !ts.aggregate_params.is_empty() {
                out.append(&params(&ts.aggregate_params));
            }
            out.lparen().push(Token::Ident(metric)).rparen();
        }
        None => {
            out.push(Token::Ident(metric));
        }
    }
    out.append(&suffix(&ts.filters, &ts.groupby));
    out
}

fn formula(f: &Formula) -> TokenStream {
    let args = f.parameters.iter().map(parameter);
    let mut out = TokenStream::new();
    match &f.function {
        FormulaFunction::Arithmetic(op) => {
            let sep = [Token::Space, Token::Arith(op.symbol()), Token::Space];
            out.lparen().join(args, &sep).rparen();
        }
        FormulaFunction::Named(name) => {
            out.push(Token::Ident(name.clone()));
            if !f.aggregate_params.is_empty() {
                out.append(&params(&f.aggregate_params));
            }
            out.lparen().join(args, COMMA_SPACE).rparen();
        }
    }
    out.append(&suffix(&f.filters, &f.groupby));
    out
}

fn parameter(p: &FormulaParameter) -> TokenStream {
    match p {
        FormulaParameter::Timeseries(ts) => timeseries(ts),
        FormulaParameter::Formula(f) => formula(f),
        FormulaParameter::Int(n) => scalar(&Scalar::Int(*n)),
        FormulaParameter::Float(v) => scalar(&Scalar::Float(*v)),
        FormulaParameter::String(v) => scalar(&Scalar::String(v.clone())),
    }
}

fn params(values: &[Scalar]) -> TokenStream {
    let mut out = TokenStream::new();
    out.lparen().join(values.iter().map(scalar), COMMA_SPACE).rparen();
    out
}

/// `{filters} by (groupby)`, either part omitted when empty.
fn suffix(filters: &[ConditionGroup], groupby: &[Expr]) -> TokenStream {
    let mut out = TokenStream::new();
    if !filters.is_empty() {
        let sep = [Token::Space, Token::And, Token::Space];
        out.push(Token::LBrace)
            .join(filters.iter().map(filter), &sep)
            .push(Token::RBrace);
    }
    if !groupby.is_empty() {
        out.space().push(Token::By).space().lparen();
        out.join(groupby.iter().map(group), COMMA_SPACE).rparen();
    }
    out
}

fn group(e: &Expr) -> TokenStream {
    let mut out = TokenStream::new();
    match e {
        Expr::Column(c) => {
            out.push(Token::Ident(c.name.clone()));
        }
        Expr::Aliased(a) => {
            out.push(Token::Ident(a.expr.name.clone()));
            if let Some(alias) = &a.alias {
                out.space().push(Token::As).space().push(Token::Alias(alias.clone()));
            }
        }
        // Rejected by the timeseries checks.
        _ => {}
    }
    out
}

fn filter(group: &ConditionGroup) -> TokenStream {
    match group {
        ConditionGroup::Condition(c) => tag_condition(c),
        ConditionGroup::Boolean(b) => boolean(b),
    }
}

fn boolean(b: &BooleanCondition) -> TokenStream {
    let connective = match b.op {
        BooleanOp::And => Token::And,
        BooleanOp::Or => Token::Or,
    };
    let sep = [Token::Space, connective, Token::Space];
    let mut out = TokenStream::new();
    out.lparen().join(b.conditions.iter().map(filter), &sep).rparen();
    out
}

/// `tag:"v"`, `!tag:["a", "b"]`, `tag:"v*"`.
fn tag_condition(c: &Condition) -> TokenStream {
    let mut out = TokenStream::new();
    if matches!(c.op, Op::Neq | Op::NotIn | Op::NotLike) {
        out.push(Token::Bang);
    }
    if let Some(column) = c.lhs_column() {
        out.push(Token::Ident(column.name.clone()));
    }
    out.push(Token::Colon);
    match &c.rhs {
        Some(Expr::Scalar(Scalar::List(items) | Scalar::Tuple(items))) => {
            out.append(&list(items, ListKind::InRhs));
        }
        Some(Expr::Scalar(value)) => {
            out.append(&scalar(value));
        }
        // Rejected by the timeseries checks.
        _ => {}
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::expr::{col, Column};
    use crate::metrics::{ArithmeticOperator, Metric};

    fn tag(name: &str, op: Op, value: impl Into<Scalar>) -> ConditionGroup {
        Condition::binary(Column::new(name).unwrap(), op, Expr::lit(value))
            .unwrap()
            .into()
    }

    fn duration() -> Timeseries {
        Timeseries::new(Metric::from_public_name("transaction.duration"), "sum").unwrap()
    }

    #[test]
    fn test_timeseries_prefers_mri() {
        let ts = duration()
            .set_metric(
                Metric::from_public_name("transaction.duration")
                    .with_mri("d:transactions/duration@millisecond"),
            )
            .unwrap();
        insta::assert_snapshot!(ts.to_mql(), @"sum(d:transactions/duration@millisecond)");
    }

    #[test]
    fn test_timeseries_with_params_filters_and_groupby() {
        let ts = duration()
            .set_aggregate("quantiles", vec![Scalar::Float(0.5), Scalar::Float(0.99)])
            .unwrap()
            .set_filters(vec![
                tag("environment", Op::Eq, "prod"),
                tag("release", Op::NotIn, Scalar::List(vec!["a".into(), "b".into()])),
                tag("transaction", Op::Like, "/api/*"),
            ])
            .unwrap()
            .set_groupby(vec![col("transaction").unwrap(), col("status_code").unwrap()])
            .unwrap();
        insta::assert_snapshot!(
            ts.to_mql(),
            @r#"quantiles(0.5, 0.99)(transaction.duration){environment:"prod" AND !release:["a", "b"] AND transaction:"/api/*"} by (transaction, status_code)"#
        );
    }

    #[test]
    fn test_boolean_filters_are_parenthesized() {
        let or = BooleanCondition::or(vec![
            tag("environment", Op::Eq, "prod"),
            tag("environment", Op::Neq, "dev"),
        ])
        .unwrap();
        let ts = duration().set_filters(vec![or.into()]).unwrap();
        insta::assert_snapshot!(
            ts.to_mql(),
            @r#"sum(transaction.duration){(environment:"prod" OR !environment:"dev")}"#
        );
    }

    #[test]
    fn test_arithmetic_formula() {
        let f = Formula::arithmetic(ArithmeticOperator::Divide, duration(), 1000i64)
            .unwrap()
            .set_groupby(vec![col("project_id").unwrap()])
            .unwrap();
        insta::assert_snapshot!(f.to_mql(), @"(sum(transaction.duration) / 1000) by (project_id)");
    }

    #[test]
    fn test_named_formula() {
        let f = Formula::named("apdex", vec![duration().into(), FormulaParameter::Int(300)]).unwrap();
        insta::assert_snapshot!(f.to_mql(), @"apdex(sum(transaction.duration), 300)");

        let top = Formula::named("topK", vec![duration().into()])
            .unwrap()
            .with_aggregate_params(vec![Scalar::Int(10)])
            .unwrap();
        insta::assert_snapshot!(top.to_mql(), @"topK(10)(sum(transaction.duration))");
    }

    #[test]
    fn test_float_parameter_keeps_decimal_point() {
        let f = Formula::arithmetic(ArithmeticOperator::Multiply, duration(), 2.0).unwrap();
        insta::assert_snapshot!(f.to_mql(), @"(sum(transaction.duration) * 2.0)");
    }
}
