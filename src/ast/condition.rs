//! Conditions used by `where`, `having` and metrics filters.

use std::fmt;

use super::error::{StructuralError, StructuralResult};
use super::expr::{Column, Expr, Scalar};

// =============================================================================
// Operators
// =============================================================================

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Gt,
    Lt,
    Gte,
    Lte,
    Eq,
    Neq,
    In,
    NotIn,
    Like,
    NotLike,
    IsNull,
    IsNotNull,
}

impl Op {
    pub const ALL: [Op; 12] = [
        Op::Gt,
        Op::Lt,
        Op::Gte,
        Op::Lte,
        Op::Eq,
        Op::Neq,
        Op::In,
        Op::NotIn,
        Op::Like,
        Op::NotLike,
        Op::IsNull,
        Op::IsNotNull,
    ];

    /// The token this operator renders as.
    pub fn as_str(&self) -> &'static str {
        match self {
            Op::Gt => ">",
            Op::Lt => "<",
            Op::Gte => ">=",
            Op::Lte => "<=",
            Op::Eq => "=",
            Op::Neq => "!=",
            Op::In => "IN",
            Op::NotIn => "NOT IN",
            Op::Like => "LIKE",
            Op::NotLike => "NOT LIKE",
            Op::IsNull => "IS NULL",
            Op::IsNotNull => "IS NOT NULL",
        }
    }

    /// The engine function implementing this operator.
    pub fn function_name(&self) -> &'static str {
        match self {
            Op::Gt => "greater",
            Op::Lt => "less",
            Op::Gte => "greaterOrEquals",
            Op::Lte => "lessOrEquals",
            Op::Eq => "equals",
            Op::Neq => "notEquals",
            Op::In => "in",
            Op::NotIn => "notIn",
            Op::Like => "like",
            Op::NotLike => "notLike",
            Op::IsNull => "isNull",
            Op::IsNotNull => "isNotNull",
        }
    }

    pub fn from_function_name(name: &str) -> Option<Op> {
        Op::ALL.into_iter().find(|op| op.function_name() == name)
    }

    /// Operators that take no right-hand side.
    pub fn is_unary(&self) -> bool {
        matches!(self, Op::IsNull | Op::IsNotNull)
    }

    /// Operators whose right-hand side must be a list, tuple or expression.
    pub fn requires_iterable(&self) -> bool {
        matches!(self, Op::In | Op::NotIn)
    }

    pub fn is_pattern(&self) -> bool {
        matches!(self, Op::Like | Op::NotLike)
    }

    /// The operator with the opposite meaning, used by the MQL `!` prefix.
    pub fn negated(&self) -> Op {
        match self {
            Op::Gt => Op::Lte,
            Op::Lt => Op::Gte,
            Op::Gte => Op::Lt,
            Op::Lte => Op::Gt,
            Op::Eq => Op::Neq,
            Op::Neq => Op::Eq,
            Op::In => Op::NotIn,
            Op::NotIn => Op::In,
            Op::Like => Op::NotLike,
            Op::NotLike => Op::Like,
            Op::IsNull => Op::IsNotNull,
            Op::IsNotNull => Op::IsNull,
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Boolean connectives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BooleanOp {
    And,
    Or,
}

impl BooleanOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            BooleanOp::And => "AND",
            BooleanOp::Or => "OR",
        }
    }
}

// =============================================================================
// Conditions
// =============================================================================

/// `lhs op rhs`, or `lhs op` for the null checks.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Condition {
    pub lhs: Expr,
    pub op: Op,
    pub rhs: Option<Expr>,
}

impl Condition {
    pub fn new(lhs: impl Into<Expr>, op: Op, rhs: Option<Expr>) -> StructuralResult<Self> {
        let condition = Self {
            lhs: lhs.into(),
            op,
            rhs,
        };
        condition.check()?;
        Ok(condition)
    }

    /// Shorthand for a binary condition.
    pub fn binary(lhs: impl Into<Expr>, op: Op, rhs: impl Into<Expr>) -> StructuralResult<Self> {
        Self::new(lhs, op, Some(rhs.into()))
    }

    /// Shorthand for `IS NULL` / `IS NOT NULL`.
    pub fn unary(lhs: impl Into<Expr>, op: Op) -> StructuralResult<Self> {
        Self::new(lhs, op, None)
    }

    /// The operand and arity rules for this single node.
    pub fn check(&self) -> StructuralResult<()> {
        if !matches!(
            self.lhs,
            Expr::Column(_) | Expr::Function(_) | Expr::CurriedFunction(_)
        ) {
            return Err(StructuralError::condition(
                self.op.function_name(),
                "lhs must be a Column, Function or CurriedFunction",
            ));
        }

        match (&self.rhs, self.op.is_unary()) {
            (Some(_), true) => {
                return Err(StructuralError::condition(
                    self.op.function_name(),
                    format!("{} must not have a rhs", self.op),
                ))
            }
            (None, false) => {
                return Err(StructuralError::condition(
                    self.op.function_name(),
                    format!("{} requires a rhs", self.op),
                ))
            }
            _ => {}
        }

        let Some(rhs) = &self.rhs else {
            return Ok(());
        };

        match rhs {
            Expr::Column(_) | Expr::Function(_) | Expr::CurriedFunction(_) => Ok(()),
            Expr::Scalar(s) if self.op.requires_iterable() && !s.is_iterable() => {
                Err(StructuralError::condition(
                    self.op.function_name(),
                    format!("{} requires a list or tuple rhs", self.op),
                ))
            }
            Expr::Scalar(s) if self.op.is_pattern() && !matches!(s, Scalar::String(_)) => {
                Err(StructuralError::condition(
                    self.op.function_name(),
                    format!("{} requires a string rhs", self.op),
                ))
            }
            Expr::Scalar(s) => s.check(),
            Expr::Aliased(_) | Expr::Identifier(_) | Expr::Lambda(_) => {
                Err(StructuralError::condition(
                    self.op.function_name(),
                    "rhs must be a Column, Function, CurriedFunction or scalar",
                ))
            }
        }
    }

    /// The column on the left-hand side, when it is a plain column.
    pub fn lhs_column(&self) -> Option<&Column> {
        match &self.lhs {
            Expr::Column(c) => Some(c),
            _ => None,
        }
    }
}

/// `(a AND b)` / `(a OR b)` over two or more conditions.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BooleanCondition {
    pub op: BooleanOp,
    pub conditions: Vec<ConditionGroup>,
}

impl BooleanCondition {
    pub fn new(op: BooleanOp, conditions: Vec<ConditionGroup>) -> StructuralResult<Self> {
        if conditions.len() < 2 {
            return Err(StructuralError::condition(
                op.as_str(),
                "must have at least two conditions",
            ));
        }
        Ok(Self { op, conditions })
    }

    pub fn and(conditions: Vec<ConditionGroup>) -> StructuralResult<Self> {
        Self::new(BooleanOp::And, conditions)
    }

    pub fn or(conditions: Vec<ConditionGroup>) -> StructuralResult<Self> {
        Self::new(BooleanOp::Or, conditions)
    }
}

/// One entry of a `where`/`having` list or a metrics filter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ConditionGroup {
    Condition(Condition),
    Boolean(BooleanCondition),
}

impl ConditionGroup {
    /// Every column referenced by this group, nested ones included.
    pub fn columns(&self) -> Vec<&Column> {
        match self {
            ConditionGroup::Condition(c) => {
                let mut found = c.lhs.columns();
                if let Some(rhs) = &c.rhs {
                    found.extend(rhs.columns());
                }
                found
            }
            ConditionGroup::Boolean(b) => b.conditions.iter().flat_map(|c| c.columns()).collect(),
        }
    }
}

impl From<Condition> for ConditionGroup {
    fn from(c: Condition) -> Self {
        ConditionGroup::Condition(c)
    }
}

impl From<BooleanCondition> for ConditionGroup {
    fn from(b: BooleanCondition) -> Self {
        ConditionGroup::Boolean(b)
    }
}

/// Flatten the conditions that are guaranteed to hold: top-level entries and
/// the members of nested `AND` groups. Anything under an `OR` is skipped.
pub fn get_first_level_and_conditions(conditions: &[ConditionGroup]) -> Vec<&Condition> {
    let mut flattened = Vec::new();
    for group in conditions {
        match group {
            ConditionGroup::Condition(c) => flattened.push(c),
            ConditionGroup::Boolean(b) if b.op == BooleanOp::And => {
                flattened.extend(get_first_level_and_conditions(&b.conditions));
            }
            ConditionGroup::Boolean(_) => {}
        }
    }
    flattened
}
