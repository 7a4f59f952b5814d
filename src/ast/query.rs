//! Query container - an immutable value built with `set_*` calls.
//!
//! Each setter returns a new `Query`. Child lists are held in `Arc<[_]>`, so
//! the new value shares every clause it did not replace with the original.

use std::sync::Arc;

use super::condition::ConditionGroup;
use super::entity::Match;
use super::error::{StructuralError, StructuralResult};
use super::expr::{Column, Expr};

// =============================================================================
// Clause values
// =============================================================================

pub const MAX_LIMIT: u32 = 10_000;

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

/// An ORDER BY entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OrderBy {
    pub expr: Expr,
    pub direction: Direction,
}

impl OrderBy {
    pub fn new(expr: Expr, direction: Direction) -> StructuralResult<Self> {
        if matches!(expr, Expr::Aliased(_) | Expr::Lambda(_)) {
            return Err(StructuralError::argument(
                "orderby",
                "expression must be a Column, Function, CurriedFunction or scalar",
            ));
        }
        Ok(Self { expr, direction })
    }

    pub fn asc(expr: Expr) -> StructuralResult<Self> {
        Self::new(expr, Direction::Asc)
    }

    pub fn desc(expr: Expr) -> StructuralResult<Self> {
        Self::new(expr, Direction::Desc)
    }
}

/// `LIMIT n BY c1,c2`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LimitBy {
    pub columns: Vec<Column>,
    pub count: u32,
}

impl LimitBy {
    pub fn new(columns: Vec<Column>, count: u32) -> StructuralResult<Self> {
        let limitby = Self { columns, count };
        limitby.check()?;
        Ok(limitby)
    }

    pub fn check(&self) -> StructuralResult<()> {
        if self.columns.is_empty() {
            return Err(StructuralError::argument(
                "limitby",
                "columns must be a non-empty list",
            ));
        }
        if self.count == 0 || self.count > MAX_LIMIT {
            return Err(StructuralError::argument(
                "limitby",
                format!("count '{}' must be between 1 and {MAX_LIMIT}", self.count),
            ));
        }
        Ok(())
    }
}

/// Row limit, between 1 and 10,000.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Limit(u32);

impl Limit {
    pub fn new(limit: u32) -> StructuralResult<Self> {
        if limit == 0 || limit > MAX_LIMIT {
            return Err(StructuralError::argument(
                "limit",
                format!("'{limit}' must be between 1 and {MAX_LIMIT}"),
            ));
        }
        Ok(Self(limit))
    }

    pub fn get(&self) -> u32 {
        self.0
    }
}

/// Row offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Offset(u64);

impl Offset {
    pub fn new(offset: u64) -> Self {
        Self(offset)
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

/// Time bucket size in seconds, at least 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Granularity(u32);

impl Granularity {
    pub fn new(granularity: u32) -> StructuralResult<Self> {
        if granularity == 0 {
            return Err(StructuralError::argument(
                "granularity",
                "must be at least 1",
            ));
        }
        Ok(Self(granularity))
    }

    pub fn get(&self) -> u32 {
        self.0
    }
}

// =============================================================================
// Query
// =============================================================================

fn empty<T>() -> Arc<[T]> {
    Arc::from(Vec::new())
}

/// An event-dialect query.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Query {
    match_: Match,
    select: Arc<[Expr]>,
    groupby: Arc<[Expr]>,
    array_join: Arc<[Column]>,
    where_: Arc<[ConditionGroup]>,
    having: Arc<[ConditionGroup]>,
    orderby: Arc<[OrderBy]>,
    limitby: Option<LimitBy>,
    limit: Option<Limit>,
    offset: Option<Offset>,
    granularity: Option<Granularity>,
    totals: Option<bool>,
}

impl Query {
    pub fn new(match_: impl Into<Match>) -> Self {
        Self {
            match_: match_.into(),
            select: empty(),
            groupby: empty(),
            array_join: empty(),
            where_: empty(),
            having: empty(),
            orderby: empty(),
            limitby: None,
            limit: None,
            offset: None,
            granularity: None,
            totals: None,
        }
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    pub fn match_(&self) -> &Match {
        &self.match_
    }

    pub fn select(&self) -> &[Expr] {
        &self.select
    }

    pub fn groupby(&self) -> &[Expr] {
        &self.groupby
    }

    pub fn array_join(&self) -> &[Column] {
        &self.array_join
    }

    pub fn where_(&self) -> &[ConditionGroup] {
        &self.where_
    }

    pub fn having(&self) -> &[ConditionGroup] {
        &self.having
    }

    pub fn orderby(&self) -> &[OrderBy] {
        &self.orderby
    }

    pub fn limitby(&self) -> Option<&LimitBy> {
        self.limitby.as_ref()
    }

    pub fn limit(&self) -> Option<Limit> {
        self.limit
    }

    pub fn offset(&self) -> Option<Offset> {
        self.offset
    }

    pub fn granularity(&self) -> Option<Granularity> {
        self.granularity
    }

    pub fn totals(&self) -> Option<bool> {
        self.totals
    }

    /// True when two queries hold the very same `select` allocation.
    pub fn shares_select_with(&self, other: &Query) -> bool {
        Arc::ptr_eq(&self.select, &other.select)
    }

    // -------------------------------------------------------------------------
    // Setters - each returns a new Query
    // -------------------------------------------------------------------------

    pub fn set_match(&self, match_: impl Into<Match>) -> Query {
        Query {
            match_: match_.into(),
            ..self.clone()
        }
    }

    pub fn set_select(&self, select: Vec<Expr>) -> StructuralResult<Query> {
        if select.is_empty() {
            return Err(StructuralError::InvalidQuery(
                "select clause must be a non-empty list".to_string(),
            ));
        }
        check_clause_expressions("select", &select)?;
        Ok(Query {
            select: select.into(),
            ..self.clone()
        })
    }

    pub fn set_groupby(&self, groupby: Vec<Expr>) -> StructuralResult<Query> {
        check_clause_expressions("groupby", &groupby)?;
        Ok(Query {
            groupby: groupby.into(),
            ..self.clone()
        })
    }

    pub fn set_array_join(&self, array_join: Vec<Column>) -> Query {
        Query {
            array_join: array_join.into(),
            ..self.clone()
        }
    }

    pub fn set_where(&self, conditions: Vec<ConditionGroup>) -> Query {
        Query {
            where_: conditions.into(),
            ..self.clone()
        }
    }

    pub fn set_having(&self, conditions: Vec<ConditionGroup>) -> Query {
        Query {
            having: conditions.into(),
            ..self.clone()
        }
    }

    pub fn set_orderby(&self, orderby: Vec<OrderBy>) -> Query {
        Query {
            orderby: orderby.into(),
            ..self.clone()
        }
    }

    pub fn set_limitby(&self, limitby: LimitBy) -> Query {
        Query {
            limitby: Some(limitby),
            ..self.clone()
        }
    }

    pub fn set_limit(&self, limit: u32) -> StructuralResult<Query> {
        Ok(Query {
            limit: Some(Limit::new(limit)?),
            ..self.clone()
        })
    }

    pub fn set_offset(&self, offset: u64) -> Query {
        Query {
            offset: Some(Offset::new(offset)),
            ..self.clone()
        }
    }

    pub fn set_granularity(&self, granularity: u32) -> StructuralResult<Query> {
        Ok(Query {
            granularity: Some(Granularity::new(granularity)?),
            ..self.clone()
        })
    }

    pub fn set_totals(&self, totals: bool) -> Query {
        Query {
            totals: Some(totals),
            ..self.clone()
        }
    }
}

fn check_clause_expressions(clause: &str, exprs: &[Expr]) -> StructuralResult<()> {
    for expr in exprs {
        if matches!(expr, Expr::Identifier(_) | Expr::Lambda(_)) {
            return Err(StructuralError::InvalidQuery(format!(
                "{clause} clause cannot contain identifiers or lambdas outside a function"
            )));
        }
    }
    Ok(())
}
