//! Node model for event queries.
//!
//! The tree is made of closed enums (`Expr`, `ConditionGroup`, `Match`) so
//! the validator and both printers match exhaustively over every variant.

pub mod condition;
pub mod delete_query;
pub mod entity;
pub mod error;
pub mod expr;
pub mod query;
pub mod request;
pub mod storage;

pub use condition::{
    get_first_level_and_conditions, BooleanCondition, BooleanOp, Condition, ConditionGroup, Op,
};
pub use delete_query::{ColumnValue, DeleteQuery};
pub use entity::{Entity, Join, Match, Relationship};
pub use error::{StructuralError, StructuralResult};
pub use expr::{
    col, curried, func, func_as, tuple, AliasedExpression, Column, CurriedFunction, Expr, Function,
    Identifier, Lambda, Scalar,
};
pub use query::{Direction, Granularity, Limit, LimitBy, Offset, OrderBy, Query};
pub use request::{Flags, Request, RequestError, RequestQuery, TenantId};
pub use storage::Storage;
