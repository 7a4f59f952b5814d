//! # quarry
//!
//! Build, validate and render queries for an analytical query engine.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │         Node Model (ast, metrics)                        │
//! │  (Query, Expr, ConditionGroup, Timeseries, Formula)      │
//! └─────────────────────────────────────────────────────────┘
//!           │                                   ▲
//!           ▼ [validation]                      │ [mql parser]
//! ┌──────────────────────────────┐   ┌────────────────────────┐
//! │ structural + schema checks   │   │       MQL text         │
//! └──────────────────────────────┘   └────────────────────────┘
//!           │
//!           ▼ [printer]
//! ┌─────────────────────────────────────────────────────────┐
//! │        SnQL text  /  MQL text + context  /  JSON body    │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! Every node is immutable: `set_*` methods return a new value and share
//! the untouched children.

pub mod ast;
pub mod config;
pub mod metrics;
pub mod mql;
pub mod optimizer;
pub mod printer;
pub mod validation;

/// Re-exports for convenient usage.
pub mod prelude {
    pub use crate::ast::{
        // Constructors
        col,
        curried,
        func,
        func_as,
        tuple,
        // Types
        AliasedExpression,
        BooleanCondition,
        BooleanOp,
        Column,
        Condition,
        ConditionGroup,
        CurriedFunction,
        DeleteQuery,
        Direction,
        Entity,
        Expr,
        Flags,
        Function,
        Identifier,
        Join,
        Lambda,
        LimitBy,
        Match,
        Op,
        OrderBy,
        Query,
        Relationship,
        Request,
        Scalar,
        Storage,
    };
    pub use crate::metrics::{
        ArithmeticOperator, Formula, FormulaParameter, Metric, MetricsExpr, MetricsQuery,
        MetricsScope, MqlContext, Rollup, Timeseries,
    };
    pub use crate::mql::parse_mql;
    pub use crate::optimizer::OrOptimizer;
    pub use crate::printer::{Dialect, Printer};
    pub use crate::validation::{ColumnModel, EntityModel, ValidationError};
}

// Also export at crate root for convenience
pub use ast::{DeleteQuery, Expr, Query, Request, Storage, StructuralError};
pub use metrics::{MetricsError, MetricsExpr, MetricsQuery};
pub use mql::{parse_mql, MqlError};
pub use validation::schema::{validate_required_columns, SchemaError};
pub use validation::{EntityModel, ValidationError};
