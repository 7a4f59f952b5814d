//! MQL parsing.
//!
//! `parse_mql` turns MQL text into a `MetricsExpr`. The work happens in two
//! passes:
//!
//! 1. **Parse** (`parser`): chumsky grammar over `&str`, producing a syntax tree.
//! 2. **Lower** (`lower`): the tree becomes timeseries and formulas, running
//!    the same checks the builders run.
//!
//! # Example
//!
//! ```ignore
//! use quarry::mql::parse_mql;
//!
//! let expr = parse_mql("sum(transaction.duration){} by (project_id) / 1000")?;
//! ```

mod lower;
mod parser;

use chumsky::Parser as _;
use thiserror::Error;

use crate::metrics::{MetricsError, MetricsExpr, MetricsQuery, MqlContext};

/// Deepest nesting accepted, both for brackets and for formulas built from
/// operator chains and function calls.
pub const MAX_DEPTH: usize = 64;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum MqlError {
    #[error("invalid mql syntax at {position}: {message}")]
    Syntax {
        position: usize,
        found: Option<String>,
        message: String,
    },

    #[error("mql nests deeper than {max} levels")]
    TooDeep { max: usize },

    #[error("unsupported mql: {0}")]
    Unsupported(String),

    #[error(transparent)]
    Invalid(#[from] MetricsError),
}

/// Parse MQL text into a timeseries or formula.
pub fn parse_mql(mql: &str) -> Result<MetricsExpr, MqlError> {
    tracing::debug!(mql = %mql, "parsing mql");
    check_depth(mql)?;

    let (node, errors) = parser::parser().parse(mql).into_output_errors();
    if let Some(e) = errors.into_iter().next() {
        let error = MqlError::Syntax {
            position: e.span().start,
            found: e.found().map(|c| c.to_string()),
            message: e.to_string(),
        };
        tracing::warn!(error = %error, "mql failed to parse");
        return Err(error);
    }
    let node = node.ok_or_else(|| MqlError::Syntax {
        position: 0,
        found: None,
        message: "no expression".to_string(),
    })?;

    lower::lower(&node).inspect_err(|e| tracing::warn!(error = %e, "mql failed to lower"))
}

/// Reject input nested past `MAX_DEPTH` before the recursive parser sees it.
/// Brackets inside double-quoted strings and backticks do not count.
fn check_depth(mql: &str) -> Result<(), MqlError> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for c in mql.chars() {
        match quote {
            Some(q) => {
                if escaped {
                    escaped = false;
                } else if c == '\\' && q == '"' {
                    escaped = true;
                } else if c == q {
                    quote = None;
                }
            }
            None => match c {
                '"' | '`' => quote = Some(c),
                '(' | '[' | '{' => {
                    depth += 1;
                    if depth > MAX_DEPTH {
                        return Err(MqlError::TooDeep { max: MAX_DEPTH });
                    }
                }
                ')' | ']' | '}' => depth = depth.saturating_sub(1),
                _ => {}
            },
        }
    }
    Ok(())
}

impl MetricsQuery {
    /// Parse MQL and fill in whatever the context carries.
    pub fn from_mql(mql: &str, context: Option<&MqlContext>) -> Result<MetricsQuery, MqlError> {
        let query = MetricsQuery::new(parse_mql(mql)?);
        match context {
            Some(context) => Ok(query.apply_context(context)?),
            None => Ok(query),
        }
    }
}
