//! The event query dialect.
//!
//! - Single-quoted strings with backslash escapes
//! - `TRUE`/`FALSE`
//! - Datetimes as `toDateTime('...')` in naive UTC
//! - `array(..)`, `tuple(..)`, and bare `(..)` after `IN`

use chrono::NaiveDateTime;

use super::helpers;
use super::{ListKind, QueryDialect};

#[derive(Debug, Clone, Copy)]
pub struct Snql;

impl QueryDialect for Snql {
    fn name(&self) -> &'static str {
        "snql"
    }

    fn quote_string(&self, s: &str) -> String {
        helpers::quote_string_single(s)
    }

    fn format_bool(&self, b: bool) -> &'static str {
        helpers::format_bool_upper(b)
    }

    fn format_datetime(&self, dt: &NaiveDateTime) -> String {
        helpers::format_datetime_call(dt)
    }

    fn open_list(&self, kind: ListKind) -> &'static str {
        match kind {
            ListKind::Array => "array(",
            ListKind::Tuple => "tuple(",
            ListKind::InRhs => "(",
        }
    }

    fn close_list(&self, _kind: ListKind) -> &'static str {
        ")"
    }
}
