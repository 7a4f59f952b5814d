//! The metrics query language.
//!
//! MQL has no datetime literal; datetimes are sent as quoted ISO strings.

use chrono::NaiveDateTime;

use super::helpers;
use super::{ListKind, QueryDialect};

#[derive(Debug, Clone, Copy)]
pub struct Mql;

impl QueryDialect for Mql {
    fn name(&self) -> &'static str {
        "mql"
    }

    fn quote_string(&self, s: &str) -> String {
        helpers::quote_string_double(s)
    }

    fn format_bool(&self, b: bool) -> &'static str {
        helpers::format_bool_lower(b)
    }

    fn format_datetime(&self, dt: &NaiveDateTime) -> String {
        helpers::quote_string_double(&helpers::format_datetime_iso(dt))
    }

    fn open_list(&self, _kind: ListKind) -> &'static str {
        "["
    }

    fn close_list(&self, _kind: ListKind) -> &'static str {
        "]"
    }
}
