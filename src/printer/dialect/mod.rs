//! Dialect definitions and formatting rules.
//!
//! Each dialect implements `QueryDialect` to handle its specific syntax:
//!
//! - String literals: `'single'` with backslash escapes (SnQL), `"double"` (MQL)
//! - Datetimes: `toDateTime('...')` calls (SnQL), plain quoted strings (MQL)
//! - Lists: `array(..)`/`tuple(..)` (SnQL), `[..]` (MQL)
//!
//! # Usage
//!
//! ```ignore
//! use quarry::printer::{Dialect, QueryDialect};
//!
//! let quoted = Dialect::Snql.quote_string("it's");  // 'it\'s'
//! ```

pub mod helpers;
mod mql;
mod snql;

pub use mql::Mql;
pub use snql::Snql;

use chrono::NaiveDateTime;

/// Shape of a bracketed list of literals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListKind {
    Array,
    Tuple,
    /// The rhs of `IN`/`NOT IN`.
    InRhs,
}

/// Dialect trait - defines how literals and names are rendered.
pub trait QueryDialect: std::fmt::Debug {
    /// Dialect name for display/logging.
    fn name(&self) -> &'static str;

    /// Quote a string literal.
    fn quote_string(&self, s: &str) -> String;

    /// Quote an output alias.
    fn quote_alias(&self, alias: &str) -> String {
        helpers::quote_alias(alias)
    }

    /// Quote a lambda identifier.
    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_backtick(ident)
    }

    fn format_bool(&self, b: bool) -> &'static str;

    fn format_null(&self) -> &'static str {
        "NULL"
    }

    /// Format a datetime already converted to naive UTC.
    fn format_datetime(&self, dt: &NaiveDateTime) -> String;

    fn open_list(&self, kind: ListKind) -> &'static str;

    fn close_list(&self, kind: ListKind) -> &'static str;
}

/// Supported dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dialect {
    #[default]
    Snql,
    Mql,
}

impl Dialect {
    /// Get the dialect implementation.
    pub fn dialect(&self) -> &'static dyn QueryDialect {
        match self {
            Dialect::Snql => &Snql,
            Dialect::Mql => &Mql,
        }
    }
}

impl QueryDialect for Dialect {
    fn name(&self) -> &'static str {
        self.dialect().name()
    }

    fn quote_string(&self, s: &str) -> String {
        self.dialect().quote_string(s)
    }

    fn quote_alias(&self, alias: &str) -> String {
        self.dialect().quote_alias(alias)
    }

    fn quote_identifier(&self, ident: &str) -> String {
        self.dialect().quote_identifier(ident)
    }

    fn format_bool(&self, b: bool) -> &'static str {
        self.dialect().format_bool(b)
    }

    fn format_null(&self) -> &'static str {
        self.dialect().format_null()
    }

    fn format_datetime(&self, dt: &NaiveDateTime) -> String {
        self.dialect().format_datetime(dt)
    }

    fn open_list(&self, kind: ListKind) -> &'static str {
        self.dialect().open_list(kind)
    }

    fn close_list(&self, kind: ListKind) -> &'static str {
        self.dialect().close_list(kind)
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}
