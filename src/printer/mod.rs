//! Query printers.
//!
//! Both dialects render through the same `Token`/`TokenStream` pair; the
//! `Dialect` decides how literals, aliases and lists come out. Metrics
//! queries print as MQL, or as event queries once lowered by `metrics`.

pub mod dialect;
pub mod metrics;
pub mod mql;
pub mod snql;
pub mod token;

pub use dialect::{Dialect, ListKind, QueryDialect};
pub use token::{Token, TokenStream};

use crate::ast::query::Query;

/// Rendering options shared by both printers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Printer {
    /// Separate clauses with newlines instead of spaces.
    pub pretty: bool,
}

impl Printer {
    pub fn new(pretty: bool) -> Self {
        Self { pretty }
    }
}

impl Query {
    /// Single-line event query text, as sent to the engine.
    pub fn serialize(&self) -> String {
        Printer::new(false).print_query(self)
    }

    /// One clause per line, for logs and debugging.
    pub fn print(&self) -> String {
        Printer::new(true).print_query(self)
    }
}
