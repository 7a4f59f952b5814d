//! Event query printer.
//!
//! Turns a `Query` into a `TokenStream` clause by clause. The printer trusts
//! its input: `Query::validate` is what rejects malformed trees.

use crate::ast::condition::{BooleanCondition, BooleanOp, Condition, ConditionGroup};
use crate::ast::entity::{Entity, Join, Match, Relationship};
use crate::ast::expr::{Column, Expr, Scalar};
use crate::ast::query::{Direction, OrderBy, Query};
use crate::ast::storage::Storage;

use super::dialect::{Dialect, ListKind};
use super::token::{Token, TokenStream, COMMA_SPACE};
use super::Printer;

/// Per-query rendering state.
#[derive(Debug, Clone, Copy)]
struct Scope {
    /// Columns carry their entity alias only inside joins.
    qualify: bool,
}

impl Printer {
    /// Render an event query.
    pub fn print_query(&self, query: &Query) -> String {
        tracing::debug!(pretty = self.pretty, "printing query");
        self.query_tokens(query).serialize(Dialect::Snql)
    }

    fn query_tokens(&self, query: &Query) -> TokenStream {
        let scope = Scope {
            qualify: matches!(query.match_(), Match::Join(_)),
        };
        let mut clauses: Vec<TokenStream> = Vec::new();

        clauses.push(self.match_tokens(query.match_()));

        if !query.select().is_empty() {
            clauses.push(clause(Token::Select, exprs(query.select(), scope)));
        }
        if !query.groupby().is_empty() {
            clauses.push(clause(Token::By, exprs(query.groupby(), scope)));
        }
        if !query.array_join().is_empty() {
            let columns = query.array_join().iter().map(|c| column(c, scope));
            let mut ts = TokenStream::new();
            ts.join(columns, COMMA_SPACE);
            clauses.push(clause(Token::ArrayJoin, ts));
        }
        if !query.where_().is_empty() {
            clauses.push(clause(Token::Where, conditions(query.where_(), scope)));
        }
        if !query.having().is_empty() {
            clauses.push(clause(Token::Having, conditions(query.having(), scope)));
        }
        if !query.orderby().is_empty() {
            let items = query.orderby().iter().map(|o| orderby(o, scope));
            let mut ts = TokenStream::new();
            ts.join(items, COMMA_SPACE);
            clauses.push(clause(Token::OrderBy, ts));
        }
        if let Some(limitby) = query.limitby() {
            let mut ts = TokenStream::new();
            ts.push(Token::Limit)
                .space()
                .push(Token::LitInt(i64::from(limitby.count)))
                .space()
                .push(Token::By)
                .space();
            let columns = limitby.columns.iter().map(|c| column(c, scope));
            ts.join(columns, &[Token::Comma]);
            clauses.push(ts);
        }
        if let Some(limit) = query.limit() {
            clauses.push(clause(Token::Limit, int(i64::from(limit.get()))));
        }
        if let Some(offset) = query.offset() {
            let value = i64::try_from(offset.get()).unwrap_or(i64::MAX);
            clauses.push(clause(Token::Offset, int(value)));
        }
        if let Some(granularity) = query.granularity() {
            clauses.push(clause(Token::Granularity, int(i64::from(granularity.get()))));
        }
        if let Some(totals) = query.totals() {
            let mut ts = TokenStream::new();
            ts.push(Token::Flag(totals));
            clauses.push(clause(Token::Totals, ts));
        }

        let sep = if self.pretty { Token::Newline } else { Token::Space };
        let mut out = TokenStream::new();
        out.join(clauses, &[sep]);
        out
    }

    // =========================================================================
    // MATCH
    // =========================================================================

    fn match_tokens(&self, match_: &Match) -> TokenStream {
        let mut ts = TokenStream::new();
        ts.push(Token::Match).space();
        match match_ {
            Match::Entity(entity) => {
                ts.append(&entity_tokens(entity, false));
            }
            Match::Join(join) => {
                ts.append(&join_tokens(join));
            }
            Match::Storage(storage) => {
                ts.append(&storage_tokens(storage));
            }
            Match::Subquery(inner) => {
                // Subqueries print on one line.
                let inner = Printer { pretty: false }.query_tokens(inner);
                ts.push(Token::LBrace)
                    .space()
                    .append(&inner)
                    .space()
                    .push(Token::RBrace);
            }
        }
        ts
    }
}

fn clause(keyword: Token, body: TokenStream) -> TokenStream {
    let mut ts = TokenStream::new();
    ts.push(keyword).space().append(&body);
    ts
}

fn int(n: i64) -> TokenStream {
    let mut ts = TokenStream::new();
    ts.push(Token::LitInt(n));
    ts
}

/// `(e: events SAMPLE 0.1)`; the alias prefix is only printed inside joins.
fn entity_tokens(entity: &Entity, with_alias: bool) -> TokenStream {
    let mut ts = TokenStream::new();
    ts.lparen();
    if let (true, Some(alias)) = (with_alias, &entity.alias) {
        ts.push(Token::Ident(alias.clone())).push(Token::Colon).space();
    }
    ts.push(Token::Ident(entity.name.clone()));
    if let Some(sample) = entity.sample {
        ts.space().push(Token::Sample).space().push(Token::SampleRate(sample));
    }
    ts.rparen();
    ts
}

/// `STORAGE(metric_summaries SAMPLE 0.1)`
fn storage_tokens(storage: &Storage) -> TokenStream {
    let mut ts = TokenStream::new();
    ts.push(Token::Storage).lparen().push(Token::Ident(storage.name.clone()));
    if let Some(sample) = storage.sample {
        ts.space().push(Token::Sample).space().push(Token::SampleRate(sample));
    }
    ts.rparen();
    ts
}

fn relationship_tokens(rel: &Relationship) -> TokenStream {
    let mut ts = TokenStream::new();
    ts.append(&entity_tokens(&rel.lhs, true))
        .space()
        .push(Token::Ident(format!("-[{}]->", rel.name)))
        .space()
        .append(&entity_tokens(&rel.rhs, true));
    ts
}

fn join_tokens(join: &Join) -> TokenStream {
    let mut ts = TokenStream::new();
    ts.join(join.relationships.iter().map(relationship_tokens), COMMA_SPACE);
    ts
}

// =============================================================================
// Expressions
// =============================================================================

fn exprs(items: &[Expr], scope: Scope) -> TokenStream {
    let mut ts = TokenStream::new();
    ts.join(items.iter().map(|e| expr(e, scope)), COMMA_SPACE);
    ts
}

fn column(col: &Column, scope: Scope) -> TokenStream {
    let mut ts = TokenStream::new();
    if let (true, Some(alias)) = (scope.qualify, col.entity.as_ref().and_then(|e| e.alias.as_ref())) {
        ts.push(Token::Ident(alias.clone())).push(Token::Dot);
    }
    ts.push(Token::Ident(col.name.clone()));
    ts
}

fn with_alias(ts: &mut TokenStream, alias: Option<&String>) {
    if let Some(alias) = alias {
        ts.space().push(Token::As).space().push(Token::Alias(alias.clone()));
    }
}

fn call(ts: &mut TokenStream, params: &[Expr], scope: Scope) {
    ts.lparen().append(&exprs(params, scope)).rparen();
}

fn expr(e: &Expr, scope: Scope) -> TokenStream {
    let mut ts = TokenStream::new();
    match e {
        Expr::Column(c) => {
            ts.append(&column(c, scope));
        }
        Expr::Aliased(a) => {
            ts.append(&column(&a.expr, scope));
            with_alias(&mut ts, a.alias.as_ref());
        }
        Expr::Scalar(s) => {
            ts.append(&scalar(s));
        }
        Expr::Function(f) => {
            ts.push(Token::Ident(f.name.clone()));
            call(&mut ts, &f.parameters, scope);
            with_alias(&mut ts, f.alias.as_ref());
        }
        Expr::CurriedFunction(f) => {
            ts.push(Token::Ident(f.name.clone()));
            call(&mut ts, &f.initializers, scope);
            call(&mut ts, &f.parameters, scope);
            with_alias(&mut ts, f.alias.as_ref());
        }
        Expr::Identifier(i) => {
            ts.push(Token::LambdaIdent(i.name.clone()));
        }
        Expr::Lambda(l) => {
            let idents = l.identifiers.iter().map(|i| {
                let mut ts = TokenStream::new();
                ts.push(Token::LambdaIdent(i.clone()));
                ts
            });
            ts.lparen()
                .join(idents, COMMA_SPACE)
                .rparen()
                .space()
                .push(Token::Arrow)
                .space()
                .append(&expr(&l.body, scope));
        }
    }
    ts
}

/// A literal. Shared with the metrics printer.
pub(crate) fn scalar(s: &Scalar) -> TokenStream {
    let mut ts = TokenStream::new();
    match s {
        Scalar::Null => {
            ts.push(Token::LitNull);
        }
        Scalar::Bool(b) => {
            ts.push(Token::LitBool(*b));
        }
        Scalar::Int(n) => {
            ts.push(Token::LitInt(*n));
        }
        Scalar::Float(f) => {
            ts.push(Token::LitFloat(*f));
        }
        Scalar::String(v) => {
            ts.push(Token::LitString(v.clone()));
        }
        Scalar::Date(_) | Scalar::DateTime(_) => {
            if let Some(dt) = s.naive_utc() {
                ts.push(Token::LitDateTime(dt));
            }
        }
        Scalar::List(items) => {
            ts.append(&list(items, ListKind::Array));
        }
        Scalar::Tuple(items) => {
            ts.append(&list(items, ListKind::Tuple));
        }
    }
    ts
}

pub(crate) fn list(items: &[Scalar], kind: ListKind) -> TokenStream {
    let mut ts = TokenStream::new();
    ts.push(Token::ListOpen(kind))
        .join(items.iter().map(scalar), COMMA_SPACE)
        .push(Token::ListClose(kind));
    ts
}

fn orderby(o: &OrderBy, scope: Scope) -> TokenStream {
    let mut ts = expr(&o.expr, scope);
    ts.space().push(match o.direction {
        Direction::Asc => Token::Asc,
        Direction::Desc => Token::Desc,
    });
    ts
}

// =============================================================================
// Conditions
// =============================================================================

fn condition(c: &Condition, scope: Scope) -> TokenStream {
    let mut ts = expr(&c.lhs, scope);
    ts.space().push(Token::Op(c.op));
    match &c.rhs {
        Some(Expr::Scalar(Scalar::List(items) | Scalar::Tuple(items))) if c.op.requires_iterable() => {
            ts.space().append(&list(items, ListKind::InRhs));
        }
        Some(rhs) => {
            ts.space().append(&expr(rhs, scope));
        }
        None => {}
    }
    ts
}

/// A child of a boolean whose connective is `parent`.
fn nested(group: &ConditionGroup, parent: BooleanOp, scope: Scope) -> TokenStream {
    match group {
        ConditionGroup::Condition(c) => condition(c, scope),
        ConditionGroup::Boolean(b) if b.op == parent => boolean(b, scope),
        ConditionGroup::Boolean(b) => {
            let mut ts = TokenStream::new();
            ts.lparen().append(&boolean(b, scope)).rparen();
            ts
        }
    }
}

fn boolean(b: &BooleanCondition, scope: Scope) -> TokenStream {
    let sep = [Token::Space, connective(b.op), Token::Space];
    let mut ts = TokenStream::new();
    ts.join(b.conditions.iter().map(|c| nested(c, b.op, scope)), &sep);
    ts
}

fn connective(op: BooleanOp) -> Token {
    match op {
        BooleanOp::And => Token::And,
        BooleanOp::Or => Token::Or,
    }
}

/// A `WHERE`/`HAVING` body: the top level is an implicit AND.
fn conditions(groups: &[ConditionGroup], scope: Scope) -> TokenStream {
    let sep = [Token::Space, Token::And, Token::Space];
    let mut ts = TokenStream::new();
    if let [only] = groups {
        ts.append(&match only {
            ConditionGroup::Condition(c) => condition(c, scope),
            ConditionGroup::Boolean(b) => boolean(b, scope),
        });
    } else {
        ts.join(groups.iter().map(|g| nested(g, BooleanOp::And, scope)), &sep);
    }
    ts
}
