//! Tokens - the atomic units of printed queries.
//!
//! Tokens are dialect-agnostic representations that serialize
//! to dialect-specific strings.

use chrono::NaiveDateTime;

use super::dialect::{helpers, Dialect, ListKind, QueryDialect};
use crate::ast::condition::Op;

/// Every element a printed query can contain.
///
/// Adding a new variant here will cause compile errors everywhere
/// it needs to be handled (exhaustive matching).
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // === Clause Keywords ===
    Match,
    Select,
    By,
    ArrayJoin,
    Where,
    Having,
    OrderBy,
    Limit,
    Offset,
    Granularity,
    Totals,
    Sample,
    Storage,

    // === Keywords ===
    As,
    And,
    Or,
    Asc,
    Desc,

    // === Punctuation ===
    Comma,
    Colon,
    Dot,
    Bang,
    Arrow,
    LParen,
    RParen,
    LBrace,
    RBrace,
    ListOpen(ListKind),
    ListClose(ListKind),

    // === Operators ===
    /// A condition operator such as `>=` or `NOT IN`.
    Op(Op),
    /// An infix arithmetic symbol.
    Arith(&'static str),

    // === Whitespace / Formatting ===
    Space,
    Newline,

    // === Dynamic Content ===
    /// A name already checked by the validator (column, function, entity, tag).
    Ident(String),
    /// Output alias, quoted only when it is not a plain identifier.
    Alias(String),
    /// Lambda identifier, always quoted.
    LambdaIdent(String),
    LitInt(i64),
    LitFloat(f64),
    LitString(String),
    LitBool(bool),
    LitNull,
    LitDateTime(NaiveDateTime),
    /// `True`/`False` flag as used by `TOTALS`.
    Flag(bool),
    /// Entity sample rate.
    SampleRate(f64),
}

impl Token {
    /// Serialize this token to a string for the given dialect.
    pub fn serialize(&self, dialect: Dialect) -> String {
        match self {
            // Clause keywords
            Token::Match => "MATCH".into(),
            Token::Select => "SELECT".into(),
            Token::By => "BY".into(),
            Token::ArrayJoin => "ARRAY JOIN".into(),
            Token::Where => "WHERE".into(),
            Token::Having => "HAVING".into(),
            Token::OrderBy => "ORDER BY".into(),
            Token::Limit => "LIMIT".into(),
            Token::Offset => "OFFSET".into(),
            Token::Granularity => "GRANULARITY".into(),
            Token::Totals => "TOTALS".into(),
            Token::Sample => "SAMPLE".into(),
            Token::Storage => "STORAGE".into(),

            // Keywords
            Token::As => "AS".into(),
            Token::And => "AND".into(),
            Token::Or => "OR".into(),
            Token::Asc => "ASC".into(),
            Token::Desc => "DESC".into(),

            // Punctuation
            Token::Comma => ",".into(),
            Token::Colon => ":".into(),
            Token::Dot => ".".into(),
            Token::Bang => "!".into(),
            Token::Arrow => "->".into(),
            Token::LParen => "(".into(),
            Token::RParen => ")".into(),
            Token::LBrace => "{".into(),
            Token::RBrace => "}".into(),
            Token::ListOpen(kind) => dialect.open_list(*kind).into(),
            Token::ListClose(kind) => dialect.close_list(*kind).into(),

            // Operators
            Token::Op(op) => op.as_str().into(),
            Token::Arith(symbol) => (*symbol).into(),

            // Whitespace
            Token::Space => " ".into(),
            Token::Newline => "\n".into(),

            // Dynamic - dialect-specific formatting
            Token::Ident(name) => name.clone(),
            Token::Alias(alias) => dialect.quote_alias(alias),
            Token::LambdaIdent(ident) => dialect.quote_identifier(ident),
            Token::LitInt(n) => n.to_string(),
            Token::LitFloat(f) => helpers::format_float(*f),
            Token::LitString(s) => dialect.quote_string(s),
            Token::LitBool(b) => dialect.format_bool(*b).into(),
            Token::LitNull => dialect.format_null().into(),
            Token::LitDateTime(dt) => dialect.format_datetime(dt),
            Token::Flag(b) => if *b { "True" } else { "False" }.into(),
            Token::SampleRate(rate) => helpers::format_sample(*rate),
        }
    }
}

/// A stream of tokens that can be serialized to query text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TokenStream {
    tokens: Vec<Token>,
}

impl TokenStream {
    /// Create an empty token stream.
    pub fn new() -> Self {
        Self { tokens: vec![] }
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Push a single token.
    pub fn push(&mut self, token: Token) -> &mut Self {
        self.tokens.push(token);
        self
    }

    /// Extend with multiple tokens.
    pub fn extend(&mut self, tokens: impl IntoIterator<Item = Token>) -> &mut Self {
        self.tokens.extend(tokens);
        self
    }

    /// Append another token stream.
    pub fn append(&mut self, other: &TokenStream) -> &mut Self {
        self.tokens.extend(other.tokens.iter().cloned());
        self
    }

    /// Append `items` separated by `sep`.
    pub fn join<I>(&mut self, items: I, sep: &[Token]) -> &mut Self
    where
        I: IntoIterator<Item = TokenStream>,
    {
        for (i, item) in items.into_iter().enumerate() {
            if i > 0 {
                self.extend(sep.iter().cloned());
            }
            self.append(&item);
        }
        self
    }

    /// Serialize all tokens to a string.
    pub fn serialize(&self, dialect: Dialect) -> String {
        self.tokens.iter().map(|t| t.serialize(dialect)).collect()
    }

    // Convenience methods for common tokens
    pub fn space(&mut self) -> &mut Self {
        self.push(Token::Space)
    }
    pub fn newline(&mut self) -> &mut Self {
        self.push(Token::Newline)
    }
    pub fn comma(&mut self) -> &mut Self {
        self.push(Token::Comma)
    }
    pub fn lparen(&mut self) -> &mut Self {
        self.push(Token::LParen)
    }
    pub fn rparen(&mut self) -> &mut Self {
        self.push(Token::RParen)
    }
}

/// `, ` as a separator.
pub(crate) const COMMA_SPACE: &[Token] = &[Token::Comma, Token::Space];
