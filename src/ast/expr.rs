//! Expression nodes - columns, literals, functions and lambdas.
//!
//! Every node is an immutable value. Constructors run the cheap local checks
//! (name patterns, operand kinds); the structural validator repeats them over
//! a whole tree, so nodes assembled by hand through the public fields are
//! still caught before printing.

use std::hash::{Hash, Hasher};
use std::sync::LazyLock;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Utc};
use regex::Regex;

use super::entity::Entity;
use super::error::{StructuralError, StructuralResult};

// =============================================================================
// Name patterns
// =============================================================================

/// Column names: letters, digits, `_`, `.`, `:` with an optional `[key]` suffix.
static COLUMN_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z_](\w|\.|:)*(\[([^\[\]]*)\])?$").unwrap());

/// Function names allow a little punctuation for pre-rendered curried names.
static FUNCTION_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^[a-zA-Z](\w|[().,+'":]| |\[|\]|\-)+$"#).unwrap());

/// Lambda identifiers.
static IDENTIFIER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*$").unwrap());

/// Output aliases. Backticks are never allowed so quoted aliases cannot break out.
static ALIAS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z_](\w|[.:\[\]()\-=, @/])*$").unwrap());

const MAX_ALIAS_LEN: usize = 256;

pub fn is_valid_column_name(name: &str) -> bool {
    COLUMN_NAME_RE.is_match(name)
}

pub fn is_valid_function_name(name: &str) -> bool {
    FUNCTION_NAME_RE.is_match(name)
}

pub fn is_valid_identifier(name: &str) -> bool {
    IDENTIFIER_RE.is_match(name)
}

pub fn is_valid_alias(alias: &str) -> bool {
    !alias.is_empty() && alias.len() <= MAX_ALIAS_LEN && ALIAS_RE.is_match(alias)
}

pub(crate) fn check_alias(node: &str, alias: &str) -> StructuralResult<()> {
    if is_valid_alias(alias) {
        Ok(())
    } else {
        Err(StructuralError::InvalidAlias {
            node: node.to_string(),
            alias: alias.to_string(),
        })
    }
}

// =============================================================================
// Scalars
// =============================================================================

/// A literal value.
#[derive(Debug, Clone)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Date(NaiveDate),
    DateTime(DateTime<FixedOffset>),
    /// Rendered as `array(...)`.
    List(Vec<Scalar>),
    /// Rendered as `tuple(...)`.
    Tuple(Vec<Scalar>),
}

// Floats compare and hash by bit pattern, so `0.0` and `-0.0` differ and
// NaN equals itself.
impl PartialEq for Scalar {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Scalar::Null, Scalar::Null) => true,
            (Scalar::Bool(a), Scalar::Bool(b)) => a == b,
            (Scalar::Int(a), Scalar::Int(b)) => a == b,
            (Scalar::Float(a), Scalar::Float(b)) => a.to_bits() == b.to_bits(),
            (Scalar::String(a), Scalar::String(b)) => a == b,
            (Scalar::Date(a), Scalar::Date(b)) => a == b,
            (Scalar::DateTime(a), Scalar::DateTime(b)) => a == b,
            (Scalar::List(a), Scalar::List(b)) | (Scalar::Tuple(a), Scalar::Tuple(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Scalar {}

impl Hash for Scalar {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Scalar::Null => {}
            Scalar::Bool(b) => b.hash(state),
            Scalar::Int(n) => n.hash(state),
            Scalar::Float(f) => f.to_bits().hash(state),
            Scalar::String(s) => s.hash(state),
            Scalar::Date(d) => d.hash(state),
            Scalar::DateTime(dt) => dt.hash(state),
            Scalar::List(items) | Scalar::Tuple(items) => items.hash(state),
        }
    }
}

impl Scalar {
    /// True for `List` and `Tuple`, the only values `IN` accepts as a literal rhs.
    pub fn is_iterable(&self) -> bool {
        matches!(self, Scalar::List(_) | Scalar::Tuple(_))
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Scalar::Int(_) | Scalar::Float(_))
    }

    /// The datetime converted to naive UTC, which is what the engine expects.
    pub fn naive_utc(&self) -> Option<NaiveDateTime> {
        match self {
            Scalar::DateTime(dt) => Some(dt.naive_utc()),
            Scalar::Date(d) => d.and_hms_opt(0, 0, 0),
            _ => None,
        }
    }

    /// Finite numbers only, and the elements of a list share one type
    /// (`NULL` aside). Tuples may mix types. Nested values are checked too.
    pub fn check(&self) -> StructuralResult<()> {
        match self {
            Scalar::Float(f) if !f.is_finite() => Err(StructuralError::argument(
                "scalar",
                "NaN and infinite floats cannot be rendered",
            )),
            Scalar::List(items) => {
                let mut kinds = items.iter().filter_map(Scalar::kind);
                if let Some(first) = kinds.next() {
                    if let Some(other) = kinds.find(|kind| *kind != first) {
                        return Err(StructuralError::InvalidArray(format!(
                            "{first} and {other} elements"
                        )));
                    }
                }
                items.iter().try_for_each(Scalar::check)
            }
            Scalar::Tuple(items) => items.iter().try_for_each(Scalar::check),
            _ => Ok(()),
        }
    }

    pub fn is_renderable(&self) -> bool {
        self.check().is_ok()
    }

    /// The element type the engine infers for an array; `None` for `NULL`.
    fn kind(&self) -> Option<&'static str> {
        match self {
            Scalar::Null => None,
            Scalar::Bool(_) => Some("bool"),
            Scalar::Int(_) | Scalar::Float(_) => Some("number"),
            Scalar::String(_) => Some("string"),
            Scalar::Date(_) | Scalar::DateTime(_) => Some("datetime"),
            Scalar::List(_) => Some("array"),
            Scalar::Tuple(_) => Some("tuple"),
        }
    }
}

impl From<i64> for Scalar {
    fn from(n: i64) -> Self {
        Scalar::Int(n)
    }
}

impl From<i32> for Scalar {
    fn from(n: i32) -> Self {
        Scalar::Int(n as i64)
    }
}

impl From<u32> for Scalar {
    fn from(n: u32) -> Self {
        Scalar::Int(n as i64)
    }
}

impl From<f64> for Scalar {
    fn from(f: f64) -> Self {
        Scalar::Float(f)
    }
}

impl From<bool> for Scalar {
    fn from(b: bool) -> Self {
        Scalar::Bool(b)
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Scalar::String(s.to_string())
    }
}

impl From<String> for Scalar {
    fn from(s: String) -> Self {
        Scalar::String(s)
    }
}

impl From<NaiveDate> for Scalar {
    fn from(d: NaiveDate) -> Self {
        Scalar::Date(d)
    }
}

impl From<DateTime<Utc>> for Scalar {
    fn from(dt: DateTime<Utc>) -> Self {
        Scalar::DateTime(dt.fixed_offset())
    }
}

impl From<DateTime<FixedOffset>> for Scalar {
    fn from(dt: DateTime<FixedOffset>) -> Self {
        Scalar::DateTime(dt)
    }
}

impl<T: Into<Scalar>> From<Vec<T>> for Scalar {
    fn from(items: Vec<T>) -> Self {
        Scalar::List(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Scalar>> From<Option<T>> for Scalar {
    fn from(value: Option<T>) -> Self {
        value.map_or(Scalar::Null, Into::into)
    }
}

/// Build a tuple literal.
pub fn tuple<T: Into<Scalar>>(items: impl IntoIterator<Item = T>) -> Scalar {
    Scalar::Tuple(items.into_iter().map(Into::into).collect())
}

// =============================================================================
// Columns
// =============================================================================

/// A column reference, optionally qualified by a join entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Column {
    pub name: String,
    pub entity: Option<Entity>,
}

impl Column {
    pub fn new(name: &str) -> StructuralResult<Self> {
        if !is_valid_column_name(name) {
            return Err(StructuralError::InvalidName {
                kind: "column",
                name: name.to_string(),
            });
        }
        Ok(Self {
            name: name.to_string(),
            entity: None,
        })
    }

    /// Qualify the column with a join entity. The entity must carry an alias.
    pub fn with_entity(mut self, entity: Entity) -> StructuralResult<Self> {
        if entity.alias.is_none() {
            return Err(StructuralError::argument(
                format!("column {}", self.name),
                "expects an Entity with an alias",
            ));
        }
        self.entity = Some(entity);
        Ok(self)
    }

    /// The outer column of `tags[key]`, or the whole name.
    pub fn subscriptable(&self) -> &str {
        match self.name.split_once('[') {
            Some((outer, _)) => outer,
            None => &self.name,
        }
    }

    /// The key of `tags[key]`.
    pub fn key(&self) -> Option<&str> {
        self.name
            .split_once('[')
            .map(|(_, rest)| rest.trim_end_matches(']'))
    }
}

/// A column with an output alias, used in `select` and `groupby`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AliasedExpression {
    pub expr: Column,
    pub alias: Option<String>,
}

impl AliasedExpression {
    pub fn new(expr: Column, alias: Option<&str>) -> StructuralResult<Self> {
        if let Some(alias) = alias {
            check_alias(&format!("aliased expression {}", expr.name), alias)?;
        }
        Ok(Self {
            expr,
            alias: alias.map(str::to_string),
        })
    }
}

// =============================================================================
// Functions
// =============================================================================

/// A function call: `name(p1, p2)`.
#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    pub parameters: Vec<Expr>,
    pub alias: Option<String>,
}

impl Function {
    pub fn new(name: &str, parameters: Vec<Expr>) -> StructuralResult<Self> {
        check_function_name(name)?;
        check_parameters(name, &parameters)?;
        Ok(Self {
            name: name.to_string(),
            parameters,
            alias: None,
        })
    }

    pub fn with_alias(mut self, alias: &str) -> StructuralResult<Self> {
        check_alias(&format!("function {}", self.name), alias)?;
        self.alias = Some(alias.to_string());
        Ok(self)
    }
}

// The alias only names the output column, it does not change the value.
impl PartialEq for Function {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.parameters == other.parameters
    }
}

impl Eq for Function {}

impl Hash for Function {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.parameters.hash(state);
    }
}

/// A curried call: `name(initializers)(parameters)`, e.g. `quantile(0.5)(duration)`.
#[derive(Debug, Clone)]
pub struct CurriedFunction {
    pub name: String,
    pub initializers: Vec<Expr>,
    pub parameters: Vec<Expr>,
    pub alias: Option<String>,
}

impl CurriedFunction {
    pub fn new(name: &str, initializers: Vec<Expr>, parameters: Vec<Expr>) -> StructuralResult<Self> {
        check_function_name(name)?;
        check_initializers(name, &initializers)?;
        check_parameters(name, &parameters)?;
        Ok(Self {
            name: name.to_string(),
            initializers,
            parameters,
            alias: None,
        })
    }

    pub fn with_alias(mut self, alias: &str) -> StructuralResult<Self> {
        check_alias(&format!("function {}", self.name), alias)?;
        self.alias = Some(alias.to_string());
        Ok(self)
    }
}

impl PartialEq for CurriedFunction {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.initializers == other.initializers
            && self.parameters == other.parameters
    }
}

impl Eq for CurriedFunction {}

impl Hash for CurriedFunction {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.initializers.hash(state);
        self.parameters.hash(state);
    }
}

pub(crate) fn check_function_name(name: &str) -> StructuralResult<()> {
    if is_valid_function_name(name) {
        Ok(())
    } else {
        Err(StructuralError::InvalidName {
            kind: "function",
            name: name.to_string(),
        })
    }
}

pub(crate) fn check_initializers(name: &str, initializers: &[Expr]) -> StructuralResult<()> {
    for init in initializers {
        if !matches!(init, Expr::Scalar(_) | Expr::Column(_)) {
            return Err(StructuralError::argument(
                format!("function {name}"),
                "initializers must be a scalar or column",
            ));
        }
    }
    Ok(())
}

pub(crate) fn check_parameters(name: &str, parameters: &[Expr]) -> StructuralResult<()> {
    for param in parameters {
        if matches!(param, Expr::Aliased(_)) {
            return Err(StructuralError::argument(
                format!("function {name}"),
                "aliased expressions cannot be passed as parameters",
            ));
        }
    }
    Ok(())
}

// =============================================================================
// Lambdas
// =============================================================================

/// A bare identifier bound by a lambda, rendered in backticks.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identifier {
    pub name: String,
}

impl Identifier {
    pub fn new(name: &str) -> StructuralResult<Self> {
        if !is_valid_identifier(name) {
            return Err(StructuralError::InvalidName {
                kind: "identifier",
                name: name.to_string(),
            });
        }
        Ok(Self {
            name: name.to_string(),
        })
    }
}

/// `(x, y) -> body` for higher-order functions such as `arrayMap`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Lambda {
    pub identifiers: Vec<String>,
    pub body: Box<Expr>,
}

impl Lambda {
    pub fn new(identifiers: &[&str], body: Expr) -> StructuralResult<Self> {
        for ident in identifiers {
            if !is_valid_identifier(ident) {
                return Err(StructuralError::InvalidName {
                    kind: "identifier",
                    name: ident.to_string(),
                });
            }
        }
        if !matches!(body, Expr::Function(_) | Expr::CurriedFunction(_)) {
            return Err(StructuralError::argument("lambda", "body must be a function"));
        }
        Ok(Self {
            identifiers: identifiers.iter().map(|s| s.to_string()).collect(),
            body: Box::new(body),
        })
    }
}

// =============================================================================
// Expression
// =============================================================================

/// An expression usable in `select`, `groupby`, `orderby` and condition operands.
///
/// Every variant must be handled by the validator and the printers; the
/// compiler enforces it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Expr {
    Column(Column),
    Aliased(AliasedExpression),
    Scalar(Scalar),
    Function(Function),
    CurriedFunction(CurriedFunction),
    Identifier(Identifier),
    Lambda(Lambda),
}

impl Expr {
    /// Wrap any literal value.
    pub fn lit(value: impl Into<Scalar>) -> Self {
        Expr::Scalar(value.into())
    }

    /// The output alias, if the expression carries one.
    pub fn alias(&self) -> Option<&str> {
        match self {
            Expr::Aliased(a) => a.alias.as_deref(),
            Expr::Function(f) => f.alias.as_deref(),
            Expr::CurriedFunction(f) => f.alias.as_deref(),
            _ => None,
        }
    }

    /// Visit this expression and every nested column.
    pub fn columns(&self) -> Vec<&Column> {
        let mut found = Vec::new();
        self.collect_columns(&mut found);
        found
    }

    fn collect_columns<'a>(&'a self, found: &mut Vec<&'a Column>) {
        match self {
            Expr::Column(c) => found.push(c),
            Expr::Aliased(a) => found.push(&a.expr),
            Expr::Scalar(_) | Expr::Identifier(_) => {}
            Expr::Function(f) => f.parameters.iter().for_each(|p| p.collect_columns(found)),
            Expr::CurriedFunction(f) => {
                f.initializers.iter().for_each(|p| p.collect_columns(found));
                f.parameters.iter().for_each(|p| p.collect_columns(found));
            }
            Expr::Lambda(l) => l.body.collect_columns(found),
        }
    }
}

impl From<Column> for Expr {
    fn from(c: Column) -> Self {
        Expr::Column(c)
    }
}

impl From<AliasedExpression> for Expr {
    fn from(a: AliasedExpression) -> Self {
        Expr::Aliased(a)
    }
}

impl From<Scalar> for Expr {
    fn from(s: Scalar) -> Self {
        Expr::Scalar(s)
    }
}

impl From<Function> for Expr {
    fn from(f: Function) -> Self {
        Expr::Function(f)
    }
}

impl From<CurriedFunction> for Expr {
    fn from(f: CurriedFunction) -> Self {
        Expr::CurriedFunction(f)
    }
}

impl From<Identifier> for Expr {
    fn from(i: Identifier) -> Self {
        Expr::Identifier(i)
    }
}

impl From<Lambda> for Expr {
    fn from(l: Lambda) -> Self {
        Expr::Lambda(l)
    }
}

// =============================================================================
// Constructor helpers
// =============================================================================

/// Column expression.
pub fn col(name: &str) -> StructuralResult<Expr> {
    Column::new(name).map(Expr::Column)
}

/// Function expression.
pub fn func(name: &str, parameters: Vec<Expr>) -> StructuralResult<Expr> {
    Function::new(name, parameters).map(Expr::Function)
}

/// Aliased function expression.
pub fn func_as(name: &str, parameters: Vec<Expr>, alias: &str) -> StructuralResult<Expr> {
    Function::new(name, parameters)?
        .with_alias(alias)
        .map(Expr::Function)
}

/// Curried function expression.
pub fn curried(name: &str, initializers: Vec<Expr>, parameters: Vec<Expr>) -> StructuralResult<Expr> {
    CurriedFunction::new(name, initializers, parameters).map(Expr::CurriedFunction)
}
