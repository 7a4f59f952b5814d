//! MQL grammar using chumsky.
//!
//! Parses straight from `&str` into a small syntax tree. The tree keeps the
//! shape of the text (which rule matched, raw names and values); turning it
//! into metrics types happens in `lower`, where model errors can be reported.
//!
//! Alternatives are ordered and the first one that matches wins, so the
//! order inside each `choice` is part of the grammar.

use chumsky::prelude::*;

use crate::metrics::ArithmeticOperator;
use crate::printer::dialect::helpers::unescape_mql;

// ============================================================================
// Syntax tree
// ============================================================================

/// A numeric literal. Numbers without a `.` or an exponent stay integers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Number {
    Int(i64),
    Float(f64),
}

/// A curried aggregate parameter, e.g. the `0.5` in `quantiles(0.5)(...)`.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Param {
    Number(Number),
    String(String),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum MetricRef {
    Mri(String),
    PublicName(String),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TagKey {
    Name(String),
    Variable(String),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TagValue {
    Exact(String),
    /// Ends with a `*` wildcard, which is kept in the value.
    Wildcard(String),
    List(Vec<String>),
    Variable(String),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum FilterNode {
    Tag {
        negated: bool,
        key: TagKey,
        value: TagValue,
    },
    And(Vec<FilterNode>),
    Or(Vec<FilterNode>),
}

impl FilterNode {
    fn all(mut nodes: Vec<FilterNode>) -> FilterNode {
        if nodes.len() == 1 {
            nodes.remove(0)
        } else {
            FilterNode::And(nodes)
        }
    }

    fn any(mut nodes: Vec<FilterNode>) -> FilterNode {
        if nodes.len() == 1 {
            nodes.remove(0)
        } else {
            FilterNode::Or(nodes)
        }
    }
}

/// `metric{filters} by (groupby)` inside an aggregate call.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct InnerFilter {
    pub metric: MetricRef,
    pub filters: Option<FilterNode>,
    pub groupby: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Node {
    Number(Number),
    String(String),
    Negate(Box<Node>),
    /// `first op rhs op rhs ...`, all at one precedence level and folded
    /// left-associatively when lowered.
    Chain {
        first: Box<Node>,
        rest: Vec<(ArithmeticOperator, Node)>,
    },
    /// Filters and groupby attached after a target.
    Filter {
        target: Box<Node>,
        filters: Option<FilterNode>,
        groupby: Vec<String>,
    },
    /// `sum(metric)` or `quantiles(0.5)(metric)`.
    Aggregate {
        name: String,
        params: Option<Vec<Param>>,
        inner: InnerFilter,
    },
    /// `apdex(expr, 300)` or `topK(10)(expr)`.
    Function {
        name: String,
        params: Option<Vec<Param>>,
        args: Vec<Node>,
    },
    Metric(MetricRef),
    Variable(String),
}

impl Node {
    fn chain(first: Node, rest: Vec<(ArithmeticOperator, Node)>) -> Node {
        if rest.is_empty() {
            return first;
        }
        Node::Chain {
            first: Box::new(first),
            rest,
        }
    }

    fn with_suffix(self, filters: Option<FilterNode>, groupby: Option<Vec<String>>) -> Node {
        let groupby = groupby.unwrap_or_default();
        if filters.is_none() && groupby.is_empty() {
            return self;
        }
        Node::Filter {
            target: Box::new(self),
            filters,
            groupby,
        }
    }
}

// ============================================================================
// Grammar
// ============================================================================

type Extra<'src> = extra::Err<Rich<'src, char>>;

fn is_name_char(c: &char) -> bool {
    c.is_ascii_alphanumeric() || *c == '_'
}

fn is_tag_char(c: &char) -> bool {
    is_name_char(c) || *c == '.'
}

/// Characters that end an unquoted tag value.
const VALUE_STOP: &str = ",[]\"{}()*";

/// Characters that can never appear in an unquoted MRI.
const MRI_STOP: &str = "(){}[]\"`,";

/// A word that must not run on into a longer tag name.
fn keyword<'src>(word: &'static str) -> impl Parser<'src, &'src str, (), Extra<'src>> + Clone {
    just(word)
        .then_ignore(any().filter(is_tag_char).not())
        .ignored()
}

fn number<'src>() -> impl Parser<'src, &'src str, Number, Extra<'src>> + Clone {
    let exponent = one_of("eE")
        .then(one_of("+-").or_not())
        .then(text::digits(10));

    text::digits(10)
        .then(just('.').then(text::digits(10)).or_not())
        .then(exponent.or_not())
        .to_slice()
        .try_map(|s: &str, span| {
            if s.contains(['.', 'e', 'E']) {
                s.parse::<f64>()
                    .map(Number::Float)
                    .map_err(|e| Rich::custom(span, e))
            } else {
                s.parse::<i64>()
                    .map(Number::Int)
                    .map_err(|e| Rich::custom(span, e))
            }
        })
        .labelled("number")
}

/// The raw text between double quotes, escapes still in place.
fn quoted_raw<'src>() -> impl Parser<'src, &'src str, &'src str, Extra<'src>> + Clone {
    just('\\')
        .then(any())
        .ignored()
        .or(none_of("\\\"").ignored())
        .repeated()
        .to_slice()
        .delimited_by(just('"'), just('"'))
        .labelled("quoted string")
}

fn quoted<'src>() -> impl Parser<'src, &'src str, String, Extra<'src>> + Clone {
    quoted_raw().map(unescape_mql)
}

fn unquoted<'src>() -> impl Parser<'src, &'src str, &'src str, Extra<'src>> + Clone {
    none_of(VALUE_STOP)
        .filter(|c: &char| !c.is_whitespace())
        .repeated()
        .at_least(1)
        .to_slice()
}

fn variable<'src>() -> impl Parser<'src, &'src str, String, Extra<'src>> + Clone {
    just('$')
        .ignore_then(any().filter(is_tag_char).repeated().at_least(1).to_slice())
        .map(str::to_string)
        .labelled("variable")
}

fn name<'src>() -> impl Parser<'src, &'src str, String, Extra<'src>> + Clone {
    any()
        .filter(is_name_char)
        .repeated()
        .at_least(1)
        .to_slice()
        .map(str::to_string)
        .labelled("function name")
}

fn tag_name<'src>() -> impl Parser<'src, &'src str, String, Extra<'src>> + Clone {
    any()
        .filter(is_tag_char)
        .repeated()
        .at_least(1)
        .to_slice()
        .map(str::to_string)
        .labelled("tag")
}

fn tag_value<'src>() -> impl Parser<'src, &'src str, TagValue, Extra<'src>> + Clone {
    let list_item = quoted().or(unquoted().map(str::to_string));
    let list = list_item
        .padded()
        .separated_by(just(','))
        .at_least(1)
        .collect::<Vec<_>>()
        .delimited_by(just('['), just(']'))
        .map(TagValue::List);

    let quoted_value = quoted_raw().map(|raw| {
        let value = unescape_mql(raw);
        if raw.ends_with('*') && !raw.ends_with("\\*") {
            TagValue::Wildcard(value)
        } else {
            TagValue::Exact(value)
        }
    });

    let wildcard = unquoted()
        .then_ignore(just('*'))
        .map(|s| TagValue::Wildcard(format!("{s}*")));

    choice((
        list,
        quoted_value,
        variable().map(TagValue::Variable),
        wildcard,
        unquoted().map(|s| TagValue::Exact(s.to_string())),
    ))
    .labelled("tag value")
}

fn filter_expr<'src>() -> impl Parser<'src, &'src str, FilterNode, Extra<'src>> + Clone {
    recursive(|filter_expr| {
        let nested = filter_expr.padded().delimited_by(just('('), just(')'));

        let key = variable()
            .map(TagKey::Variable)
            .or(tag_name().map(TagKey::Name));
        let tag = just('!')
            .or_not()
            .then(key)
            .then_ignore(just(':').padded())
            .then(tag_value())
            .map(|((bang, key), value)| FilterNode::Tag {
                negated: bang.is_some(),
                key,
                value,
            });

        let factor = tag.or(nested).padded();
        let joint = just(',').ignored().or(keyword("AND").or(keyword("and")));
        let term = factor
            .separated_by(joint.or_not())
            .at_least(1)
            .collect::<Vec<_>>()
            .map(FilterNode::all);

        term.separated_by(keyword("OR").or(keyword("or")))
            .at_least(1)
            .collect::<Vec<_>>()
            .map(FilterNode::any)
    })
}

/// `{ filter_expr? }`; empty braces mean no filter.
fn braces<'src>() -> impl Parser<'src, &'src str, Option<FilterNode>, Extra<'src>> + Clone {
    filter_expr()
        .or_not()
        .padded()
        .delimited_by(just('{'), just('}'))
}

fn group_by<'src>() -> impl Parser<'src, &'src str, Vec<String>, Extra<'src>> + Clone {
    let names = tag_name()
        .padded()
        .separated_by(just(','))
        .at_least(1)
        .collect::<Vec<_>>()
        .delimited_by(just('('), just(')'));

    keyword("by")
        .padded()
        .ignore_then(names.or(tag_name().map(|n| vec![n])))
        .labelled("group by")
}

fn metric<'src>() -> impl Parser<'src, &'src str, MetricRef, Extra<'src>> + Clone {
    let mri_part = |stop: &'static str| {
        none_of(stop)
            .filter(|c: &char| !c.is_whitespace() && !MRI_STOP.contains(*c))
            .repeated()
            .at_least(1)
    };
    let unquoted_mri = mri_part(":")
        .then(just(':'))
        .then(mri_part("/"))
        .then(just('/'))
        .then(mri_part("@"))
        .then(just('@'))
        .then(mri_part(""))
        .to_slice();

    let lenient = |stop: &'static str| none_of(stop).repeated().at_least(1);
    let quoted_mri = lenient(":`")
        .then(just(':'))
        .then(lenient("/`"))
        .then(just('/'))
        .then(lenient("@,`"))
        .then(just('@'))
        .then(lenient("`"))
        .to_slice()
        .delimited_by(just('`'), just('`'));

    let segment = any()
        .filter(|c: &char| c.is_ascii_lowercase() || *c == '_')
        .repeated()
        .at_least(1);
    let public_name = segment
        .clone()
        .then(just('.').then(segment).repeated())
        .to_slice();

    choice((
        quoted_mri.map(|s: &str| MetricRef::Mri(s.to_string())),
        unquoted_mri.map(|s: &str| MetricRef::Mri(s.to_string())),
        public_name
            .clone()
            .delimited_by(just('`'), just('`'))
            .map(|s: &str| MetricRef::PublicName(s.to_string())),
        public_name.map(|s: &str| MetricRef::PublicName(s.to_string())),
    ))
    .labelled("metric")
}

fn inner_filter<'src>() -> impl Parser<'src, &'src str, InnerFilter, Extra<'src>> + Clone {
    metric()
        .then(braces().padded().or_not())
        .then(group_by().or_not())
        .map(|((metric, filters), groupby)| InnerFilter {
            metric,
            filters: filters.flatten(),
            groupby: groupby.unwrap_or_default(),
        })
}

fn param<'src>() -> impl Parser<'src, &'src str, Param, Extra<'src>> + Clone {
    choice((
        number().map(Param::Number),
        quoted().map(Param::String),
        unquoted().map(|s| Param::String(s.to_string())),
    ))
}

/// Create the MQL parser.
///
/// The whole input must be one expression; surrounding whitespace is allowed.
pub(crate) fn parser<'src>() -> impl Parser<'src, &'src str, Node, Extra<'src>> {
    let expression = recursive(|expression| {
        let params = param()
            .padded()
            .separated_by(just(','))
            .collect::<Vec<_>>()
            .delimited_by(just('('), just(')'));
        let args = expression
            .clone()
            .padded()
            .separated_by(just(','))
            .at_least(1)
            .collect::<Vec<_>>()
            .delimited_by(just('('), just(')'));
        let inner = inner_filter().padded().delimited_by(just('('), just(')'));

        let curried_aggregate = name()
            .then(params.clone())
            .then(inner.clone())
            .map(|((name, params), inner)| Node::Aggregate {
                name,
                params: Some(params),
                inner,
            });
        let curried_function = name()
            .then(params)
            .then(args.clone())
            .map(|((name, params), args)| Node::Function {
                name,
                params: Some(params),
                args,
            });
        let aggregate = name().then(inner).map(|(name, inner)| Node::Aggregate {
            name,
            params: None,
            inner,
        });
        let function = name().then(args).map(|(name, args)| Node::Function {
            name,
            params: None,
            args,
        });

        let call = choice((curried_aggregate, curried_function, aggregate, function))
            .then(group_by().or_not())
            .map(|(node, groupby)| node.with_suffix(None, groupby))
            .boxed();

        let nested = expression.padded().delimited_by(just('('), just(')'));

        let target = choice((
            variable().map(Node::Variable),
            nested,
            call,
            metric().map(Node::Metric),
        ));

        let filter = target
            .then(braces().padded().or_not())
            .then(group_by().or_not())
            .map(|((target, filters), groupby)| target.with_suffix(filters.flatten(), groupby));

        let coefficient = choice((
            number().map(Node::Number),
            quoted().map(Node::String),
            filter,
        ));

        let unary = just('-')
            .padded()
            .or_not()
            .then(coefficient)
            .map(|(minus, node)| match minus {
                Some(_) => Node::Negate(Box::new(node)),
                None => node,
            })
            .boxed();

        let term_op = choice((
            just('*').to(ArithmeticOperator::Multiply),
            just('/').to(ArithmeticOperator::Divide),
        ));
        let term = unary
            .clone()
            .then(term_op.padded().then(unary).repeated().collect::<Vec<_>>())
            .map(|(first, rest)| Node::chain(first, rest))
            .boxed();

        let expr_op = choice((
            just('+').to(ArithmeticOperator::Plus),
            just('-').to(ArithmeticOperator::Minus),
        ));
        term.clone()
            .then(expr_op.padded().then(term).repeated().collect::<Vec<_>>())
            .map(|(first, rest)| Node::chain(first, rest))
    });

    expression.padded().then_ignore(end())
}
