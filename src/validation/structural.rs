//! Whole-tree structural validation.
//!
//! A pure recursive walk: every node is checked against the same local rules
//! its constructor applies, then the cross-node rules (alias uniqueness, join
//! qualification, subquery column visibility) are applied on top.

use std::collections::{BTreeMap, HashSet};

use crate::ast::condition::ConditionGroup;
use crate::ast::entity::{Join, Match};
use crate::ast::error::{StructuralError, StructuralResult};
use crate::ast::expr::{
    check_alias, check_function_name, check_initializers, check_parameters, is_valid_column_name,
    is_valid_identifier, Column, Expr,
};
use crate::ast::query::Query;

/// Validate a query tree. Stops at the first malformed node.
pub fn validate_query(query: &Query) -> StructuralResult<()> {
    validate_match(query.match_())?;

    if query.select().is_empty() {
        return Err(StructuralError::InvalidQuery(
            "query must have at least one expression in select".to_string(),
        ));
    }
    validate_scope("select", query.select())?;
    validate_scope("groupby", query.groupby())?;

    for column in query.array_join() {
        validate_column(column)?;
    }
    for group in query.where_().iter().chain(query.having()) {
        validate_condition_group(group)?;
    }
    for orderby in query.orderby() {
        if matches!(orderby.expr, Expr::Aliased(_) | Expr::Lambda(_)) {
            return Err(StructuralError::argument(
                "orderby",
                "expression must be a Column, Function, CurriedFunction or scalar",
            ));
        }
        validate_expr(&orderby.expr)?;
    }
    if let Some(limitby) = query.limitby() {
        limitby.check()?;
        for column in &limitby.columns {
            validate_column(column)?;
        }
    }

    if query.totals() == Some(true) && query.groupby().is_empty() {
        return Err(StructuralError::InvalidQuery(
            "totals is only valid with a groupby".to_string(),
        ));
    }

    match query.match_() {
        Match::Entity(_) | Match::Storage(_) => {}
        Match::Join(join) => validate_join_columns(query, join)?,
        Match::Subquery(inner) => validate_subquery_columns(query, inner)?,
    }

    Ok(())
}

fn validate_match(match_: &Match) -> StructuralResult<()> {
    match match_ {
        Match::Entity(entity) => entity.check(),
        Match::Join(join) => {
            if join.relationships.is_empty() {
                return Err(StructuralError::InvalidMatch(
                    "join must have at least one relationship".to_string(),
                ));
            }
            for entity in join.entities() {
                entity.check()?;
                if entity.alias.is_none() {
                    return Err(StructuralError::InvalidMatch(format!(
                        "entity '{}' in a join must have an alias",
                        entity.name
                    )));
                }
            }
            join.get_alias_mappings().map(|_| ())
        }
        Match::Subquery(inner) => validate_query(inner),
        Match::Storage(storage) => storage.check(),
    }
}

/// Expressions of one `select`/`groupby` list; aliases are unique per list.
fn validate_scope(clause: &str, exprs: &[Expr]) -> StructuralResult<()> {
    let mut aliases = HashSet::new();
    for expr in exprs {
        if matches!(expr, Expr::Identifier(_) | Expr::Lambda(_)) {
            return Err(StructuralError::InvalidQuery(format!(
                "{clause} clause cannot contain identifiers or lambdas outside a function"
            )));
        }
        validate_expr(expr)?;
        if let Some(alias) = expr.alias() {
            if !aliases.insert(alias) {
                return Err(StructuralError::InvalidQuery(format!(
                    "alias '{alias}' is used more than once in {clause}"
                )));
            }
        }
    }
    Ok(())
}

fn validate_column(column: &Column) -> StructuralResult<()> {
    if !is_valid_column_name(&column.name) {
        return Err(StructuralError::InvalidName {
            kind: "column",
            name: column.name.clone(),
        });
    }
    if let Some(entity) = &column.entity {
        entity.check()?;
        if entity.alias.is_none() {
            return Err(StructuralError::argument(
                format!("column {}", column.name),
                "expects an Entity with an alias",
            ));
        }
    }
    Ok(())
}

/// Check one expression and everything below it.
pub fn validate_expr(expr: &Expr) -> StructuralResult<()> {
    match expr {
        Expr::Column(column) => validate_column(column),
        Expr::Aliased(aliased) => {
            validate_column(&aliased.expr)?;
            if let Some(alias) = &aliased.alias {
                check_alias(&format!("aliased expression {}", aliased.expr.name), alias)?;
            }
            Ok(())
        }
        Expr::Scalar(scalar) => scalar.check(),
        Expr::Function(f) => {
            check_function_name(&f.name)?;
            if let Some(alias) = &f.alias {
                check_alias(&format!("function {}", f.name), alias)?;
            }
            check_parameters(&f.name, &f.parameters)?;
            f.parameters.iter().try_for_each(validate_expr)
        }
        Expr::CurriedFunction(f) => {
            check_function_name(&f.name)?;
            if let Some(alias) = &f.alias {
                check_alias(&format!("function {}", f.name), alias)?;
            }
            check_initializers(&f.name, &f.initializers)?;
            check_parameters(&f.name, &f.parameters)?;
            f.initializers.iter().try_for_each(validate_expr)?;
            f.parameters.iter().try_for_each(validate_expr)
        }
        Expr::Identifier(ident) => {
            if is_valid_identifier(&ident.name) {
                Ok(())
            } else {
                Err(StructuralError::InvalidName {
                    kind: "identifier",
                    name: ident.name.clone(),
                })
            }
        }
        Expr::Lambda(lambda) => {
            for ident in &lambda.identifiers {
                if !is_valid_identifier(ident) {
                    return Err(StructuralError::InvalidName {
                        kind: "identifier",
                        name: ident.clone(),
                    });
                }
            }
            if !matches!(*lambda.body, Expr::Function(_) | Expr::CurriedFunction(_)) {
                return Err(StructuralError::argument("lambda", "body must be a function"));
            }
            validate_expr(&lambda.body)
        }
    }
}

/// Check a condition tree; `AND`/`OR` groups need at least two members.
pub fn validate_condition_group(group: &ConditionGroup) -> StructuralResult<()> {
    match group {
        ConditionGroup::Condition(condition) => {
            condition.check()?;
            validate_expr(&condition.lhs)?;
            if let Some(rhs) = &condition.rhs {
                validate_expr(rhs)?;
            }
            Ok(())
        }
        ConditionGroup::Boolean(boolean) => {
            if boolean.conditions.len() < 2 {
                return Err(StructuralError::condition(
                    boolean.op.as_str(),
                    "must have at least two conditions",
                ));
            }
            boolean.conditions.iter().try_for_each(validate_condition_group)
        }
    }
}

/// Every column referenced anywhere in the outer clauses of a query.
pub(crate) fn query_columns(query: &Query) -> Vec<&Column> {
    let mut columns: Vec<&Column> = Vec::new();
    for expr in query.select().iter().chain(query.groupby()) {
        columns.extend(expr.columns());
    }
    columns.extend(query.array_join());
    for group in query.where_().iter().chain(query.having()) {
        columns.extend(group.columns());
    }
    for orderby in query.orderby() {
        columns.extend(orderby.expr.columns());
    }
    if let Some(limitby) = query.limitby() {
        columns.extend(&limitby.columns);
    }
    columns
}

/// In a join every column must name an alias bound to the same entity.
fn validate_join_columns(query: &Query, join: &Join) -> StructuralResult<()> {
    let mappings: BTreeMap<String, String> = join.get_alias_mappings()?;
    for column in query_columns(query) {
        let Some(entity) = &column.entity else {
            return Err(StructuralError::InvalidQuery(format!(
                "column '{}' must have a qualifying entity in a join",
                column.name
            )));
        };
        let alias = entity.alias.as_deref().unwrap_or_default();
        match mappings.get(alias) {
            None => {
                return Err(StructuralError::InvalidQuery(format!(
                    "column '{}' has an entity alias '{alias}' that is not in the join",
                    column.name
                )))
            }
            Some(name) if *name != entity.name => {
                return Err(StructuralError::InvalidQuery(format!(
                    "column '{}' has entity '{}' but alias '{alias}' is bound to '{name}'",
                    column.name, entity.name
                )))
            }
            Some(_) => {}
        }
    }
    Ok(())
}

/// The outer query may only reference columns the inner query selects.
fn validate_subquery_columns(query: &Query, inner: &Query) -> StructuralResult<()> {
    let mut visible: HashSet<&str> = HashSet::new();
    for expr in inner.select() {
        if let Some(alias) = expr.alias() {
            visible.insert(alias);
        }
        if let Expr::Column(c) = expr {
            visible.insert(&c.name);
        }
        if let Expr::Aliased(a) = expr {
            if a.alias.is_none() {
                visible.insert(&a.expr.name);
            }
        }
    }
    for column in query_columns(query) {
        if !visible.contains(column.name.as_str()) {
            return Err(StructuralError::InvalidQuery(format!(
                "outer query is referencing column '{}' that does not exist in the inner query",
                column.name
            )));
        }
    }
    Ok(())
}
