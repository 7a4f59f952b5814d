//! Query validation.
//!
//! Two passes, both explicit and both pure:
//! - `structural`: shape and syntax of the tree, independent of any schema
//! - `schema`: required filters and known columns against an `EntityModel`
//!
//! Builders never validate implicitly, so a chain of `set_*` calls may pass
//! through invalid intermediate states.

pub mod schema;
pub mod structural;

use std::collections::HashSet;

use thiserror::Error;

use crate::ast::entity::{Entity, Match};
use crate::ast::error::StructuralError;
use crate::ast::query::Query;
use schema::{SchemaError, SchemaViolation};

pub use schema::{ColumnModel, EntityModel};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error(transparent)]
    Structural(#[from] StructuralError),

    #[error(transparent)]
    Schema(#[from] SchemaError),
}

pub type ValidationResult<T> = Result<T, ValidationError>;

impl Query {
    /// Structural validation followed by schema validation.
    pub fn validate(&self) -> ValidationResult<()> {
        self.validate_structure()?;
        self.validate_schema()?;
        Ok(())
    }

    pub fn validate_structure(&self) -> Result<(), StructuralError> {
        tracing::debug!("validating query structure");
        structural::validate_query(self)
    }

    /// Check the query against the data models attached to its entities.
    /// Entities without a model are skipped.
    pub fn validate_schema(&self) -> Result<(), SchemaError> {
        let result = validate_schema(self);
        if let Err(err) = &result {
            tracing::warn!(error = %err, "schema validation failed");
        }
        result
    }
}

/// Collect the violations of every modelled entity in the query into one error.
pub fn validate_schema(query: &Query) -> Result<(), SchemaError> {
    let mut failing: Vec<String> = Vec::new();
    let mut violations: Vec<SchemaViolation> = Vec::new();

    match query.match_() {
        Match::Entity(entity) => {
            check_entity(query, entity, &mut failing, &mut violations);
        }
        Match::Join(join) => {
            let mut seen = HashSet::new();
            for entity in join.entities() {
                if seen.insert(entity.alias.clone()) {
                    check_entity(query, entity, &mut failing, &mut violations);
                }
            }
        }
        Match::Storage(storage) => {
            if let Some(model) = &storage.data_model {
                tracing::debug!(storage = %storage.name, "validating query against storage model");
                check_model(query, &storage.name, None, model, &mut failing, &mut violations);
            }
        }
        Match::Subquery(inner) => {
            if let Err(err) = validate_schema(inner) {
                failing.push(err.entity);
                violations.extend(err.violations);
            }
        }
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(SchemaError {
            entity: failing.join(", "),
            violations,
        })
    }
}

fn check_entity(
    query: &Query,
    entity: &Entity,
    failing: &mut Vec<String>,
    violations: &mut Vec<SchemaViolation>,
) {
    let Some(model) = &entity.data_model else {
        return;
    };
    tracing::debug!(entity = %entity.name, "validating query against entity model");
    check_model(query, &entity.name, entity.alias.as_deref(), model, failing, violations);
}

fn check_model(
    query: &Query,
    name: &str,
    alias: Option<&str>,
    model: &EntityModel,
    failing: &mut Vec<String>,
    violations: &mut Vec<SchemaViolation>,
) {
    let before = violations.len();
    violations.extend(model.check_required(query.where_(), alias));
    check_unknown_columns(query, alias, model, violations);

    if violations.len() > before {
        failing.push(name.to_string());
    }
}

/// Columns of this entity or storage that the model does not declare. Names
/// bound by a `select`/`groupby` alias are output columns, not entity columns.
fn check_unknown_columns(
    query: &Query,
    alias: Option<&str>,
    model: &EntityModel,
    violations: &mut Vec<SchemaViolation>,
) {
    let output_aliases: HashSet<&str> = query
        .select()
        .iter()
        .chain(query.groupby())
        .filter_map(|e| e.alias())
        .collect();

    let mut unknown: Vec<String> = structural::query_columns(query)
        .into_iter()
        .filter(|c| match &c.entity {
            None => true,
            Some(e) => e.alias.as_deref() == alias,
        })
        .filter(|c| !output_aliases.contains(c.name.as_str()) && !model.contains(c))
        .map(|c| c.name.clone())
        .collect();
    unknown.sort();
    unknown.dedup();

    if !unknown.is_empty() {
        violations.push(SchemaViolation::UnknownColumns(unknown));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::condition::{Condition, Op};
    use crate::ast::expr::{col, func_as, Column, Expr};
    use std::sync::Arc;

    fn model() -> Arc<EntityModel> {
        Arc::new(EntityModel::new(
            vec![ColumnModel::new("project_id", true), ColumnModel::new("title", false)],
            Some("timestamp"),
        ))
    }

    fn cond(name: &str, op: Op, rhs: Expr) -> crate::ast::condition::ConditionGroup {
        Condition::binary(Column::new(name).unwrap(), op, rhs).unwrap().into()
    }

    fn query() -> Query {
        Query::new(Entity::new("events").unwrap().with_data_model(model()))
            .set_select(vec![col("title").unwrap()])
            .unwrap()
    }

    #[test]
    fn test_entity_without_model_is_skipped() {
        let q = Query::new(Entity::new("events").unwrap())
            .set_select(vec![col("anything").unwrap()])
            .unwrap();
        assert!(q.validate().is_ok());
    }

    #[test]
    fn test_unknown_columns_collected() {
        let q = query()
            .set_select(vec![col("title").unwrap(), col("bogus").unwrap()])
            .unwrap()
            .set_where(vec![
                cond("project_id", Op::Eq, Expr::lit(1)),
                cond("timestamp", Op::Gte, Expr::lit(1)),
                cond("timestamp", Op::Lt, Expr::lit(2)),
                cond("other", Op::Eq, Expr::lit(1)),
            ]);
        let err = q.validate_schema().unwrap_err();
        assert_eq!(
            err.violations,
            vec![SchemaViolation::UnknownColumns(vec!["bogus".to_string(), "other".to_string()])]
        );
    }

    #[test]
    fn test_output_alias_is_not_unknown() {
        let q = query()
            .set_select(vec![func_as("count", vec![], "total").unwrap()])
            .unwrap()
            .set_where(vec![
                cond("project_id", Op::Eq, Expr::lit(1)),
                cond("timestamp", Op::Gte, Expr::lit(1)),
                cond("timestamp", Op::Lt, Expr::lit(2)),
            ])
            .set_orderby(vec![crate::ast::query::OrderBy::desc(col("total").unwrap()).unwrap()]);
        assert!(q.validate().is_ok());
    }

    #[test]
    fn test_structural_error_comes_first() {
        let q = Query::new(Entity::new("events").unwrap().with_data_model(model()));
        assert!(matches!(q.validate(), Err(ValidationError::Structural(_))));
    }
}
