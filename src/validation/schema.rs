//! Schema validation against a caller-supplied entity model.
//!
//! Only conditions that always hold count towards a requirement: top-level
//! `where` entries and members of nested `AND` groups. A condition inside an
//! `OR` cannot guarantee its column is filtered, so it never satisfies one.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ast::condition::{get_first_level_and_conditions, Condition, ConditionGroup, Op};
use crate::ast::expr::Column;

// =============================================================================
// Model
// =============================================================================

/// A column an entity exposes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnModel {
    pub name: String,
    #[serde(default)]
    pub required: bool,
}

impl ColumnModel {
    pub fn new(name: &str, required: bool) -> Self {
        Self {
            name: name.to_string(),
            required,
        }
    }
}

/// The static schema of one entity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityModel {
    pub columns: Vec<ColumnModel>,
    /// Must be bounded by both a `>=` and a `<` condition.
    #[serde(default)]
    pub required_time_column: Option<String>,
}

impl EntityModel {
    pub fn new(columns: Vec<ColumnModel>, required_time_column: Option<&str>) -> Self {
        Self {
            columns,
            required_time_column: required_time_column.map(str::to_string),
        }
    }

    pub fn required_columns(&self) -> impl Iterator<Item = &str> {
        self.columns
            .iter()
            .filter(|c| c.required)
            .map(|c| c.name.as_str())
    }

    /// Whether `name` (or the outer part of `name[key]`) is a known column.
    pub fn contains(&self, column: &Column) -> bool {
        let outer = column.subscriptable();
        self.required_time_column.as_deref() == Some(column.name.as_str())
            || self
                .columns
                .iter()
                .any(|c| c.name == column.name || c.name == outer)
    }

    fn has_requirements(&self) -> bool {
        self.required_time_column.is_some() || self.columns.iter().any(|c| c.required)
    }

    /// Check the required filters of a `where` clause. Every missing
    /// requirement is reported, not just the first.
    pub fn check_required(
        &self,
        conditions: &[ConditionGroup],
        entity_alias: Option<&str>,
    ) -> Vec<SchemaViolation> {
        if conditions.is_empty() {
            return if self.has_requirements() {
                vec![SchemaViolation::EmptyWhere]
            } else {
                Vec::new()
            };
        }

        let top_level = get_first_level_and_conditions(conditions);
        let on_column = |name: &str, ops: &[Op]| {
            top_level
                .iter()
                .any(|c| ops.contains(&c.op) && targets(c, name, entity_alias))
        };

        let mut violations = Vec::new();

        let missing: BTreeSet<String> = self
            .required_columns()
            .filter(|name| !on_column(*name, &[Op::Eq, Op::In]))
            .map(str::to_string)
            .collect();
        if !missing.is_empty() {
            violations.push(SchemaViolation::MissingRequiredColumns(
                missing.into_iter().collect(),
            ));
        }

        if let Some(time) = &self.required_time_column {
            let ops: Vec<Op> = [Op::Gte, Op::Lt]
                .into_iter()
                .filter(|op| !on_column(time.as_str(), &[*op]))
                .collect();
            if !ops.is_empty() {
                violations.push(SchemaViolation::MissingTimeBounds {
                    column: time.clone(),
                    ops,
                });
            }
        }

        violations
    }
}

/// Check only the required filters of a `where` clause, without a query around it.
/// The error is labelled with the alias, or `entity` when there is none.
pub fn validate_required_columns(
    conditions: &[ConditionGroup],
    model: &EntityModel,
    entity_alias: Option<&str>,
) -> Result<(), SchemaError> {
    let violations = model.check_required(conditions, entity_alias);
    if violations.is_empty() {
        return Ok(());
    }
    Err(SchemaError {
        entity: entity_alias.unwrap_or("entity").to_string(),
        violations,
    })
}

/// Whether the condition filters `name` for the entity under validation.
fn targets(condition: &Condition, name: &str, entity_alias: Option<&str>) -> bool {
    let Some(column) = condition.lhs_column() else {
        return false;
    };
    if column.name != name {
        return false;
    }
    match (&column.entity, entity_alias) {
        (None, _) => true,
        (Some(entity), alias) => entity.alias.as_deref() == alias,
    }
}

// =============================================================================
// Errors
// =============================================================================

/// One unmet schema requirement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaViolation {
    /// The model has requirements but the query has no `where` at all.
    EmptyWhere,
    MissingRequiredColumns(Vec<String>),
    MissingTimeBounds { column: String, ops: Vec<Op> },
    UnknownColumns(Vec<String>),
}

fn quoted(names: &[String]) -> String {
    names
        .iter()
        .map(|n| format!("'{n}'"))
        .collect::<Vec<_>>()
        .join(", ")
}

impl fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaViolation::EmptyWhere => f.write_str("where clause is missing required columns"),
            SchemaViolation::MissingRequiredColumns(columns) => write!(
                f,
                "where clause is missing required condition(s) on column(s) {}",
                quoted(columns)
            ),
            SchemaViolation::MissingTimeBounds { column, ops } => write!(
                f,
                "where clause is missing required {} condition(s) on column '{}'",
                ops.iter().map(Op::as_str).collect::<Vec<_>>().join(", "),
                column
            ),
            SchemaViolation::UnknownColumns(columns) => {
                write!(f, "unknown column(s) {}", quoted(columns))
            }
        }
    }
}

/// Every schema violation found for one query, reported together.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{entity}: {}", .violations.iter().map(ToString::to_string).collect::<Vec<_>>().join("; "))]
pub struct SchemaError {
    pub entity: String,
    pub violations: Vec<SchemaViolation>,
}

impl SchemaError {
    /// All missing required column names across violations.
    pub fn missing_columns(&self) -> Vec<&str> {
        self.violations
            .iter()
            .filter_map(|v| match v {
                SchemaViolation::MissingRequiredColumns(cols) => Some(cols),
                _ => None,
            })
            .flatten()
            .map(String::as_str)
            .collect()
    }
}
