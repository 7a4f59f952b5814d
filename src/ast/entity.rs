//! The `MATCH` target: a single entity, a join graph, a subquery or a storage.

use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, LazyLock};

use regex::Regex;

use super::error::{StructuralError, StructuralResult};
use super::expr::is_valid_identifier;
use super::query::Query;
use super::storage::Storage;
use crate::validation::schema::EntityModel;

static ENTITY_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_.]*$").unwrap());

/// A queryable entity, e.g. `events` or `transactions`.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub name: String,
    pub alias: Option<String>,
    /// A rate in `(0, 1]`, or an absolute row count above 1.
    pub sample: Option<f64>,
    /// Schema used by `Query::validate_schema`.
    pub data_model: Option<Arc<EntityModel>>,
}

impl Entity {
    pub fn new(name: &str) -> StructuralResult<Self> {
        let entity = Self {
            name: name.to_string(),
            alias: None,
            sample: None,
            data_model: None,
        };
        entity.check()?;
        Ok(entity)
    }

    pub fn with_alias(mut self, alias: &str) -> StructuralResult<Self> {
        self.alias = Some(alias.to_string());
        self.check()?;
        Ok(self)
    }

    pub fn with_sample(mut self, sample: f64) -> StructuralResult<Self> {
        self.sample = Some(sample);
        self.check()?;
        Ok(self)
    }

    pub fn with_data_model(mut self, model: Arc<EntityModel>) -> Self {
        self.data_model = Some(model);
        self
    }

    pub fn check(&self) -> StructuralResult<()> {
        if !ENTITY_NAME_RE.is_match(&self.name) {
            return Err(StructuralError::InvalidName {
                kind: "entity",
                name: self.name.clone(),
            });
        }
        if let Some(alias) = &self.alias {
            if !is_valid_identifier(alias) {
                return Err(StructuralError::InvalidEntity {
                    name: self.name.clone(),
                    message: format!("alias '{alias}' contains invalid characters"),
                });
            }
        }
        if let Some(sample) = self.sample {
            let valid = sample.is_finite()
                && sample > 0.0
                && (sample <= 1.0 || sample.fract() == 0.0);
            if !valid {
                return Err(StructuralError::InvalidEntity {
                    name: self.name.clone(),
                    message: format!(
                        "sample {sample} must be a rate between 0 and 1 or an integer greater than 1"
                    ),
                });
            }
        }
        Ok(())
    }
}

impl Eq for Entity {}

impl Hash for Entity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.alias.hash(state);
        self.sample.map(f64::to_bits).hash(state);
        self.data_model.hash(state);
    }
}

/// `(lhs_alias: lhs) -[name]-> (rhs_alias: rhs)`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Relationship {
    pub lhs: Entity,
    pub name: String,
    pub rhs: Entity,
}

impl Relationship {
    pub fn new(lhs: Entity, name: &str, rhs: Entity) -> StructuralResult<Self> {
        if !is_valid_identifier(name) {
            return Err(StructuralError::InvalidName {
                kind: "relationship",
                name: name.to_string(),
            });
        }
        for entity in [&lhs, &rhs] {
            if entity.alias.is_none() {
                return Err(StructuralError::InvalidEntity {
                    name: entity.name.clone(),
                    message: format!("relationship '{name}' requires an aliased entity"),
                });
            }
        }
        Ok(Self {
            lhs,
            name: name.to_string(),
            rhs,
        })
    }
}

/// A join graph made of one or more relationships.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Join {
    pub relationships: Vec<Relationship>,
}

impl Join {
    pub fn new(relationships: Vec<Relationship>) -> StructuralResult<Self> {
        if relationships.is_empty() {
            return Err(StructuralError::InvalidMatch(
                "join must have at least one relationship".to_string(),
            ));
        }
        let join = Self { relationships };
        join.get_alias_mappings()?;
        Ok(join)
    }

    /// Alias to entity name. An alias bound to two different entities is an error.
    pub fn get_alias_mappings(&self) -> StructuralResult<BTreeMap<String, String>> {
        let mut aliases = BTreeMap::new();
        for entity in self.entities() {
            let Some(alias) = &entity.alias else {
                continue;
            };
            if let Some(existing) = aliases.insert(alias.clone(), entity.name.clone()) {
                if existing != entity.name {
                    return Err(StructuralError::InvalidMatch(format!(
                        "alias '{alias}' is bound to both '{existing}' and '{}'",
                        entity.name
                    )));
                }
            }
        }
        Ok(aliases)
    }

    /// Every entity in the join, in relationship order, duplicates included.
    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.relationships.iter().flat_map(|r| [&r.lhs, &r.rhs])
    }
}

/// What a query reads from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Match {
    Entity(Entity),
    Join(Join),
    Subquery(Arc<Query>),
    Storage(Storage),
}

impl From<Entity> for Match {
    fn from(e: Entity) -> Self {
        Match::Entity(e)
    }
}

impl From<Join> for Match {
    fn from(j: Join) -> Self {
        Match::Join(j)
    }
}

impl From<Storage> for Match {
    fn from(s: Storage) -> Self {
        Match::Storage(s)
    }
}

impl From<Query> for Match {
    fn from(q: Query) -> Self {
        Match::Subquery(Arc::new(q))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aliased(name: &str, alias: &str) -> Entity {
        Entity::new(name).unwrap().with_alias(alias).unwrap()
    }

    #[test]
    fn test_entity_validation() {
        assert!(Entity::new("events").is_ok());
        assert!(Entity::new("generic_metrics_sets").is_ok());
        assert!(Entity::new("").is_err());
        assert!(Entity::new("ev ents").is_err());
        assert!(Entity::new("events").unwrap().with_alias("e-1").is_err());
    }

    #[test]
    fn test_entity_sample() {
        let e = Entity::new("events").unwrap();
        assert!(e.clone().with_sample(0.1).is_ok());
        assert!(e.clone().with_sample(1000.0).is_ok());
        assert!(e.clone().with_sample(0.0).is_err());
        assert!(e.clone().with_sample(-1.0).is_err());
        assert!(e.with_sample(10.5).is_err());
    }

    #[test]
    fn test_relationship_requires_aliases() {
        let unaliased = Entity::new("events").unwrap();
        assert!(Relationship::new(unaliased, "grouped", aliased("groupedmessage", "g")).is_err());
        assert!(Relationship::new(aliased("events", "e"), "grouped", aliased("groupedmessage", "g")).is_ok());
    }

    #[test]
    fn test_join_alias_conflict() {
        let r1 = Relationship::new(aliased("events", "e"), "grouped", aliased("groupedmessage", "g")).unwrap();
        let r2 = Relationship::new(aliased("events", "e"), "assigned", aliased("groupassignee", "a")).unwrap();
        let join = Join::new(vec![r1.clone(), r2]).unwrap();
        let mappings = join.get_alias_mappings().unwrap();
        assert_eq!(mappings.get("e").map(String::as_str), Some("events"));
        assert_eq!(mappings.len(), 3);

        let conflicting =
            Relationship::new(aliased("sessions", "e"), "other", aliased("groupassignee", "a")).unwrap();
        assert!(Join::new(vec![r1, conflicting]).is_err());
        assert!(Join::new(vec![]).is_err());
    }
}
