//! Storages: the physical tables behind entities, addressable directly as a
//! `MATCH` target or as the target of a delete.

use std::hash::{Hash, Hasher};
use std::sync::{Arc, LazyLock};

use regex::Regex;

use super::error::{StructuralError, StructuralResult};
use crate::validation::schema::EntityModel;

static STORAGE_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z_]+$").unwrap());

pub fn is_valid_storage_name(name: &str) -> bool {
    STORAGE_NAME_RE.is_match(name)
}

/// `STORAGE(name SAMPLE rate)`. Unlike an entity, a storage has no alias and
/// so cannot take part in a join.
#[derive(Debug, Clone, PartialEq)]
pub struct Storage {
    pub name: String,
    /// Any positive rate or row count.
    pub sample: Option<f64>,
    pub data_model: Option<Arc<EntityModel>>,
}

impl Storage {
    pub fn new(name: &str) -> StructuralResult<Self> {
        let storage = Self {
            name: name.to_string(),
            sample: None,
            data_model: None,
        };
        storage.check()?;
        Ok(storage)
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
        if !is_valid_storage_name(&self.name) {
            return Err(StructuralError::InvalidName {
                kind: "storage",
                name: self.name.clone(),
            });
        }
        if let Some(sample) = self.sample {
            if !(sample.is_finite() && sample > 0.0) {
                return Err(StructuralError::InvalidStorage {
                    name: self.name.clone(),
                    message: format!("sample {sample} must be greater than 0.0"),
                });
            }
        }
        Ok(())
    }
}

impl Eq for Storage {}

impl Hash for Storage {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.sample.map(f64::to_bits).hash(state);
        self.data_model.hash(state);
    }
}
