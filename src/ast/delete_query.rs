//! Deletes: remove every row of a storage that matches all column conditions.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::{StructuralError, StructuralResult};
use super::storage::is_valid_storage_name;

/// A value a deleted row's column may hold.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColumnValue {
    Int(i64),
    String(String),
}

impl From<i64> for ColumnValue {
    fn from(n: i64) -> Self {
        ColumnValue::Int(n)
    }
}

impl From<&str> for ColumnValue {
    fn from(s: &str) -> Self {
        ColumnValue::String(s.to_string())
    }
}

/// `{"id": [1, 2], "status": ["failed"]}` deletes the rows where
/// `id IN (1, 2) AND status = 'failed'`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteQuery {
    pub storage_name: String,
    pub column_conditions: BTreeMap<String, Vec<ColumnValue>>,
}

impl DeleteQuery {
    pub fn new(storage_name: &str) -> Self {
        Self {
            storage_name: storage_name.to_string(),
            column_conditions: BTreeMap::new(),
        }
    }

    /// Add (or replace) the values allowed for one column.
    pub fn with_condition<V: Into<ColumnValue>>(
        mut self,
        column: &str,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.column_conditions
            .insert(column.to_string(), values.into_iter().map(Into::into).collect());
        self
    }

    /// An unconditioned delete would empty the whole storage, so at least one
    /// column with at least one value is required.
    pub fn validate(&self) -> StructuralResult<()> {
        if !is_valid_storage_name(&self.storage_name) {
            return Err(StructuralError::InvalidName {
                kind: "storage",
                name: self.storage_name.clone(),
            });
        }
        if self.column_conditions.is_empty() {
            return Err(StructuralError::InvalidDeleteQuery(
                "column conditions cannot be empty".to_string(),
            ));
        }
        if let Some((column, _)) = self.column_conditions.iter().find(|(_, v)| v.is_empty()) {
            return Err(StructuralError::InvalidDeleteQuery(format!(
                "column condition '{column}' cannot be empty"
            )));
        }
        Ok(())
    }

    /// Validate, then build the request body `{"columns": {...}}`.
    pub fn serialize(&self) -> StructuralResult<Value> {
        self.validate()?;
        tracing::debug!(storage = %self.storage_name, "serializing delete query");
        Ok(serde_json::json!({ "columns": self.column_conditions }))
    }
}

impl fmt::Display for DeleteQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let columns = serde_json::to_string(&self.column_conditions).map_err(|_| fmt::Error)?;
        write!(f, "DELETE FROM {} WHERE {}", self.storage_name, columns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn search_issues() -> DeleteQuery {
        DeleteQuery::new("search_issues")
            .with_condition("project_id", [1])
            .with_condition("occurrence_id", ["1234"])
    }

    #[test]
    fn test_serialize_body() {
        let body = search_issues().serialize().unwrap();
        assert_eq!(
            body,
            serde_json::json!({"columns": {"project_id": [1], "occurrence_id": ["1234"]}})
        );
    }

    #[test]
    fn test_conditions_required() {
        let err = DeleteQuery::new("search_issues").serialize().unwrap_err();
        assert_eq!(err.to_string(), "invalid delete query: column conditions cannot be empty");

        let empty_values = search_issues().with_condition("group_id", Vec::<i64>::new());
        let err = empty_values.validate().unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid delete query: column condition 'group_id' cannot be empty"
        );
    }

    #[test]
    fn test_storage_name_checked() {
        let q = DeleteQuery::new("non-real-storage").with_condition("project_id", [1]);
        assert!(matches!(
            q.validate(),
            Err(StructuralError::InvalidName { kind: "storage", .. })
        ));
    }

    #[test]
    fn test_display() {
        insta::assert_snapshot!(
            search_issues().to_string(),
            @r#"DELETE FROM search_issues WHERE {"occurrence_id":["1234"],"project_id":[1]}"#
        );
    }
}
