//! Request envelope sent to the engine: dataset, app id, flags and the query.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use super::delete_query::DeleteQuery;
use super::query::Query;
use crate::metrics::{MetricsError, MetricsQuery};
use crate::validation::ValidationError;

static FLAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_.+*/:\-\[\]]*$").unwrap());

pub const DEFAULT_PARENT_API: &str = "<unknown>";

#[derive(Debug, Error)]
pub enum RequestError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("invalid flag '{0}'")]
    InvalidFlag(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Metrics(#[from] MetricsError),

    #[error("failed to serialize request: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub type RequestResult<T> = Result<T, RequestError>;

// =============================================================================
// Flags
// =============================================================================

/// Engine flags. Unset flags are left out of the wire body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Flags {
    pub totals: Option<bool>,
    pub consistent: Option<bool>,
    pub turbo: Option<bool>,
    pub debug: Option<bool>,
    pub dry_run: Option<bool>,
    pub legacy: Option<bool>,
}

impl Flags {
    pub const NAMES: [&'static str; 6] = ["totals", "consistent", "turbo", "debug", "dry_run", "legacy"];

    /// Set a flag by name. Unknown names are rejected.
    pub fn set(&self, name: &str, value: bool) -> RequestResult<Flags> {
        let mut flags = self.clone();
        let slot = match name {
            "totals" => &mut flags.totals,
            "consistent" => &mut flags.consistent,
            "turbo" => &mut flags.turbo,
            "debug" => &mut flags.debug,
            "dry_run" => &mut flags.dry_run,
            "legacy" => &mut flags.legacy,
            _ => return Err(RequestError::InvalidFlag(name.to_string())),
        };
        *slot = Some(value);
        Ok(flags)
    }

    /// The flags that are set, keyed by name.
    pub fn to_map(&self) -> BTreeMap<&'static str, bool> {
        let values = [
            self.totals,
            self.consistent,
            self.turbo,
            self.debug,
            self.dry_run,
            self.legacy,
        ];
        Flags::NAMES
            .into_iter()
            .zip(values)
            .filter_map(|(name, value)| value.map(|v| (name, v)))
            .collect()
    }
}

// =============================================================================
// Request
// =============================================================================

/// A tenant id value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TenantId {
    Int(i64),
    String(String),
}

impl From<i64> for TenantId {
    fn from(n: i64) -> Self {
        TenantId::Int(n)
    }
}

impl From<&str> for TenantId {
    fn from(s: &str) -> Self {
        TenantId::String(s.to_string())
    }
}

/// What a request carries: a read over events or metrics, or a delete.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestQuery {
    Events(Query),
    Metrics(MetricsQuery),
    Delete(DeleteQuery),
}

impl From<Query> for RequestQuery {
    fn from(q: Query) -> Self {
        RequestQuery::Events(q)
    }
}

impl From<DeleteQuery> for RequestQuery {
    fn from(q: DeleteQuery) -> Self {
        RequestQuery::Delete(q)
    }
}

impl From<MetricsQuery> for RequestQuery {
    fn from(q: MetricsQuery) -> Self {
        RequestQuery::Metrics(q)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub dataset: String,
    pub app_id: String,
    pub query: RequestQuery,
    pub flags: Flags,
    pub parent_api: String,
    pub tenant_ids: BTreeMap<String, TenantId>,
}

impl Request {
    pub fn new(dataset: &str, app_id: &str, query: impl Into<RequestQuery>) -> Self {
        Self {
            dataset: dataset.to_string(),
            app_id: app_id.to_string(),
            query: query.into(),
            flags: Flags::default(),
            parent_api: DEFAULT_PARENT_API.to_string(),
            tenant_ids: BTreeMap::new(),
        }
    }

    pub fn with_flags(self, flags: Flags) -> Self {
        Self { flags, ..self }
    }

    pub fn with_parent_api(self, parent_api: &str) -> Self {
        Self {
            parent_api: parent_api.to_string(),
            ..self
        }
    }

    pub fn with_tenant_id(mut self, key: &str, value: impl Into<TenantId>) -> Self {
        self.tenant_ids.insert(key.to_string(), value.into());
        self
    }

    /// Validate the envelope and the query it carries.
    pub fn validate(&self) -> RequestResult<()> {
        check_name("dataset", &self.dataset)?;
        check_name("app_id", &self.app_id)?;
        if self.parent_api.is_empty() {
            return Err(RequestError::InvalidRequest(
                "parent_api must be a non-empty string".to_string(),
            ));
        }
        match &self.query {
            RequestQuery::Events(q) => q.validate()?,
            RequestQuery::Metrics(q) => q.validate()?,
            RequestQuery::Delete(q) => q.validate().map_err(ValidationError::from)?,
        }
        Ok(())
    }

    /// The wire body: set flags, then the query and the envelope fields.
    pub fn to_map(&self) -> RequestResult<Map<String, Value>> {
        let mut body = Map::new();
        for (name, value) in self.flags.to_map() {
            body.insert(name.to_string(), Value::Bool(value));
        }
        let query = match &self.query {
            RequestQuery::Events(q) => Value::String(q.serialize()),
            RequestQuery::Metrics(q) => q.serialize_to_mql()?,
            RequestQuery::Delete(q) => q.serialize().map_err(ValidationError::from)?,
        };
        body.insert("query".to_string(), query);
        body.insert("dataset".to_string(), Value::String(self.dataset.clone()));
        body.insert("app_id".to_string(), Value::String(self.app_id.clone()));
        body.insert("tenant_ids".to_string(), serde_json::to_value(&self.tenant_ids)?);
        body.insert("parent_api".to_string(), Value::String(self.parent_api.clone()));
        Ok(body)
    }

    /// Validate, then render the JSON body sent to the engine.
    pub fn serialize(&self) -> RequestResult<String> {
        self.validate()?;
        tracing::debug!(dataset = %self.dataset, app_id = %self.app_id, "serializing request");
        Ok(serde_json::to_string(&self.to_map()?)?)
    }

    /// Pretty JSON with sorted keys, for logs and debugging.
    pub fn print(&self) -> RequestResult<String> {
        Ok(serde_json::to_string_pretty(&self.to_map()?)?)
    }
}

fn check_name(field: &str, value: &str) -> RequestResult<()> {
    if value.is_empty() {
        return Err(RequestError::InvalidRequest(format!(
            "{field} must be a non-empty string"
        )));
    }
    if !FLAG_RE.is_match(value) {
        return Err(RequestError::InvalidRequest(format!(
            "{field} '{value}' contains invalid characters"
        )));
    }
    Ok(())
}
