//! The parts of a metrics query that MQL text cannot express.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::query::MetricsScope;

/// An indexer mapping value: a resolved id or a string name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IndexerValue {
    Int(i64),
    String(String),
}

impl From<i64> for IndexerValue {
    fn from(n: i64) -> Self {
        IndexerValue::Int(n)
    }
}

impl From<&str> for IndexerValue {
    fn from(s: &str) -> Self {
        IndexerValue::String(s.to_string())
    }
}

/// Wire form of a rollup. `with_totals` is the string `"True"`/`"False"`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollupContext {
    pub orderby: Option<String>,
    pub granularity: Option<u32>,
    pub interval: Option<u32>,
    pub with_totals: Option<String>,
}

/// Sent next to the MQL text; together they describe the whole query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MqlContext {
    pub start: String,
    pub end: String,
    pub rollup: RollupContext,
    pub scope: MetricsScope,
    pub limit: Option<u32>,
    pub offset: Option<u64>,
    #[serde(default)]
    pub indexer_mappings: BTreeMap<String, IndexerValue>,
}
