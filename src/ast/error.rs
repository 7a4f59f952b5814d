//! Structural errors raised while building or walking the node model.

use thiserror::Error;

/// A malformed node. The offending subtree has to be rebuilt; retrying is pointless.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StructuralError {
    #[error("{kind} '{name}' is empty or contains invalid characters")]
    InvalidName { kind: &'static str, name: String },

    #[error("alias '{alias}' of {node} contains invalid characters")]
    InvalidAlias { node: String, alias: String },

    #[error("{node}: {message}")]
    InvalidArgument { node: String, message: String },

    #[error("invalid array with {0}: arrays must have the same data type or NULL, perhaps use a tuple instead")]
    InvalidArray(String),

    #[error("invalid delete query: {0}")]
    InvalidDeleteQuery(String),

    #[error("invalid condition '{node}': {message}")]
    InvalidCondition { node: String, message: String },

    #[error("invalid entity '{name}': {message}")]
    InvalidEntity { name: String, message: String },

    #[error("invalid match clause: {0}")]
    InvalidMatch(String),

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("invalid storage '{name}': {message}")]
    InvalidStorage { name: String, message: String },
}

pub type StructuralResult<T> = Result<T, StructuralError>;

impl StructuralError {
    pub(crate) fn argument(node: impl Into<String>, message: impl Into<String>) -> Self {
        StructuralError::InvalidArgument {
            node: node.into(),
            message: message.into(),
        }
    }

    pub(crate) fn condition(node: impl Into<String>, message: impl Into<String>) -> Self {
        StructuralError::InvalidCondition {
            node: node.into(),
            message: message.into(),
        }
    }
}
