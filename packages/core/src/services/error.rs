//! Service Layer Error Types
//!
//! `GraphError` is the error every public graph operation returns. Callers
//! branch on the kind:
//!
//! - `NodeNotFound` / `EdgeNotFound`: a referenced entity is absent
//! - `Validation`: the request is structurally invalid
//! - `NodeWrite`: a node row could not be written
//! - `Transaction`: begin/commit/rollback failed, or a storage fault
//!   aborted a transaction (the fault is kept as `source()`)
//! - `Database`: any other storage fault

use crate::db::DatabaseError;
use thiserror::Error;

/// Graph operation errors
#[derive(Error, Debug)]
pub enum GraphError {
    /// Node not found by ID
    #[error("Node not found: {id}")]
    NodeNotFound { id: String },

    /// Edge not found by ID
    #[error("Edge not found: {id}")]
    EdgeNotFound { id: String },

    /// Structurally invalid request
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Writing a node row failed
    #[error("Failed to write node {id}: {source}")]
    NodeWrite {
        id: String,
        #[source]
        source: DatabaseError,
    },

    /// Transaction lifecycle failure
    #[error("Transaction failed: {context}")]
    Transaction {
        context: String,
        #[source]
        source: Option<Box<GraphError>>,
    },

    /// Database operation failed
    #[error("Database operation failed: {0}")]
    Database(#[from] DatabaseError),

    /// Stored or supplied JSON could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl GraphError {
    /// Create a node not found error
    pub fn node_not_found(id: impl Into<String>) -> Self {
        Self::NodeNotFound { id: id.into() }
    }

    /// Create an edge not found error
    pub fn edge_not_found(id: impl Into<String>) -> Self {
        Self::EdgeNotFound { id: id.into() }
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a node write error
    pub fn node_write(id: impl Into<String>, source: DatabaseError) -> Self {
        Self::NodeWrite {
            id: id.into(),
            source,
        }
    }

    /// Create a transaction error caused by `source`
    pub fn transaction(context: impl Into<String>, source: GraphError) -> Self {
        Self::Transaction {
            context: context.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a serialization error
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Errors that reach the caller unwrapped, even out of a rolled back
    /// transaction
    pub fn is_caller_facing(&self) -> bool {
        matches!(
            self,
            Self::NodeNotFound { .. }
                | Self::EdgeNotFound { .. }
                | Self::Validation(_)
                | Self::NodeWrite { .. }
                | Self::Transaction { .. }
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NodeNotFound { .. } | Self::EdgeNotFound { .. })
    }
}

impl From<serde_json::Error> for GraphError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
