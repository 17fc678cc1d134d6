//! Node Data Structures
//!
//! This module defines the `Node` struct and the request types used to create
//! and update nodes.
//!
//! # Label independence
//!
//! Several nodes may share a label. At most one of them is the *independent*
//! (canonical) holder of that label; the others are non-independent
//! duplicates. The repository maintains this bookkeeping on every write, so
//! `is_independent` on a `NewNode` / `NodeUpdate` is only set when the caller
//! wants to override the computed value.
//!
//! # Examples
//!
//! ```rust
//! use relgraph_core::models::NewNode;
//! use serde_json::json;
//!
//! let person = NewNode::new("Person", "Ada Lovelace")
//!     .with_property("born", json!(1815))
//!     .with_property("field", json!("mathematics"));
//! assert!(person.id.is_none());
//! ```

use crate::models::{Properties, RELATIONSHIP_TYPE};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A stored node
///
/// Serialized with the field names of the JSON exchange format
/// (`type`, `label`, `is_independent`, `created_at`, `updated_at`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Unique identifier (UUID unless supplied by the caller)
    pub id: String,

    /// Node type (e.g., "Person", "Document")
    #[serde(rename = "type")]
    pub node_type: String,

    /// Human-readable label
    pub label: String,

    /// Arbitrary JSON attributes
    #[serde(default)]
    pub properties: Properties,

    /// Canonical holder of `label` among same-label nodes
    #[serde(default)]
    pub is_independent: bool,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,

    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Node {
    /// Whether this node encodes a structured relationship
    pub fn is_relationship_node(&self) -> bool {
        self.node_type == RELATIONSHIP_TYPE
    }

    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }
}

/// Parameters for creating a node
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewNode {
    /// Optional ID. If None, a UUID v4 is generated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(rename = "type")]
    pub node_type: String,

    pub label: String,

    #[serde(default)]
    pub properties: Properties,

    /// Explicit independence; computed from the label group when None
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_independent: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl NewNode {
    pub fn new(node_type: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            node_type: node_type.into(),
            label: label.into(),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_properties(mut self, properties: Properties) -> Self {
        self.properties = properties;
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: Value) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    pub fn with_independent(mut self, is_independent: bool) -> Self {
        self.is_independent = Some(is_independent);
        self
    }
}

/// Partial node update
///
/// Only provided fields change. `properties`, when present, replaces the whole
/// property set of the node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeUpdate {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub node_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<Properties>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_independent: Option<bool>,
}

impl NodeUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_node_type(mut self, node_type: impl Into<String>) -> Self {
        self.node_type = Some(node_type.into());
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_properties(mut self, properties: Properties) -> Self {
        self.properties = Some(properties);
        self
    }

    pub fn with_independent(mut self, is_independent: bool) -> Self {
        self.is_independent = Some(is_independent);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.node_type.is_none()
            && self.label.is_none()
            && self.properties.is_none()
            && self.is_independent.is_none()
    }
}

/// How `delete_node` treats edges touching the node
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeleteMode {
    /// Keep touching edges, nulling the endpoint that pointed at the node
    #[default]
    KeepConnected,
    /// Remove every touching edge (and its properties) first
    Cascade,
}
