//! Edge Data Structures
//!
//! An `Edge` is the logical relationship callers see. It is stored in one of
//! two encodings:
//!
//! - **Plain**: one row in `relationships`
//! - **Structured**: one `RELATIONSHIP_TYPE` node carrying the label and
//!   properties, plus two `RELAY` edges (source -> node, node -> target)
//!
//! Both encodings surface as the same `Edge` shape; `encoding` records which
//! one backs a given edge.

use crate::models::Properties;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Node type of the synthetic node behind a structured relationship
pub const RELATIONSHIP_TYPE: &str = "RELATIONSHIP_TYPE";

/// Edge type of the two internal legs of a structured relationship
pub const RELAY: &str = "RELAY";

/// Storage encoding of a logical edge
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EdgeEncoding {
    /// A single relationships row
    #[default]
    Plain,
    /// A RELATIONSHIP_TYPE node and its (incoming, outgoing) relay edges
    Structured {
        relationship_node_id: String,
        relay_edge_ids: (String, String),
    },
}

impl EdgeEncoding {
    pub fn is_plain(&self) -> bool {
        matches!(self, EdgeEncoding::Plain)
    }
}

/// A logical edge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub id: String,

    /// Null once the source node was deleted with KEEP_CONNECTED
    pub source_id: Option<String>,

    /// Null once the target node was deleted with KEEP_CONNECTED
    pub target_id: Option<String>,

    #[serde(rename = "type")]
    pub edge_type: String,

    #[serde(default)]
    pub properties: Properties,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "EdgeEncoding::is_plain")]
    pub encoding: EdgeEncoding,
}

impl Edge {
    pub fn is_structured(&self) -> bool {
        !self.encoding.is_plain()
    }

    pub fn is_relay(&self) -> bool {
        self.edge_type == RELAY
    }

    pub fn touches(&self, node_id: &str) -> bool {
        self.source_id.as_deref() == Some(node_id) || self.target_id.as_deref() == Some(node_id)
    }

    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }
}

/// Parameters for creating a plain edge
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewEdge {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default)]
    pub source_id: Option<String>,

    #[serde(default)]
    pub target_id: Option<String>,

    #[serde(rename = "type")]
    pub edge_type: String,

    #[serde(default)]
    pub properties: Properties,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl NewEdge {
    pub fn new(
        source_id: impl Into<String>,
        target_id: impl Into<String>,
        edge_type: impl Into<String>,
    ) -> Self {
        Self {
            source_id: Some(source_id.into()),
            target_id: Some(target_id.into()),
            edge_type: edge_type.into(),
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
}

/// Deserialize helper for double-Option fields
fn deserialize_optional_field<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    // Missing field is handled by #[serde(default)] on the struct field
    Ok(Some(Option::<T>::deserialize(deserializer)?))
}

/// Partial edge update
///
/// Endpoints use the double-Option pattern:
/// - `None`: don't change the endpoint
/// - `Some(None)`: detach the endpoint (plain edges only)
/// - `Some(Some(id))`: point the endpoint at `id`
///
/// `properties`, when present, replaces the whole property set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EdgeUpdate {
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_optional_field"
    )]
    pub source_id: Option<Option<String>>,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_optional_field"
    )]
    pub target_id: Option<Option<String>>,

    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub edge_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<Properties>,
}

impl EdgeUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source(mut self, source_id: impl Into<String>) -> Self {
        self.source_id = Some(Some(source_id.into()));
        self
    }

    pub fn with_target(mut self, target_id: impl Into<String>) -> Self {
        self.target_id = Some(Some(target_id.into()));
        self
    }

    pub fn with_edge_type(mut self, edge_type: impl Into<String>) -> Self {
        self.edge_type = Some(edge_type.into());
        self
    }

    pub fn with_properties(mut self, properties: Properties) -> Self {
        self.properties = Some(properties);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.source_id.is_none()
            && self.target_id.is_none()
            && self.edge_type.is_none()
            && self.properties.is_none()
    }
}

/// Which edges of a node to return
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    Outgoing,
    Incoming,
    #[default]
    Both,
}

impl Direction {
    pub fn matches(&self, edge: &Edge, node_id: &str) -> bool {
        let out = edge.source_id.as_deref() == Some(node_id);
        let inc = edge.target_id.as_deref() == Some(node_id);
        match self {
            Direction::Outgoing => out,
            Direction::Incoming => inc,
            Direction::Both => out || inc,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn edge(source: &str, target: &str) -> Edge {
        Edge {
            id: "e1".into(),
            source_id: Some(source.into()),
            target_id: Some(target.into()),
            edge_type: "KNOWS".into(),
            properties: Properties::new(),
            created_at: Utc::now(),
            encoding: EdgeEncoding::Plain,
        }
    }

    #[test]
    fn test_update_double_option_deserialization() {
        let update: EdgeUpdate = serde_json::from_value(json!({"source_id": null})).unwrap();
        assert_eq!(update.source_id, Some(None));
        assert_eq!(update.target_id, None);

        let update: EdgeUpdate = serde_json::from_value(json!({"target_id": "n2"})).unwrap();
        assert_eq!(update.target_id, Some(Some("n2".to_string())));
    }

    #[test]
    fn test_plain_encoding_is_not_serialized() {
        let value = serde_json::to_value(edge("a", "b")).unwrap();
        assert!(value.get("encoding").is_none());
        assert_eq!(value["type"], json!("KNOWS"));
    }

    #[test]
    fn test_structured_encoding_round_trips() {
        let mut e = edge("a", "b");
        e.encoding = EdgeEncoding::Structured {
            relationship_node_id: "e1".into(),
            relay_edge_ids: ("r-in".into(), "r-out".into()),
        };

        let value = serde_json::to_value(&e).unwrap();
        assert_eq!(value["encoding"]["kind"], json!("structured"));

        let back: Edge = serde_json::from_value(value).unwrap();
        assert!(back.is_structured());
        assert_eq!(back, e);
    }

    #[test]
    fn test_direction_matching() {
        let e = edge("a", "b");
        assert!(Direction::Outgoing.matches(&e, "a"));
        assert!(!Direction::Outgoing.matches(&e, "b"));
        assert!(Direction::Incoming.matches(&e, "b"));
        assert!(Direction::Both.matches(&e, "b"));
        assert!(!Direction::Both.matches(&e, "c"));
    }
}
