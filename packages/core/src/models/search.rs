//! Search Criteria and Results
//!
//! Search is parameterized by a fixed criteria object rather than a query
//! language. Core columns (ids, type, label, timestamps, endpoints) narrow the
//! candidate set; property predicates are then evaluated against the
//! JSON-decoded property values.
//!
//! # Examples
//!
//! ```rust
//! # use relgraph_core::models::{FilterOperator, NodeSearchCriteria, PropertyFilter, SortKey};
//! # use serde_json::json;
//! let criteria = NodeSearchCriteria::new()
//!     .with_node_type("Task")
//!     .with_property_filter(PropertyFilter::new("priority", FilterOperator::GreaterThan, json!(2)))
//!     .with_sort(SortKey::Property("priority".into()), Default::default())
//!     .with_limit(10);
//! assert_eq!(criteria.limit, Some(10));
//! ```

use crate::models::{Edge, Node};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Comparison operator for property predicates
///
/// Serialized as the operator string (`"EQUALS"`, `">="`, ...). Any other
/// string deserializes to `Unsupported`, which matches every entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FilterOperator {
    Exists,
    NotExists,
    Equals,
    NotEquals,
    Contains,
    StartsWith,
    EndsWith,
    /// Greater than (>)
    GreaterThan,
    /// Greater than or equal (>=)
    GreaterThanOrEqual,
    /// Less than (<)
    LessThan,
    /// Less than or equal (<=)
    LessThanOrEqual,
    Unsupported(String),
}

impl FilterOperator {
    pub fn as_str(&self) -> &str {
        match self {
            FilterOperator::Exists => "EXISTS",
            FilterOperator::NotExists => "NOT_EXISTS",
            FilterOperator::Equals => "EQUALS",
            FilterOperator::NotEquals => "NOT_EQUALS",
            FilterOperator::Contains => "CONTAINS",
            FilterOperator::StartsWith => "STARTS_WITH",
            FilterOperator::EndsWith => "ENDS_WITH",
            FilterOperator::GreaterThan => ">",
            FilterOperator::GreaterThanOrEqual => ">=",
            FilterOperator::LessThan => "<",
            FilterOperator::LessThanOrEqual => "<=",
            FilterOperator::Unsupported(op) => op,
        }
    }
}

impl From<String> for FilterOperator {
    fn from(op: String) -> Self {
        match op.as_str() {
            "EXISTS" => FilterOperator::Exists,
            "NOT_EXISTS" => FilterOperator::NotExists,
            "EQUALS" | "=" | "==" => FilterOperator::Equals,
            "NOT_EQUALS" | "!=" => FilterOperator::NotEquals,
            "CONTAINS" => FilterOperator::Contains,
            "STARTS_WITH" => FilterOperator::StartsWith,
            "ENDS_WITH" => FilterOperator::EndsWith,
            ">" => FilterOperator::GreaterThan,
            ">=" => FilterOperator::GreaterThanOrEqual,
            "<" => FilterOperator::LessThan,
            "<=" => FilterOperator::LessThanOrEqual,
            _ => FilterOperator::Unsupported(op),
        }
    }
}

impl From<FilterOperator> for String {
    fn from(op: FilterOperator) -> Self {
        op.as_str().to_string()
    }
}

/// Predicate on one property key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyFilter {
    pub key: String,

    pub operator: FilterOperator,

    /// Comparison value; ignored by EXISTS / NOT_EXISTS
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl PropertyFilter {
    pub fn new(key: impl Into<String>, operator: FilterOperator, value: Value) -> Self {
        Self {
            key: key.into(),
            operator,
            value: Some(value),
        }
    }

    pub fn exists(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            operator: FilterOperator::Exists,
            value: None,
        }
    }

    pub fn not_exists(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            operator: FilterOperator::NotExists,
            value: None,
        }
    }
}

/// Field to sort search results by
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    Id,
    /// Node type or edge type
    Type,
    /// Node label (edges sort by type)
    Label,
    CreatedAt,
    /// Nodes only; edges sort by created_at
    UpdatedAt,
    /// Value of a property; entities without the key sort last
    Property(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

/// Criteria for `search_nodes`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeSearchCriteria {
    pub ids: Option<Vec<String>>,
    pub node_types: Option<Vec<String>>,
    /// Exact label match
    pub label: Option<String>,
    /// Substring label match
    pub label_contains: Option<String>,
    pub is_independent: Option<bool>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
    pub updated_after: Option<DateTime<Utc>>,
    pub updated_before: Option<DateTime<Utc>>,
    pub properties: Vec<PropertyFilter>,
    pub sort_by: Option<SortKey>,
    pub sort_direction: SortDirection,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl NodeSearchCriteria {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ids(mut self, ids: Vec<String>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn with_node_type(mut self, node_type: impl Into<String>) -> Self {
        self.node_types
            .get_or_insert_with(Vec::new)
            .push(node_type.into());
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_label_contains(mut self, fragment: impl Into<String>) -> Self {
        self.label_contains = Some(fragment.into());
        self
    }

    pub fn with_independent(mut self, is_independent: bool) -> Self {
        self.is_independent = Some(is_independent);
        self
    }

    pub fn with_created_range(
        mut self,
        after: Option<DateTime<Utc>>,
        before: Option<DateTime<Utc>>,
    ) -> Self {
        self.created_after = after;
        self.created_before = before;
        self
    }

    pub fn with_property_filter(mut self, filter: PropertyFilter) -> Self {
        self.properties.push(filter);
        self
    }

    pub fn with_sort(mut self, key: SortKey, direction: SortDirection) -> Self {
        self.sort_by = Some(key);
        self.sort_direction = direction;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }
}

/// Criteria for `search_edges`
///
/// Structured relationships are searched through their logical view
/// (type = relationship label, properties = relationship properties).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgeSearchCriteria {
    pub ids: Option<Vec<String>>,
    pub edge_types: Option<Vec<String>>,
    pub source_ids: Option<Vec<String>>,
    pub target_ids: Option<Vec<String>>,
    /// Only structured (true) or only plain (false) edges
    pub structured: Option<bool>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
    pub properties: Vec<PropertyFilter>,
    pub sort_by: Option<SortKey>,
    pub sort_direction: SortDirection,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl EdgeSearchCriteria {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_edge_type(mut self, edge_type: impl Into<String>) -> Self {
        self.edge_types
            .get_or_insert_with(Vec::new)
            .push(edge_type.into());
        self
    }

    pub fn with_source(mut self, source_id: impl Into<String>) -> Self {
        self.source_ids
            .get_or_insert_with(Vec::new)
            .push(source_id.into());
        self
    }

    pub fn with_target(mut self, target_id: impl Into<String>) -> Self {
        self.target_ids
            .get_or_insert_with(Vec::new)
            .push(target_id.into());
        self
    }

    pub fn with_structured(mut self, structured: bool) -> Self {
        self.structured = Some(structured);
        self
    }

    pub fn with_property_filter(mut self, filter: PropertyFilter) -> Self {
        self.properties.push(filter);
        self
    }

    pub fn with_sort(mut self, key: SortKey, direction: SortDirection) -> Self {
        self.sort_by = Some(key);
        self.sort_direction = direction;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }
}

/// One page of search results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult<T> {
    pub items: Vec<T>,
    /// Matches before limit/offset were applied
    pub total: usize,
}

/// Options for `full_text_search`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FullTextOptions {
    pub case_sensitive: bool,
    /// Match node labels (and node property values)
    pub include_nodes: bool,
    /// Match edge types (and edge property values)
    pub include_edges: bool,
    pub include_properties: bool,
    /// Applied separately to nodes and to edges
    pub limit: Option<usize>,
    pub offset: usize,
}

impl Default for FullTextOptions {
    fn default() -> Self {
        Self {
            case_sensitive: false,
            include_nodes: true,
            include_edges: true,
            include_properties: true,
            limit: None,
            offset: 0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FullTextResult {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub total_nodes: usize,
    pub total_edges: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_operator_strings() {
        let op: FilterOperator = serde_json::from_value(json!(">=")).unwrap();
        assert_eq!(op, FilterOperator::GreaterThanOrEqual);

        let op: FilterOperator = serde_json::from_value(json!("NOT_EXISTS")).unwrap();
        assert_eq!(op, FilterOperator::NotExists);

        assert_eq!(
            serde_json::to_value(FilterOperator::StartsWith).unwrap(),
            json!("STARTS_WITH")
        );
    }

    #[test]
    fn test_unknown_operator_is_kept_as_unsupported() {
        let filter: PropertyFilter =
            serde_json::from_value(json!({"key": "k", "operator": "REGEX", "value": "a.*"}))
                .unwrap();
        assert_eq!(filter.operator, FilterOperator::Unsupported("REGEX".into()));
        assert_eq!(serde_json::to_value(&filter.operator).unwrap(), json!("REGEX"));
    }

    #[test]
    fn test_criteria_deserialize_with_defaults() {
        let criteria: NodeSearchCriteria =
            serde_json::from_value(json!({"label_contains": "ad", "limit": 5})).unwrap();
        assert_eq!(criteria.label_contains.as_deref(), Some("ad"));
        assert_eq!(criteria.limit, Some(5));
        assert_eq!(criteria.sort_direction, SortDirection::Asc);
        assert!(criteria.properties.is_empty());
    }

    #[test]
    fn test_full_text_defaults_search_everything() {
        let options = FullTextOptions::default();
        assert!(options.include_nodes && options.include_edges && options.include_properties);
        assert!(!options.case_sensitive);
    }
}
