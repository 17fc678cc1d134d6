//! Search
//!
//! Criteria search over nodes and logical edges, and substring full-text
//! search.
//!
//! Node search pushes the core column filters (ids, type, label, independence,
//! timestamps) into SQL. Edge search runs in memory because structured
//! relationships only exist as synthesized views. Property predicates,
//! sorting and pagination always run in memory.

use crate::db::{SqlValue, TxContext};
use crate::models::{
    Edge, EdgeSearchCriteria, FilterOperator, FullTextOptions, FullTextResult, Node,
    NodeSearchCriteria, Properties, PropertyFilter, SearchResult, SortDirection, SortKey,
    RELATIONSHIP_TYPE,
};
use crate::services::entity_repository::{self as repo, format_timestamp};
use crate::services::structured;
use crate::services::GraphError;
use serde_json::Value;
use std::cmp::Ordering;

// ---------------------------------------------------------------------------
// Property predicates
// ---------------------------------------------------------------------------

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

fn as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn values_equal(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::Number(_), Value::Number(_)) => as_number(actual) == as_number(expected),
        _ => actual == expected,
    }
}

fn compare_numbers(actual: &Value, expected: &Value, accept: fn(Ordering) -> bool) -> bool {
    match (as_number(actual), as_number(expected)) {
        (Some(a), Some(b)) => a.partial_cmp(&b).is_some_and(accept),
        _ => false,
    }
}

/// Evaluate one predicate against a property set
pub(crate) fn property_matches(filter: &PropertyFilter, properties: &Properties) -> bool {
    let actual = properties.get(&filter.key);
    let expected = filter.value.as_ref();

    match &filter.operator {
        FilterOperator::Exists => actual.is_some(),
        FilterOperator::NotExists => actual.is_none(),
        FilterOperator::Unsupported(op) => {
            tracing::debug!("Ignoring unsupported property operator '{}'", op);
            true
        }
        FilterOperator::NotEquals => match (actual, expected) {
            (None, _) => true,
            (Some(a), Some(e)) => !values_equal(a, e),
            (Some(a), None) => !a.is_null(),
        },
        op => {
            let (Some(actual), Some(expected)) = (actual, expected) else {
                return false;
            };
            match op {
                FilterOperator::Equals => values_equal(actual, expected),
                FilterOperator::Contains => match actual {
                    Value::Array(items) => items.iter().any(|item| values_equal(item, expected)),
                    Value::String(s) => s.contains(&as_text(expected)),
                    _ => false,
                },
                FilterOperator::StartsWith => match actual {
                    Value::String(s) => s.starts_with(&as_text(expected)),
                    _ => false,
                },
                FilterOperator::EndsWith => match actual {
                    Value::String(s) => s.ends_with(&as_text(expected)),
                    _ => false,
                },
                FilterOperator::GreaterThan => {
                    compare_numbers(actual, expected, |o| o == Ordering::Greater)
                }
                FilterOperator::GreaterThanOrEqual => {
                    compare_numbers(actual, expected, |o| o != Ordering::Less)
                }
                FilterOperator::LessThan => {
                    compare_numbers(actual, expected, |o| o == Ordering::Less)
                }
                FilterOperator::LessThanOrEqual => {
                    compare_numbers(actual, expected, |o| o != Ordering::Greater)
                }
                _ => true,
            }
        }
    }
}

fn all_properties_match(filters: &[PropertyFilter], properties: &Properties) -> bool {
    filters.iter().all(|f| property_matches(f, properties))
}

// ---------------------------------------------------------------------------
// Sorting and pagination
// ---------------------------------------------------------------------------

/// Order two JSON values: numbers numerically, everything else as text
fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (as_number(a), as_number(b)) {
        (Some(x), Some(y)) if a.is_number() && b.is_number() => {
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        _ => as_text(a).cmp(&as_text(b)),
    }
}

/// Missing property values sort last in either direction
fn compare_optional(a: Option<&Value>, b: Option<&Value>, direction: SortDirection) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => directed(compare_values(x, y), direction),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn directed(ordering: Ordering, direction: SortDirection) -> Ordering {
    match direction {
        SortDirection::Asc => ordering,
        SortDirection::Desc => ordering.reverse(),
    }
}

fn sort_nodes(nodes: &mut [Node], key: &SortKey, direction: SortDirection) {
    nodes.sort_by(|a, b| match key {
        SortKey::Id => directed(a.id.cmp(&b.id), direction),
        SortKey::Type => directed(a.node_type.cmp(&b.node_type), direction),
        SortKey::Label => directed(a.label.cmp(&b.label), direction),
        SortKey::CreatedAt => directed(a.created_at.cmp(&b.created_at), direction),
        SortKey::UpdatedAt => directed(a.updated_at.cmp(&b.updated_at), direction),
        SortKey::Property(name) => {
            compare_optional(a.properties.get(name), b.properties.get(name), direction)
        }
    });
}

fn sort_edges(edges: &mut [Edge], key: &SortKey, direction: SortDirection) {
    edges.sort_by(|a, b| match key {
        SortKey::Id => directed(a.id.cmp(&b.id), direction),
        SortKey::Type | SortKey::Label => directed(a.edge_type.cmp(&b.edge_type), direction),
        SortKey::CreatedAt | SortKey::UpdatedAt => {
            directed(a.created_at.cmp(&b.created_at), direction)
        }
        SortKey::Property(name) => {
            compare_optional(a.properties.get(name), b.properties.get(name), direction)
        }
    });
}

fn paginate<T>(items: Vec<T>, offset: usize, limit: Option<usize>) -> Vec<T> {
    let page = items.into_iter().skip(offset);
    match limit {
        Some(limit) => page.take(limit).collect(),
        None => page.collect(),
    }
}

// ---------------------------------------------------------------------------
// Criteria search
// ---------------------------------------------------------------------------

fn push_in_clause(
    clauses: &mut Vec<String>,
    params: &mut Vec<SqlValue>,
    column: &str,
    values: &[String],
) {
    if values.is_empty() {
        clauses.push("0 = 1".to_string());
        return;
    }
    let placeholders = vec!["?"; values.len()].join(", ");
    clauses.push(format!("{} IN ({})", column, placeholders));
    params.extend(values.iter().map(SqlValue::from));
}

/// SQL filter for the core node columns
fn node_where_clause(criteria: &NodeSearchCriteria) -> (String, Vec<SqlValue>) {
    let mut clauses = vec!["type != ?".to_string()];
    let mut params = vec![SqlValue::from(RELATIONSHIP_TYPE)];

    if let Some(ids) = &criteria.ids {
        push_in_clause(&mut clauses, &mut params, "id", ids);
    }
    if let Some(types) = &criteria.node_types {
        push_in_clause(&mut clauses, &mut params, "type", types);
    }
    if let Some(label) = &criteria.label {
        clauses.push("label = ?".to_string());
        params.push(SqlValue::from(label));
    }
    if let Some(fragment) = &criteria.label_contains {
        clauses.push("instr(label, ?) > 0".to_string());
        params.push(SqlValue::from(fragment));
    }
    if let Some(is_independent) = criteria.is_independent {
        clauses.push("is_independent = ?".to_string());
        params.push(SqlValue::from(is_independent));
    }

    let ranges = [
        ("created_at >= ?", criteria.created_after),
        ("created_at <= ?", criteria.created_before),
        ("updated_at >= ?", criteria.updated_after),
        ("updated_at <= ?", criteria.updated_before),
    ];
    for (clause, bound) in ranges {
        if let Some(ts) = bound {
            clauses.push(clause.to_string());
            params.push(SqlValue::from(format_timestamp(&ts)));
        }
    }

    (clauses.join(" AND "), params)
}

pub(crate) async fn search_nodes(
    ctx: &TxContext,
    criteria: &NodeSearchCriteria,
) -> Result<SearchResult<Node>, GraphError> {
    let (where_clause, params) = node_where_clause(criteria);
    let mut nodes: Vec<Node> = repo::fetch_nodes_where(ctx, &where_clause, params)
        .await?
        .into_iter()
        .filter(|node| all_properties_match(&criteria.properties, &node.properties))
        .collect();

    if let Some(key) = &criteria.sort_by {
        sort_nodes(&mut nodes, key, criteria.sort_direction);
    }

    let total = nodes.len();
    let items = paginate(nodes, criteria.offset.unwrap_or(0), criteria.limit);
    tracing::debug!("Node search matched {} (returning {})", total, items.len());
    Ok(SearchResult { items, total })
}

fn edge_matches(edge: &Edge, criteria: &EdgeSearchCriteria) -> bool {
    let in_list = |list: &Option<Vec<String>>, value: Option<&str>| match list {
        Some(list) => value.is_some_and(|v| list.iter().any(|item| item == v)),
        None => true,
    };

    in_list(&criteria.ids, Some(edge.id.as_str()))
        && in_list(&criteria.edge_types, Some(edge.edge_type.as_str()))
        && in_list(&criteria.source_ids, edge.source_id.as_deref())
        && in_list(&criteria.target_ids, edge.target_id.as_deref())
        && criteria
            .structured
            .map_or(true, |structured| edge.is_structured() == structured)
        && criteria.created_after.map_or(true, |ts| edge.created_at >= ts)
        && criteria.created_before.map_or(true, |ts| edge.created_at <= ts)
        && all_properties_match(&criteria.properties, &edge.properties)
}

pub(crate) async fn search_edges(
    ctx: &TxContext,
    criteria: &EdgeSearchCriteria,
) -> Result<SearchResult<Edge>, GraphError> {
    let mut edges: Vec<Edge> = structured::decode_all(ctx)
        .await?
        .into_iter()
        .filter(|edge| edge_matches(edge, criteria))
        .collect();

    if let Some(key) = &criteria.sort_by {
        sort_edges(&mut edges, key, criteria.sort_direction);
    }

    let total = edges.len();
    let items = paginate(edges, criteria.offset.unwrap_or(0), criteria.limit);
    tracing::debug!("Edge search matched {} (returning {})", total, items.len());
    Ok(SearchResult { items, total })
}

// ---------------------------------------------------------------------------
// Full-text search
// ---------------------------------------------------------------------------

struct TextMatcher {
    needle: String,
    case_sensitive: bool,
}

impl TextMatcher {
    fn new(query: &str, case_sensitive: bool) -> Self {
        let needle = if case_sensitive {
            query.to_string()
        } else {
            query.to_lowercase()
        };
        Self {
            needle,
            case_sensitive,
        }
    }

    fn matches(&self, haystack: &str) -> bool {
        if self.case_sensitive {
            haystack.contains(&self.needle)
        } else {
            haystack.to_lowercase().contains(&self.needle)
        }
    }

    fn matches_properties(&self, properties: &Properties) -> bool {
        properties.values().any(|value| self.matches(&as_text(value)))
    }
}

pub(crate) async fn full_text_search(
    ctx: &TxContext,
    query: &str,
    options: &FullTextOptions,
) -> Result<FullTextResult, GraphError> {
    let matcher = TextMatcher::new(query, options.case_sensitive);
    let mut result = FullTextResult::default();

    if options.include_nodes {
        let nodes: Vec<Node> = repo::fetch_visible_nodes(ctx)
            .await?
            .into_iter()
            .filter(|node| {
                matcher.matches(&node.label)
                    || (options.include_properties && matcher.matches_properties(&node.properties))
            })
            .collect();
        result.total_nodes = nodes.len();
        result.nodes = paginate(nodes, options.offset, options.limit);
    }

    if options.include_edges {
        let edges: Vec<Edge> = structured::decode_all(ctx)
            .await?
            .into_iter()
            .filter(|edge| {
                matcher.matches(&edge.edge_type)
                    || (options.include_properties && matcher.matches_properties(&edge.properties))
            })
            .collect();
        result.total_edges = edges.len();
        result.edges = paginate(edges, options.offset, options.limit);
    }

    tracing::debug!(
        "Full-text search '{}' matched {} nodes and {} edges",
        query,
        result.total_nodes,
        result.total_edges
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn props(value: Value) -> Properties {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_existence_operators() {
        let p = props(json!({"a": 1}));
        assert!(property_matches(&PropertyFilter::exists("a"), &p));
        assert!(!property_matches(&PropertyFilter::exists("b"), &p));
        assert!(property_matches(&PropertyFilter::not_exists("b"), &p));
    }

    #[test]
    fn test_equality_operators() {
        let p = props(json!({"n": 3, "s": "done"}));
        let eq = |k: &str, v: Value| PropertyFilter::new(k, FilterOperator::Equals, v);
        let ne = |k: &str, v: Value| PropertyFilter::new(k, FilterOperator::NotEquals, v);

        assert!(property_matches(&eq("n", json!(3.0)), &p));
        assert!(property_matches(&eq("s", json!("done")), &p));
        assert!(!property_matches(&eq("s", json!("open")), &p));
        assert!(property_matches(&ne("s", json!("open")), &p));
        // absent keys are "not equal" to anything
        assert!(property_matches(&ne("missing", json!(1)), &p));
    }

    #[test]
    fn test_string_operators() {
        let p = props(json!({"title": "Graph engines", "tags": ["rust", "db"]}));
        let filter = |op: FilterOperator, v: Value| PropertyFilter::new("title", op, v);

        assert!(property_matches(&filter(FilterOperator::Contains, json!("engine")), &p));
        assert!(property_matches(&filter(FilterOperator::StartsWith, json!("Graph")), &p));
        assert!(property_matches(&filter(FilterOperator::EndsWith, json!("engines")), &p));
        assert!(!property_matches(&filter(FilterOperator::StartsWith, json!("engines")), &p));
        assert!(property_matches(
            &PropertyFilter::new("tags", FilterOperator::Contains, json!("rust")),
            &p
        ));
    }

    #[test]
    fn test_numeric_comparisons_coerce() {
        let p = props(json!({"n": 5, "s": "7", "word": "x"}));
        let cmp = |k: &str, op: FilterOperator, v: Value| PropertyFilter::new(k, op, v);

        assert!(property_matches(&cmp("n", FilterOperator::GreaterThan, json!(4)), &p));
        assert!(property_matches(&cmp("n", FilterOperator::GreaterThanOrEqual, json!(5)), &p));
        assert!(!property_matches(&cmp("n", FilterOperator::LessThan, json!(5)), &p));
        assert!(property_matches(&cmp("n", FilterOperator::LessThanOrEqual, json!(5)), &p));
        assert!(property_matches(&cmp("s", FilterOperator::GreaterThan, json!(6)), &p));
        assert!(!property_matches(&cmp("word", FilterOperator::GreaterThan, json!(0)), &p));
        assert!(!property_matches(&cmp("missing", FilterOperator::LessThan, json!(0)), &p));
    }

    #[test]
    fn test_unsupported_operator_matches_everything() {
        let filter = PropertyFilter::new(
            "anything",
            FilterOperator::Unsupported("REGEX".into()),
            json!(".*"),
        );
        assert!(property_matches(&filter, &Properties::new()));
    }

    #[test]
    fn test_missing_sort_values_go_last() {
        let a = json!(1);
        let b = json!(2);
        assert_eq!(
            compare_optional(Some(&a), Some(&b), SortDirection::Desc),
            Ordering::Greater
        );
        assert_eq!(
            compare_optional(None, Some(&a), SortDirection::Desc),
            Ordering::Greater
        );
        assert_eq!(
            compare_optional(Some(&a), None, SortDirection::Asc),
            Ordering::Less
        );
    }

    #[test]
    fn test_node_where_clause_composition() {
        let criteria = NodeSearchCriteria::new()
            .with_node_type("Task")
            .with_label_contains("doc")
            .with_independent(true);
        let (clause, params) = node_where_clause(&criteria);

        assert_eq!(
            clause,
            "type != ? AND type IN (?) AND instr(label, ?) > 0 AND is_independent = ?"
        );
        assert_eq!(params.len(), 4);
    }

    #[test]
    fn test_paginate() {
        let items: Vec<u32> = (0..10).collect();
        assert_eq!(paginate(items.clone(), 8, Some(5)), vec![8, 9]);
        assert_eq!(paginate(items, 0, Some(3)), vec![0, 1, 2]);
    }
}
