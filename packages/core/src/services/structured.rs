//! Structured Relationship Codec
//!
//! A structured relationship is a property-bearing logical edge stored as:
//!
//! ```text
//! source --RELAY--> [RELATIONSHIP_TYPE node] --RELAY--> target
//! ```
//!
//! The node carries the relationship label (the logical edge type) and its
//! properties. This module is the only place that understands the encoding:
//! it resolves ids into an [`EdgeHandle`], synthesizes logical edges, applies
//! updates to the right relay leg and removes whole structures.
//!
//! Only well-formed encodings (exactly one incoming and one outgoing relay)
//! surface as logical edges. Anything else is `Malformed` and is reported by
//! the integrity validator, never by reads.

use crate::db::TxContext;
use crate::models::{
    Edge, EdgeEncoding, EdgeUpdate, MoveResult, NewEdge, NewNode, Node, Properties,
    RELATIONSHIP_TYPE, RELAY,
};
use crate::services::entity_repository as repo;
use crate::services::property_store::{self, PropertyOwner};
use crate::services::GraphError;
use crate::sql_params;
use chrono::Utc;
use std::collections::{HashMap, HashSet};

/// Well-formed parts of a structured relationship
#[derive(Debug, Clone)]
pub(crate) struct StructuredParts {
    pub node: Node,
    /// source -> node
    pub relay_in: Edge,
    /// node -> target
    pub relay_out: Edge,
}

impl StructuredParts {
    /// The logical edge this encoding stands for
    pub fn to_edge(&self) -> Edge {
        Edge {
            id: self.node.id.clone(),
            source_id: self.relay_in.source_id.clone(),
            target_id: self.relay_out.target_id.clone(),
            edge_type: self.node.label.clone(),
            properties: self.node.properties.clone(),
            created_at: self.node.created_at,
            encoding: EdgeEncoding::Structured {
                relationship_node_id: self.node.id.clone(),
                relay_edge_ids: (self.relay_in.id.clone(), self.relay_out.id.clone()),
            },
        }
    }
}

/// What an edge-like id refers to in storage
#[derive(Debug, Clone)]
pub(crate) enum EdgeHandle {
    /// Ordinary relationships row
    Plain(Edge),
    /// Internal leg of a structured relationship (owner is None when orphaned)
    Relay {
        edge: Edge,
        relationship_node_id: Option<String>,
    },
    Structured(StructuredParts),
    /// Relationship node whose relays do not form exactly one in and one out
    Malformed { node: Node, relay_ids: Vec<String> },
}

fn is_incoming(relay: &Edge, node_id: &str) -> bool {
    relay.target_id.as_deref() == Some(node_id) && relay.source_id.as_deref() != Some(node_id)
}

fn is_outgoing(relay: &Edge, node_id: &str) -> bool {
    relay.source_id.as_deref() == Some(node_id) && relay.target_id.as_deref() != Some(node_id)
}

/// Classify a relationship node by the relays attached to it
pub(crate) fn classify(node: Node, relays: Vec<Edge>) -> EdgeHandle {
    if let [first, second] = relays.as_slice() {
        if is_incoming(first, &node.id) && is_outgoing(second, &node.id) {
            return EdgeHandle::Structured(StructuredParts {
                relay_in: first.clone(),
                relay_out: second.clone(),
                node,
            });
        }
        if is_outgoing(first, &node.id) && is_incoming(second, &node.id) {
            return EdgeHandle::Structured(StructuredParts {
                relay_in: second.clone(),
                relay_out: first.clone(),
                node,
            });
        }
    }

    EdgeHandle::Malformed {
        relay_ids: relays.into_iter().map(|r| r.id).collect(),
        node,
    }
}

async fn relays_of(ctx: &TxContext, node_id: &str) -> Result<Vec<Edge>, GraphError> {
    Ok(repo::fetch_edges_touching_raw(ctx, node_id)
        .await?
        .into_iter()
        .filter(Edge::is_relay)
        .collect())
}

/// Relationship node a relay belongs to
async fn relay_owner(ctx: &TxContext, relay: &Edge) -> Result<Option<String>, GraphError> {
    for endpoint in [&relay.source_id, &relay.target_id].into_iter().flatten() {
        if let Some(node) = repo::fetch_node_raw(ctx, endpoint).await? {
            if node.is_relationship_node() {
                return Ok(Some(node.id));
            }
        }
    }
    Ok(None)
}

/// Resolve an edge id or relationship node id
pub(crate) async fn resolve(ctx: &TxContext, id: &str) -> Result<Option<EdgeHandle>, GraphError> {
    if let Some(edge) = repo::fetch_edge_raw(ctx, id).await? {
        if edge.is_relay() {
            let relationship_node_id = relay_owner(ctx, &edge).await?;
            return Ok(Some(EdgeHandle::Relay {
                edge,
                relationship_node_id,
            }));
        }
        return Ok(Some(EdgeHandle::Plain(edge)));
    }

    match repo::fetch_node_raw(ctx, id).await? {
        Some(node) if node.is_relationship_node() => {
            let relays = relays_of(ctx, &node.id).await?;
            Ok(Some(classify(node, relays)))
        }
        _ => Ok(None),
    }
}

/// Every logical edge, ordered by (created_at, id)
///
/// Plain edges as stored, plus one synthesized edge per well-formed
/// structured relationship. Relays never appear.
pub(crate) async fn decode_all(ctx: &TxContext) -> Result<Vec<Edge>, GraphError> {
    let rows = repo::fetch_edges_raw(ctx).await?;
    let relationship_nodes =
        repo::fetch_nodes_where(ctx, "type = ?", sql_params![RELATIONSHIP_TYPE]).await?;
    let owners: HashSet<&str> = relationship_nodes.iter().map(|n| n.id.as_str()).collect();

    let mut relays_by_owner: HashMap<String, Vec<Edge>> = HashMap::new();
    let mut edges = Vec::with_capacity(rows.len());
    for edge in rows {
        if !edge.is_relay() {
            edges.push(edge);
            continue;
        }
        let mut endpoints: Vec<&String> = [&edge.source_id, &edge.target_id]
            .into_iter()
            .flatten()
            .filter(|id| owners.contains(id.as_str()))
            .collect();
        endpoints.dedup();
        for owner in endpoints {
            relays_by_owner
                .entry(owner.clone())
                .or_default()
                .push(edge.clone());
        }
    }

    for node in relationship_nodes.iter() {
        let relays = relays_by_owner.remove(&node.id).unwrap_or_default();
        if let EdgeHandle::Structured(parts) = classify(node.clone(), relays) {
            edges.push(parts.to_edge());
        }
    }

    edges.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
    Ok(edges)
}

/// Create a relationship node and its two relays; returns the node id
pub(crate) async fn create(
    ctx: &TxContext,
    source_id: &str,
    target_id: &str,
    label: &str,
    properties: Properties,
) -> Result<String, GraphError> {
    repo::check_endpoint(ctx, source_id).await?;
    repo::check_endpoint(ctx, target_id).await?;
    if source_id == target_id {
        return Err(GraphError::validation(format!(
            "structured relationship cannot connect node {} to itself",
            source_id
        )));
    }
    if label.is_empty() {
        return Err(GraphError::validation(
            "structured relationship label must not be empty",
        ));
    }

    let node = repo::insert_node(
        ctx,
        NewNode::new(RELATIONSHIP_TYPE, label)
            .with_properties(properties)
            .with_independent(false),
    )
    .await?;
    repo::insert_edge(ctx, NewEdge::new(source_id, &node.id, RELAY)).await?;
    repo::insert_edge(ctx, NewEdge::new(&node.id, target_id, RELAY)).await?;

    tracing::debug!(
        "Created structured relationship {} ({} -[{}]-> {})",
        node.id,
        source_id,
        label,
        target_id
    );
    Ok(node.id)
}

/// Replace a plain edge with an equivalent structured relationship
pub(crate) async fn convert(
    ctx: &TxContext,
    edge_id: &str,
    label: Option<String>,
    properties: Option<Properties>,
) -> Result<String, GraphError> {
    let edge = match resolve(ctx, edge_id).await? {
        None => return Err(GraphError::edge_not_found(edge_id)),
        Some(EdgeHandle::Plain(edge)) => edge,
        Some(EdgeHandle::Relay { .. }) => {
            return Err(GraphError::validation(format!(
                "edge {} is a relay and cannot be converted",
                edge_id
            )))
        }
        Some(EdgeHandle::Structured(_)) | Some(EdgeHandle::Malformed { .. }) => {
            return Err(GraphError::validation(format!(
                "edge {} is already a structured relationship",
                edge_id
            )))
        }
    };

    let (Some(source_id), Some(target_id)) = (&edge.source_id, &edge.target_id) else {
        return Err(GraphError::validation(format!(
            "edge {} is missing an endpoint and cannot be converted",
            edge_id
        )));
    };

    let label = label.unwrap_or_else(|| edge.edge_type.clone());
    let properties = properties.unwrap_or_else(|| edge.properties.clone());
    let relationship_id = create(ctx, source_id, target_id, &label, properties).await?;
    repo::delete_edge_row(ctx, &edge.id).await?;

    tracing::debug!(
        "Converted edge {} into structured relationship {}",
        edge.id,
        relationship_id
    );
    Ok(relationship_id)
}

/// Apply an update to a structured relationship
///
/// Endpoint changes retarget the incoming relay (source) or the outgoing
/// relay (target); type and properties land on the relationship node.
pub(crate) async fn update(
    ctx: &TxContext,
    parts: StructuredParts,
    update: EdgeUpdate,
) -> Result<Edge, GraphError> {
    let relationship_id = parts.node.id.clone();

    if matches!(update.source_id, Some(None)) || matches!(update.target_id, Some(None)) {
        return Err(GraphError::validation(format!(
            "structured relationship {} cannot have a detached endpoint",
            relationship_id
        )));
    }

    let new_source = match &update.source_id {
        Some(Some(id)) => Some(id.clone()),
        _ => parts.relay_in.source_id.clone(),
    };
    let new_target = match &update.target_id {
        Some(Some(id)) => Some(id.clone()),
        _ => parts.relay_out.target_id.clone(),
    };
    if new_source.is_some() && new_source == new_target {
        return Err(GraphError::validation(format!(
            "structured relationship {} cannot become a self-loop",
            relationship_id
        )));
    }

    if let Some(Some(source_id)) = &update.source_id {
        repo::check_endpoint(ctx, source_id).await?;
        ctx.run(
            "UPDATE relationships SET source_id = ? WHERE id = ?",
            sql_params![source_id, &parts.relay_in.id],
        )
        .await?;
    }
    if let Some(Some(target_id)) = &update.target_id {
        repo::check_endpoint(ctx, target_id).await?;
        ctx.run(
            "UPDATE relationships SET target_id = ? WHERE id = ?",
            sql_params![target_id, &parts.relay_out.id],
        )
        .await?;
    }

    let mut node = parts.node;
    if let Some(label) = update.edge_type {
        if label.is_empty() {
            return Err(GraphError::validation(
                "structured relationship label must not be empty",
            ));
        }
        node.label = label;
    }
    node.updated_at = Utc::now();
    repo::update_node_row(ctx, &node).await?;

    if let Some(properties) = &update.properties {
        property_store::replace(ctx, PropertyOwner::Node, &node.id, properties).await?;
    }

    match resolve(ctx, &relationship_id).await? {
        Some(EdgeHandle::Structured(parts)) => Ok(parts.to_edge()),
        _ => Err(GraphError::edge_not_found(relationship_id)),
    }
}

/// Delete a node and everything hanging off it
///
/// Ordinary edges touching a visited node are removed with their properties.
/// A relay reached from an ordinary node queues its relationship node, which
/// then removes both of its relays and itself. The visited set stops
/// malformed cycles of relationship nodes. Returns the number of edge rows
/// removed.
pub(crate) async fn cascade_delete(ctx: &TxContext, root_id: &str) -> Result<usize, GraphError> {
    let mut visited: HashSet<String> = HashSet::new();
    let mut worklist = vec![root_id.to_string()];
    let mut removed_edges = 0;

    while let Some(node_id) = worklist.pop() {
        if !visited.insert(node_id.clone()) {
            continue;
        }
        let Some(node) = repo::fetch_node_raw(ctx, &node_id).await? else {
            continue;
        };
        let is_relationship_node = node.is_relationship_node();

        for edge in repo::fetch_edges_touching_raw(ctx, &node_id).await? {
            if edge.is_relay() && !is_relationship_node {
                if let Some(owner) = relay_owner(ctx, &edge).await? {
                    worklist.push(owner);
                    continue;
                }
            }
            repo::delete_edge_row(ctx, &edge.id).await?;
            removed_edges += 1;
        }

        repo::delete_node_row(ctx, &node_id).await?;
    }

    tracing::debug!(
        "Cascade from {} removed {} nodes and {} edges",
        root_id,
        visited.len(),
        removed_edges
    );
    Ok(removed_edges)
}

/// Re-point every logical edge touching `from_id` to `to_id`
///
/// Edges that would become self-loops or exact duplicates (same source,
/// target and type as an existing edge) stay where they are.
pub(crate) async fn move_relationships(
    ctx: &TxContext,
    from_id: &str,
    to_id: &str,
) -> Result<MoveResult, GraphError> {
    for id in [from_id, to_id] {
        if repo::get_node(ctx, id).await?.is_none() {
            return Err(GraphError::node_not_found(id));
        }
    }
    if from_id == to_id {
        return Err(GraphError::validation(
            "cannot move relationships onto the same node",
        ));
    }

    type EdgeKey = (Option<String>, Option<String>, String);
    let key_of = |e: &Edge| -> EdgeKey {
        (e.source_id.clone(), e.target_id.clone(), e.edge_type.clone())
    };

    let edges = decode_all(ctx).await?;
    let mut existing: HashSet<EdgeKey> = edges.iter().map(key_of).collect();
    let mut result = MoveResult::default();

    for edge in edges.into_iter().filter(|e| e.touches(from_id)) {
        let remap = |endpoint: &Option<String>| match endpoint.as_deref() {
            Some(id) if id == from_id => Some(to_id.to_string()),
            _ => endpoint.clone(),
        };
        let new_source = remap(&edge.source_id);
        let new_target = remap(&edge.target_id);

        if new_source.is_some() && new_source == new_target {
            result.skipped += 1;
            continue;
        }
        let new_key = (new_source.clone(), new_target.clone(), edge.edge_type.clone());
        if existing.contains(&new_key) {
            result.skipped += 1;
            continue;
        }

        let mut update = EdgeUpdate::new();
        if new_source != edge.source_id {
            update.source_id = Some(new_source);
        }
        if new_target != edge.target_id {
            update.target_id = Some(new_target);
        }
        repo::update_edge(ctx, &edge.id, update).await?;

        existing.remove(&key_of(&edge));
        existing.insert(new_key);
        result.moved += 1;
    }

    tracing::debug!(
        "Moved {} relationships from {} to {} ({} skipped)",
        result.moved,
        from_id,
        to_id,
        result.skipped
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn node(id: &str) -> Node {
        Node {
            id: id.into(),
            node_type: RELATIONSHIP_TYPE.into(),
            label: "owns".into(),
            properties: Properties::new(),
            is_independent: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn relay(id: &str, source: &str, target: &str) -> Edge {
        Edge {
            id: id.into(),
            source_id: Some(source.into()),
            target_id: Some(target.into()),
            edge_type: RELAY.into(),
            properties: Properties::new(),
            created_at: Utc::now(),
            encoding: EdgeEncoding::Plain,
        }
    }

    #[test]
    fn test_classify_well_formed_in_any_order() {
        let relays = vec![relay("out", "r", "b"), relay("in", "a", "r")];
        let EdgeHandle::Structured(parts) = classify(node("r"), relays) else {
            panic!("expected structured");
        };

        let edge = parts.to_edge();
        assert_eq!(edge.source_id.as_deref(), Some("a"));
        assert_eq!(edge.target_id.as_deref(), Some("b"));
        assert_eq!(edge.edge_type, "owns");
        assert_eq!(
            edge.encoding,
            EdgeEncoding::Structured {
                relationship_node_id: "r".into(),
                relay_edge_ids: ("in".into(), "out".into()),
            }
        );
    }

    #[test]
    fn test_classify_rejects_wrong_relay_shapes() {
        // only one relay
        assert!(matches!(
            classify(node("r"), vec![relay("in", "a", "r")]),
            EdgeHandle::Malformed { .. }
        ));

        // two incoming relays
        let handle = classify(node("r"), vec![relay("in1", "a", "r"), relay("in2", "b", "r")]);
        match handle {
            EdgeHandle::Malformed { relay_ids, .. } => assert_eq!(relay_ids, vec!["in1", "in2"]),
            other => panic!("expected malformed, got {:?}", other),
        }

        // three relays
        let relays = vec![
            relay("in", "a", "r"),
            relay("out", "r", "b"),
            relay("extra", "r", "c"),
        ];
        assert!(matches!(
            classify(node("r"), relays),
            EdgeHandle::Malformed { .. }
        ));
    }

    #[test]
    fn test_structured_view_carries_node_properties() {
        let mut rel = node("r");
        rel.properties.insert("since".into(), json!(2020));
        let relays = vec![relay("in", "a", "r"), relay("out", "r", "b")];

        let EdgeHandle::Structured(parts) = classify(rel, relays) else {
            panic!("expected structured");
        };
        assert_eq!(parts.to_edge().properties["since"], json!(2020));
        assert!(parts.to_edge().is_structured());
    }
}
