//! Structured Relationship Validation and Statistics
//!
//! The validator inspects the stored encoding directly and reports every
//! violation as text. Data problems never fail the call; only storage errors
//! do.

use crate::db::TxContext;
use crate::models::{Edge, GraphStats, Node, ValidationReport};
use crate::services::entity_repository as repo;
use crate::services::structured;
use crate::services::GraphError;
use std::collections::{HashMap, HashSet};

pub(crate) async fn validate_structured_relationships(
    ctx: &TxContext,
) -> Result<ValidationReport, GraphError> {
    let nodes = repo::fetch_nodes_raw(ctx).await?;
    let edges = repo::fetch_edges_raw(ctx).await?;
    let report = build_report(&nodes, &edges);

    if report.is_valid() {
        tracing::debug!(
            "Validated {} structured relationships",
            report.relationship_nodes
        );
    } else {
        tracing::warn!(
            "Structured relationship validation found {} problems",
            report.errors.len()
        );
    }
    Ok(report)
}

fn build_report(nodes: &[Node], edges: &[Edge]) -> ValidationReport {
    let by_id: HashMap<&str, &Node> = nodes.iter().map(|n| (n.id.as_str(), n)).collect();
    let relationship_ids: HashSet<&str> = nodes
        .iter()
        .filter(|n| n.is_relationship_node())
        .map(|n| n.id.as_str())
        .collect();
    let relays: Vec<&Edge> = edges.iter().filter(|e| e.is_relay()).collect();

    let mut report = ValidationReport::default();

    for node in nodes.iter().filter(|n| n.is_relationship_node()) {
        report.relationship_nodes += 1;
        let id = node.id.as_str();
        let mut problems = Vec::new();

        let incoming: Vec<&&Edge> = relays
            .iter()
            .filter(|r| r.target_id.as_deref() == Some(id))
            .collect();
        let outgoing: Vec<&&Edge> = relays
            .iter()
            .filter(|r| r.source_id.as_deref() == Some(id))
            .collect();

        if incoming.len() != 1 {
            problems.push(format!(
                "relationship {} has {} incoming RELAY edges (expected 1)",
                id,
                incoming.len()
            ));
        }
        if outgoing.len() != 1 {
            problems.push(format!(
                "relationship {} has {} outgoing RELAY edges (expected 1)",
                id,
                outgoing.len()
            ));
        }

        if let ([relay_in], [relay_out]) = (incoming.as_slice(), outgoing.as_slice()) {
            let source = relay_in.source_id.as_deref();
            let target = relay_out.target_id.as_deref();

            for (role, endpoint) in [("source", source), ("target", target)] {
                match endpoint {
                    None => problems.push(format!("relationship {} has no {}", id, role)),
                    Some(endpoint_id) if !by_id.contains_key(endpoint_id) => problems.push(
                        format!("relationship {} {} {} does not exist", id, role, endpoint_id),
                    ),
                    Some(_) => {}
                }
            }
            if source.is_some() && source == target {
                problems.push(format!(
                    "relationship {} is a self-loop on {}",
                    id,
                    source.unwrap_or_default()
                ));
            }
        }

        if problems.is_empty() {
            report.valid += 1;
        } else {
            report.invalid += 1;
            report.errors.extend(problems);
        }
    }

    for relay in relays {
        let attached = [&relay.source_id, &relay.target_id]
            .into_iter()
            .flatten()
            .any(|endpoint| relationship_ids.contains(endpoint.as_str()));
        if !attached {
            report.orphaned_relays.push(relay.id.clone());
            report.errors.push(format!(
                "RELAY edge {} is not attached to a relationship node",
                relay.id
            ));
        }
    }

    report
}

/// Counts of logical nodes and edges
pub(crate) async fn graph_stats(ctx: &TxContext) -> Result<GraphStats, GraphError> {
    let nodes = repo::fetch_visible_nodes(ctx).await?;
    let edges = structured::decode_all(ctx).await?;

    let mut stats = GraphStats {
        node_count: nodes.len(),
        edge_count: edges.len(),
        ..Default::default()
    };
    for node in &nodes {
        *stats.nodes_by_type.entry(node.node_type.clone()).or_default() += 1;
    }
    for edge in &edges {
        if edge.is_structured() {
            stats.structured_relationship_count += 1;
        }
        *stats.edges_by_type.entry(edge.edge_type.clone()).or_default() += 1;
    }
    Ok(stats)
}
