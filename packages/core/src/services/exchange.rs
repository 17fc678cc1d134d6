//! JSON Export and Import
//!
//! Exports are raw: relationship nodes and relay edges are written as
//! ordinary entries, so importing an export with `Replace` reproduces the
//! stored graph exactly.
//!
//! Import is all-or-nothing for malformed payloads (parse and structure
//! errors abort before anything is written) and best-effort per item after
//! that: an edge whose endpoints are neither imported nor already stored is
//! skipped and reported in `ImportResult::errors`.
//!
//! Both modes leave at most one independent node per label. A merged node
//! takes its label over like `add_node` does, and a label vacated by a merge
//! update is repaired.

use crate::db::TxContext;
use crate::models::{
    Edge, ExportMetadata, GraphData, GraphExport, ImportMode, ImportResult, Node,
};
use crate::services::entity_repository as repo;
use crate::services::property_store::{self, PropertyOwner};
use crate::services::GraphError;
use crate::sql_params;
use std::collections::{BTreeSet, HashSet};

/// Tables in delete order (property tables before their owners)
const TABLES: [&str; 4] = [
    "relationship_properties",
    "relationships",
    "node_properties",
    "nodes",
];

/// Snapshot of every stored node and edge
pub(crate) async fn export_graph(
    ctx: &TxContext,
    include_metadata: bool,
) -> Result<GraphExport, GraphError> {
    let nodes = repo::fetch_nodes_raw(ctx).await?;
    let edges = repo::fetch_edges_raw(ctx).await?;

    tracing::debug!("Exporting {} nodes and {} edges", nodes.len(), edges.len());
    Ok(GraphExport {
        data: GraphData { nodes, edges },
        metadata: include_metadata.then(ExportMetadata::current),
    })
}

/// Parse an exchange document; any parse or shape error is a validation error
pub(crate) fn parse_export(json: &str) -> Result<GraphExport, GraphError> {
    let export: GraphExport = serde_json::from_str(json)
        .map_err(|e| GraphError::validation(format!("invalid import document: {}", e)))?;
    validate_structure(&export)?;
    Ok(export)
}

/// Checks that must pass before anything is written
pub(crate) fn validate_structure(export: &GraphExport) -> Result<(), GraphError> {
    let mut node_ids = HashSet::new();
    for (idx, node) in export.data.nodes.iter().enumerate() {
        if node.id.is_empty() {
            return Err(GraphError::validation(format!("node #{} has an empty id", idx)));
        }
        if node.node_type.is_empty() {
            return Err(GraphError::validation(format!(
                "node {} has an empty type",
                node.id
            )));
        }
        if !node_ids.insert(node.id.as_str()) {
            return Err(GraphError::validation(format!(
                "node {} appears more than once",
                node.id
            )));
        }
    }

    let mut edge_ids = HashSet::new();
    for (idx, edge) in export.data.edges.iter().enumerate() {
        if edge.id.is_empty() {
            return Err(GraphError::validation(format!("edge #{} has an empty id", idx)));
        }
        if edge.edge_type.is_empty() {
            return Err(GraphError::validation(format!(
                "edge {} has an empty type",
                edge.id
            )));
        }
        if !edge_ids.insert(edge.id.as_str()) {
            return Err(GraphError::validation(format!(
                "edge {} appears more than once",
                edge.id
            )));
        }
    }
    Ok(())
}

/// Remove every node, edge and property
pub(crate) async fn clear(ctx: &TxContext) -> Result<(), GraphError> {
    for table in TABLES {
        ctx.run(&format!("DELETE FROM {}", table), sql_params![])
            .await?;
    }
    Ok(())
}

/// Write one node; returns the label it held before a merge update
async fn upsert_node(
    ctx: &TxContext,
    node: &Node,
    mode: ImportMode,
) -> Result<Option<String>, GraphError> {
    let existing = match mode {
        ImportMode::Merge => repo::fetch_node_raw(ctx, &node.id).await?,
        ImportMode::Replace => None,
    };

    if existing.is_some() {
        repo::update_node_row(ctx, node).await?;
        property_store::replace(ctx, PropertyOwner::Node, &node.id, &node.properties).await?;
    } else {
        repo::write_node(ctx, node).await?;
    }

    // Merged nodes take over their label like any other write
    if mode == ImportMode::Merge && node.is_independent && !node.is_relationship_node() {
        repo::demote_siblings(ctx, &node.label, &node.id).await?;
    }
    Ok(existing
        .filter(|old| old.label != node.label && !old.is_relationship_node())
        .map(|old| old.label))
}

async fn upsert_edge(ctx: &TxContext, edge: &Edge, mode: ImportMode) -> Result<(), GraphError> {
    let exists = mode == ImportMode::Merge
        && ctx
            .query_one(
                "SELECT 1 FROM relationships WHERE id = ?",
                sql_params![&edge.id],
            )
            .await?
            .is_some();

    if exists {
        repo::update_edge_row(ctx, edge).await?;
        property_store::replace(ctx, PropertyOwner::Relationship, &edge.id, &edge.properties)
            .await
    } else {
        repo::write_edge(ctx, edge).await
    }
}

/// Write a validated export; per-item failures are collected
pub(crate) async fn import_graph(
    ctx: &TxContext,
    export: GraphExport,
    mode: ImportMode,
) -> Result<ImportResult, GraphError> {
    validate_structure(&export)?;

    if mode == ImportMode::Replace {
        clear(ctx).await?;
    }

    let mut result = ImportResult::default();
    let mut known_nodes: HashSet<String> = HashSet::new();
    if mode == ImportMode::Merge {
        for row in ctx.query("SELECT id FROM nodes", sql_params![]).await? {
            known_nodes.insert(row.text(0)?);
        }
    }

    let mut touched_labels: BTreeSet<String> = BTreeSet::new();
    let mut vacated_labels: BTreeSet<String> = BTreeSet::new();
    for node in &export.data.nodes {
        match upsert_node(ctx, node, mode).await {
            Ok(old_label) => {
                known_nodes.insert(node.id.clone());
                if !node.is_relationship_node() {
                    touched_labels.insert(node.label.clone());
                }
                vacated_labels.extend(old_label);
                result.nodes_imported += 1;
            }
            Err(e) => result.errors.push(format!("node {}: {}", node.id, e)),
        }
    }

    // Documents may carry several independent holders of one label
    for label in &touched_labels {
        repo::enforce_single_holder(ctx, label).await?;
    }
    for label in &vacated_labels {
        repo::repair_label_group(ctx, label).await?;
    }

    for edge in &export.data.edges {
        let missing = [&edge.source_id, &edge.target_id]
            .into_iter()
            .flatten()
            .find(|id| !known_nodes.contains(id.as_str()));
        if let Some(missing) = missing {
            result.errors.push(format!(
                "edge {}: node {} does not exist",
                edge.id, missing
            ));
            continue;
        }

        let mut edge = edge.clone();
        edge.encoding = Default::default();
        match upsert_edge(ctx, &edge, mode).await {
            Ok(()) => result.edges_imported += 1,
            Err(e) => result.errors.push(format!("edge {}: {}", edge.id, e)),
        }
    }

    result.success = result.errors.is_empty();
    tracing::info!(
        "Imported {} nodes and {} edges ({:?}, {} errors)",
        result.nodes_imported,
        result.edges_imported,
        mode,
        result.errors.len()
    );
    Ok(result)
}
