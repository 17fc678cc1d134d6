//! Entity Repository
//!
//! Node and edge CRUD on top of the relational schema. Every function takes
//! the [`TxContext`] of the transaction (or serialized read) it runs in; the
//! public facade opens that context through the coordinator.
//!
//! Two layers live here:
//!
//! - row primitives (`fetch_*_raw`, `write_*`, `delete_*_row`) that see the
//!   stored encoding, relationship nodes and relay edges included
//! - logical operations (`add_node`, `get_edge`, ...) that hide the internal
//!   encoding and route anything touching a relationship node through
//!   [`structured`]
//!
//! # Label independence
//!
//! `RELATIONSHIP_TYPE` nodes are excluded from every label query, so they
//! never hold or block a label.

use crate::db::{DatabaseError, Row, SqlValue, TxContext};
use crate::models::{
    DeleteMode, Direction, Edge, EdgeEncoding, EdgeUpdate, NewEdge, NewNode, Node, NodeUpdate,
    Properties, RELATIONSHIP_TYPE, RELAY,
};
use crate::services::property_store::{self, PropertyOwner};
use crate::services::structured::{self, EdgeHandle};
use crate::services::GraphError;
use crate::sql_params;
use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;

const NODE_COLUMNS: &str = "id, type, label, is_independent, created_at, updated_at";
const EDGE_COLUMNS: &str = "id, source_id, target_id, type, created_at";

/// Fixed-width RFC 3339 so stored timestamps order lexicographically
pub(crate) fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| DatabaseError::row_decode(format!("invalid timestamp '{}': {}", raw, e)))
}

fn node_from_row(row: &Row, properties: Properties) -> Result<Node, DatabaseError> {
    Ok(Node {
        id: row.text(0)?,
        node_type: row.text(1)?,
        label: row.text(2)?,
        properties,
        is_independent: row.boolean(3)?,
        created_at: parse_timestamp(&row.text(4)?)?,
        updated_at: parse_timestamp(&row.text(5)?)?,
    })
}

fn edge_from_row(row: &Row, properties: Properties) -> Result<Edge, DatabaseError> {
    Ok(Edge {
        id: row.text(0)?,
        source_id: row.opt_text(1)?,
        target_id: row.opt_text(2)?,
        edge_type: row.text(3)?,
        properties,
        created_at: parse_timestamp(&row.text(4)?)?,
        encoding: EdgeEncoding::Plain,
    })
}

// ---------------------------------------------------------------------------
// Row primitives
// ---------------------------------------------------------------------------

/// Stored node by id, relationship nodes included
pub(crate) async fn fetch_node_raw(ctx: &TxContext, id: &str) -> Result<Option<Node>, GraphError> {
    let sql = format!("SELECT {} FROM nodes WHERE id = ?", NODE_COLUMNS);
    let Some(row) = ctx.query_one(&sql, sql_params![id]).await? else {
        return Ok(None);
    };
    let properties = property_store::load(ctx, PropertyOwner::Node, id).await?;
    Ok(Some(node_from_row(&row, properties)?))
}

/// Stored nodes matching `where_clause`, ordered by (created_at, id)
pub(crate) async fn fetch_nodes_where(
    ctx: &TxContext,
    where_clause: &str,
    params: Vec<SqlValue>,
) -> Result<Vec<Node>, GraphError> {
    let sql = format!(
        "SELECT {} FROM nodes WHERE {} ORDER BY created_at, id",
        NODE_COLUMNS, where_clause
    );
    let rows = ctx.query(&sql, params).await?;
    if rows.is_empty() {
        return Ok(Vec::new());
    }

    let mut all_properties = property_store::load_all(ctx, PropertyOwner::Node).await?;
    rows.iter()
        .map(|row| -> Result<Node, GraphError> {
            let properties = all_properties.remove(&row.text(0)?).unwrap_or_default();
            Ok(node_from_row(row, properties)?)
        })
        .collect()
}

/// Every stored node, relationship nodes included
pub(crate) async fn fetch_nodes_raw(ctx: &TxContext) -> Result<Vec<Node>, GraphError> {
    fetch_nodes_where(ctx, "1 = 1", sql_params![]).await
}

/// Nodes visible through the public API
pub(crate) async fn fetch_visible_nodes(ctx: &TxContext) -> Result<Vec<Node>, GraphError> {
    fetch_nodes_where(ctx, "type != ?", sql_params![RELATIONSHIP_TYPE]).await
}

/// Stored edge row by id, relays included
pub(crate) async fn fetch_edge_raw(ctx: &TxContext, id: &str) -> Result<Option<Edge>, GraphError> {
    let sql = format!("SELECT {} FROM relationships WHERE id = ?", EDGE_COLUMNS);
    let Some(row) = ctx.query_one(&sql, sql_params![id]).await? else {
        return Ok(None);
    };
    let properties = property_store::load(ctx, PropertyOwner::Relationship, id).await?;
    Ok(Some(edge_from_row(&row, properties)?))
}

async fn fetch_edges_where(
    ctx: &TxContext,
    where_clause: &str,
    params: Vec<SqlValue>,
) -> Result<Vec<Edge>, GraphError> {
    let sql = format!(
        "SELECT {} FROM relationships WHERE {} ORDER BY created_at, id",
        EDGE_COLUMNS, where_clause
    );
    let rows = ctx.query(&sql, params).await?;
    if rows.is_empty() {
        return Ok(Vec::new());
    }

    let mut all_properties = property_store::load_all(ctx, PropertyOwner::Relationship).await?;
    rows.iter()
        .map(|row| -> Result<Edge, GraphError> {
            let properties = all_properties.remove(&row.text(0)?).unwrap_or_default();
            Ok(edge_from_row(row, properties)?)
        })
        .collect()
}

/// Every stored edge row, relays included
pub(crate) async fn fetch_edges_raw(ctx: &TxContext) -> Result<Vec<Edge>, GraphError> {
    fetch_edges_where(ctx, "1 = 1", sql_params![]).await
}

/// Stored edge rows with `node_id` as source or target
pub(crate) async fn fetch_edges_touching_raw(
    ctx: &TxContext,
    node_id: &str,
) -> Result<Vec<Edge>, GraphError> {
    fetch_edges_where(
        ctx,
        "source_id = ? OR target_id = ?",
        sql_params![node_id, node_id],
    )
    .await
}

/// Insert a node row and its properties
pub(crate) async fn write_node(ctx: &TxContext, node: &Node) -> Result<(), GraphError> {
    ctx.run(
        "INSERT INTO nodes (id, type, label, is_independent, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?)",
        sql_params![
            &node.id,
            &node.node_type,
            &node.label,
            node.is_independent,
            format_timestamp(&node.created_at),
            format_timestamp(&node.updated_at)
        ],
    )
    .await
    .map_err(|e| GraphError::node_write(&node.id, e))?;

    property_store::insert(ctx, PropertyOwner::Node, &node.id, &node.properties).await
}

/// Overwrite the columns of an existing node row (properties untouched)
pub(crate) async fn update_node_row(ctx: &TxContext, node: &Node) -> Result<(), GraphError> {
    ctx.run(
        "UPDATE nodes SET type = ?, label = ?, is_independent = ?, created_at = ?, updated_at = ?
         WHERE id = ?",
        sql_params![
            &node.node_type,
            &node.label,
            node.is_independent,
            format_timestamp(&node.created_at),
            format_timestamp(&node.updated_at),
            &node.id
        ],
    )
    .await
    .map_err(|e| GraphError::node_write(&node.id, e))?;
    Ok(())
}

pub(crate) async fn delete_node_row(ctx: &TxContext, id: &str) -> Result<(), GraphError> {
    property_store::delete_all(ctx, PropertyOwner::Node, id).await?;
    ctx.run("DELETE FROM nodes WHERE id = ?", sql_params![id])
        .await?;
    Ok(())
}

/// Insert an edge row and its properties
pub(crate) async fn write_edge(ctx: &TxContext, edge: &Edge) -> Result<(), GraphError> {
    ctx.run(
        "INSERT INTO relationships (id, source_id, target_id, type, created_at)
         VALUES (?, ?, ?, ?, ?)",
        sql_params![
            &edge.id,
            edge.source_id.as_deref(),
            edge.target_id.as_deref(),
            &edge.edge_type,
            format_timestamp(&edge.created_at)
        ],
    )
    .await?;

    property_store::insert(ctx, PropertyOwner::Relationship, &edge.id, &edge.properties).await
}

/// Overwrite the columns of an existing edge row (properties untouched)
pub(crate) async fn update_edge_row(ctx: &TxContext, edge: &Edge) -> Result<(), GraphError> {
    ctx.run(
        "UPDATE relationships SET source_id = ?, target_id = ?, type = ?, created_at = ?
         WHERE id = ?",
        sql_params![
            edge.source_id.as_deref(),
            edge.target_id.as_deref(),
            &edge.edge_type,
            format_timestamp(&edge.created_at),
            &edge.id
        ],
    )
    .await?;
    Ok(())
}

pub(crate) async fn delete_edge_row(ctx: &TxContext, id: &str) -> Result<(), GraphError> {
    property_store::delete_all(ctx, PropertyOwner::Relationship, id).await?;
    ctx.run("DELETE FROM relationships WHERE id = ?", sql_params![id])
        .await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Label bookkeeping
// ---------------------------------------------------------------------------

async fn has_independent_holder(
    ctx: &TxContext,
    label: &str,
    exclude_id: &str,
) -> Result<bool, GraphError> {
    Ok(ctx
        .query_one(
            "SELECT 1 FROM nodes
             WHERE label = ? AND is_independent = 1 AND id != ? AND type != ?
             LIMIT 1",
            sql_params![label, exclude_id, RELATIONSHIP_TYPE],
        )
        .await?
        .is_some())
}

/// Make `holder_id` the only independent node of `label`
pub(crate) async fn demote_siblings(ctx: &TxContext, label: &str, holder_id: &str) -> Result<(), GraphError> {
    ctx.run(
        "UPDATE nodes SET is_independent = 0
         WHERE label = ? AND id != ? AND type != ? AND is_independent = 1",
        sql_params![label, holder_id, RELATIONSHIP_TYPE],
    )
    .await?;
    Ok(())
}

/// Promote the oldest node of `label` when no node holds it any more
pub(crate) async fn repair_label_group(ctx: &TxContext, label: &str) -> Result<(), GraphError> {
    if has_independent_holder(ctx, label, "").await? {
        return Ok(());
    }

    let oldest = ctx
        .query_one(
            "SELECT id FROM nodes WHERE label = ? AND type != ?
             ORDER BY created_at, id LIMIT 1",
            sql_params![label, RELATIONSHIP_TYPE],
        )
        .await?;

    if let Some(row) = oldest {
        let id = row.text(0)?;
        ctx.run(
            "UPDATE nodes SET is_independent = 1 WHERE id = ?",
            sql_params![&id],
        )
        .await?;
        tracing::debug!("Promoted node {} to independent holder of '{}'", id, label);
    }
    Ok(())
}

/// Keep the oldest independent node of `label` and demote any others
pub(crate) async fn enforce_single_holder(ctx: &TxContext, label: &str) -> Result<(), GraphError> {
    let holder = ctx
        .query_one(
            "SELECT id FROM nodes WHERE label = ? AND is_independent = 1 AND type != ?
             ORDER BY created_at, id LIMIT 1",
            sql_params![label, RELATIONSHIP_TYPE],
        )
        .await?;

    if let Some(row) = holder {
        demote_siblings(ctx, label, &row.text(0)?).await?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Nodes
// ---------------------------------------------------------------------------

fn check_node_type(node_type: &str) -> Result<(), GraphError> {
    if node_type.is_empty() {
        return Err(GraphError::validation("node type must not be empty"));
    }
    if node_type == RELATIONSHIP_TYPE {
        return Err(GraphError::validation(format!(
            "node type '{}' is reserved for structured relationships",
            RELATIONSHIP_TYPE
        )));
    }
    Ok(())
}

/// Create a node through the public API
pub(crate) async fn add_node(ctx: &TxContext, new: NewNode) -> Result<Node, GraphError> {
    check_node_type(&new.node_type)?;
    insert_node(ctx, new).await
}

/// Create a node of any type, relationship nodes included
pub(crate) async fn insert_node(ctx: &TxContext, new: NewNode) -> Result<Node, GraphError> {
    let id = new.id.unwrap_or_else(|| Uuid::new_v4().to_string());
    let created_at = new.created_at.unwrap_or_else(Utc::now);
    let updated_at = new.updated_at.unwrap_or(created_at);

    let is_independent = if new.node_type == RELATIONSHIP_TYPE {
        false
    } else {
        match new.is_independent {
            Some(explicit) => explicit,
            None => !has_independent_holder(ctx, &new.label, &id).await?,
        }
    };

    let node = Node {
        id,
        node_type: new.node_type,
        label: new.label,
        properties: new.properties,
        is_independent,
        created_at,
        updated_at,
    };

    write_node(ctx, &node).await?;
    if node.is_independent {
        demote_siblings(ctx, &node.label, &node.id).await?;
    }

    tracing::debug!("Added node {} ({})", node.id, node.node_type);
    Ok(node)
}

/// Node visible through the public API
pub(crate) async fn get_node(ctx: &TxContext, id: &str) -> Result<Option<Node>, GraphError> {
    Ok(fetch_node_raw(ctx, id)
        .await?
        .filter(|node| !node.is_relationship_node()))
}

pub(crate) async fn get_nodes(ctx: &TxContext) -> Result<Vec<Node>, GraphError> {
    fetch_visible_nodes(ctx).await
}

pub(crate) async fn update_node(
    ctx: &TxContext,
    id: &str,
    update: NodeUpdate,
) -> Result<Node, GraphError> {
    let mut node = get_node(ctx, id)
        .await?
        .ok_or_else(|| GraphError::node_not_found(id))?;

    if let Some(node_type) = &update.node_type {
        check_node_type(node_type)?;
    }

    let old_label = node.label.clone();
    if let Some(node_type) = update.node_type {
        node.node_type = node_type;
    }
    if let Some(label) = update.label {
        node.label = label;
    }
    let relabeled = node.label != old_label;

    match update.is_independent {
        Some(explicit) => node.is_independent = explicit,
        None if relabeled => {
            node.is_independent = !has_independent_holder(ctx, &node.label, &node.id).await?;
        }
        None => {}
    }
    node.updated_at = Utc::now();

    update_node_row(ctx, &node).await?;
    if let Some(properties) = update.properties {
        property_store::replace(ctx, PropertyOwner::Node, &node.id, &properties).await?;
        node.properties = properties;
    }

    if node.is_independent {
        demote_siblings(ctx, &node.label, &node.id).await?;
    }
    if relabeled {
        repair_label_group(ctx, &old_label).await?;
    }

    tracing::debug!("Updated node {}", node.id);
    Ok(node)
}

pub(crate) async fn delete_node(
    ctx: &TxContext,
    id: &str,
    mode: DeleteMode,
) -> Result<(), GraphError> {
    let node = fetch_node_raw(ctx, id)
        .await?
        .ok_or_else(|| GraphError::node_not_found(id))?;

    if node.is_relationship_node() {
        // Relationship nodes always take their relays with them
        structured::cascade_delete(ctx, id).await?;
        return Ok(());
    }

    match mode {
        DeleteMode::KeepConnected => {
            ctx.run(
                "UPDATE relationships SET source_id = NULL WHERE source_id = ?",
                sql_params![id],
            )
            .await?;
            ctx.run(
                "UPDATE relationships SET target_id = NULL WHERE target_id = ?",
                sql_params![id],
            )
            .await?;
            delete_node_row(ctx, id).await?;
        }
        DeleteMode::Cascade => {
            structured::cascade_delete(ctx, id).await?;
        }
    }

    if node.is_independent {
        repair_label_group(ctx, &node.label).await?;
    }

    tracing::debug!("Deleted node {} ({:?})", id, mode);
    Ok(())
}

// ---------------------------------------------------------------------------
// Edges
// ---------------------------------------------------------------------------

fn check_edge_type(edge_type: &str) -> Result<(), GraphError> {
    if edge_type.is_empty() {
        return Err(GraphError::validation("edge type must not be empty"));
    }
    if edge_type == RELAY {
        return Err(GraphError::validation(format!(
            "edge type '{}' is reserved for structured relationships",
            RELAY
        )));
    }
    Ok(())
}

/// Endpoint a logical edge may point at
pub(crate) async fn check_endpoint(ctx: &TxContext, node_id: &str) -> Result<(), GraphError> {
    match fetch_node_raw(ctx, node_id).await? {
        None => Err(GraphError::node_not_found(node_id)),
        Some(node) if node.is_relationship_node() => Err(GraphError::validation(format!(
            "node {} is a relationship node and cannot be an edge endpoint",
            node_id
        ))),
        Some(_) => Ok(()),
    }
}

/// Create a plain edge through the public API
pub(crate) async fn add_edge(ctx: &TxContext, new: NewEdge) -> Result<Edge, GraphError> {
    check_edge_type(&new.edge_type)?;
    for endpoint in [&new.source_id, &new.target_id].into_iter().flatten() {
        check_endpoint(ctx, endpoint).await?;
    }
    insert_edge(ctx, new).await
}

/// Create an edge row of any type, relays included
pub(crate) async fn insert_edge(ctx: &TxContext, new: NewEdge) -> Result<Edge, GraphError> {
    let edge = Edge {
        id: new.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
        source_id: new.source_id,
        target_id: new.target_id,
        edge_type: new.edge_type,
        properties: new.properties,
        created_at: new.created_at.unwrap_or_else(Utc::now),
        encoding: EdgeEncoding::Plain,
    };

    write_edge(ctx, &edge).await?;
    tracing::debug!("Added edge {} ({})", edge.id, edge.edge_type);
    Ok(edge)
}

/// Logical edge by id: plain edges and well-formed structured relationships
pub(crate) async fn get_edge(ctx: &TxContext, id: &str) -> Result<Option<Edge>, GraphError> {
    Ok(match structured::resolve(ctx, id).await? {
        Some(EdgeHandle::Plain(edge)) => Some(edge),
        Some(EdgeHandle::Structured(parts)) => Some(parts.to_edge()),
        Some(EdgeHandle::Relay { .. }) | Some(EdgeHandle::Malformed { .. }) | None => None,
    })
}

pub(crate) async fn get_edges(ctx: &TxContext) -> Result<Vec<Edge>, GraphError> {
    structured::decode_all(ctx).await
}

/// Logical edges touching a visible node
pub(crate) async fn get_node_edges(
    ctx: &TxContext,
    node_id: &str,
    direction: Direction,
) -> Result<Vec<Edge>, GraphError> {
    if get_node(ctx, node_id).await?.is_none() {
        return Err(GraphError::node_not_found(node_id));
    }
    Ok(structured::decode_all(ctx)
        .await?
        .into_iter()
        .filter(|edge| direction.matches(edge, node_id))
        .collect())
}

pub(crate) async fn update_edge(
    ctx: &TxContext,
    id: &str,
    update: EdgeUpdate,
) -> Result<Edge, GraphError> {
    match structured::resolve(ctx, id).await? {
        None => Err(GraphError::edge_not_found(id)),
        Some(EdgeHandle::Plain(edge)) => update_plain_edge(ctx, edge, update).await,
        Some(EdgeHandle::Structured(parts)) => structured::update(ctx, parts, update).await,
        Some(EdgeHandle::Relay { .. }) => Err(GraphError::validation(format!(
            "edge {} is a relay of a structured relationship; update the relationship instead",
            id
        ))),
        Some(EdgeHandle::Malformed { node, .. }) => Err(GraphError::validation(format!(
            "structured relationship {} is malformed and cannot be updated",
            node.id
        ))),
    }
}

async fn update_plain_edge(
    ctx: &TxContext,
    mut edge: Edge,
    update: EdgeUpdate,
) -> Result<Edge, GraphError> {
    if let Some(edge_type) = update.edge_type {
        check_edge_type(&edge_type)?;
        edge.edge_type = edge_type;
    }
    if let Some(source_id) = update.source_id {
        if let Some(id) = &source_id {
            check_endpoint(ctx, id).await?;
        }
        edge.source_id = source_id;
    }
    if let Some(target_id) = update.target_id {
        if let Some(id) = &target_id {
            check_endpoint(ctx, id).await?;
        }
        edge.target_id = target_id;
    }

    update_edge_row(ctx, &edge).await?;
    if let Some(properties) = update.properties {
        property_store::replace(ctx, PropertyOwner::Relationship, &edge.id, &properties).await?;
        edge.properties = properties;
    }

    tracing::debug!("Updated edge {}", edge.id);
    Ok(edge)
}

/// Delete a logical edge; relay and relationship-node ids remove the whole
/// structured relationship
pub(crate) async fn delete_edge(ctx: &TxContext, id: &str) -> Result<(), GraphError> {
    match structured::resolve(ctx, id).await? {
        None => return Err(GraphError::edge_not_found(id)),
        Some(EdgeHandle::Plain(edge)) => delete_edge_row(ctx, &edge.id).await?,
        Some(EdgeHandle::Relay {
            relationship_node_id: Some(owner),
            ..
        }) => {
            structured::cascade_delete(ctx, &owner).await?;
        }
        Some(EdgeHandle::Relay {
            edge,
            relationship_node_id: None,
        }) => delete_edge_row(ctx, &edge.id).await?,
        Some(EdgeHandle::Structured(parts)) => {
            structured::cascade_delete(ctx, &parts.node.id).await?;
        }
        Some(EdgeHandle::Malformed { node, .. }) => {
            structured::cascade_delete(ctx, &node.id).await?;
        }
    }

    tracing::debug!("Deleted edge {}", id);
    Ok(())
}
