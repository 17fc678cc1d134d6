//! Property Store
//!
//! Entity-attribute-value storage for node and relationship properties. Each
//! entry is `(owner_id, key, value)` where `value` is the JSON encoding of the
//! property; keys are unique per owner.

use crate::db::{SqlValue, TxContext};
use crate::models::Properties;
use crate::services::GraphError;
use crate::sql_params;
use serde_json::Value;
use std::collections::HashMap;

/// Which table family a property set belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyOwner {
    Node,
    Relationship,
}

impl PropertyOwner {
    fn table(&self) -> &'static str {
        match self {
            PropertyOwner::Node => "node_properties",
            PropertyOwner::Relationship => "relationship_properties",
        }
    }

    fn owner_column(&self) -> &'static str {
        match self {
            PropertyOwner::Node => "node_id",
            PropertyOwner::Relationship => "relationship_id",
        }
    }
}

/// Decode a stored value; text that is not valid JSON is kept as a string
fn decode_value(raw: String) -> Value {
    match serde_json::from_str(&raw) {
        Ok(value) => value,
        Err(_) => {
            tracing::debug!("Stored property value is not JSON, keeping it as text");
            Value::String(raw)
        }
    }
}

/// Properties of one owner
pub async fn load(
    ctx: &TxContext,
    owner: PropertyOwner,
    owner_id: &str,
) -> Result<Properties, GraphError> {
    let sql = format!(
        "SELECT key, value FROM {} WHERE {} = ? ORDER BY key",
        owner.table(),
        owner.owner_column()
    );
    let rows = ctx.query(&sql, sql_params![owner_id]).await?;

    let mut properties = Properties::new();
    for row in rows {
        properties.insert(row.text(0)?, decode_value(row.text(1)?));
    }
    Ok(properties)
}

/// Properties of every owner in the table, keyed by owner id
pub async fn load_all(
    ctx: &TxContext,
    owner: PropertyOwner,
) -> Result<HashMap<String, Properties>, GraphError> {
    let sql = format!(
        "SELECT {}, key, value FROM {} ORDER BY {}, key",
        owner.owner_column(),
        owner.table(),
        owner.owner_column()
    );
    let rows = ctx.query(&sql, sql_params![]).await?;

    let mut all: HashMap<String, Properties> = HashMap::new();
    for row in rows {
        all.entry(row.text(0)?)
            .or_default()
            .insert(row.text(1)?, decode_value(row.text(2)?));
    }
    Ok(all)
}

/// Write entries for an owner that has none yet
pub async fn insert(
    ctx: &TxContext,
    owner: PropertyOwner,
    owner_id: &str,
    properties: &Properties,
) -> Result<(), GraphError> {
    let sql = format!(
        "INSERT INTO {} ({}, key, value) VALUES (?, ?, ?)",
        owner.table(),
        owner.owner_column()
    );
    for (key, value) in properties {
        let encoded = serde_json::to_string(value)?;
        ctx.run(
            &sql,
            vec![
                SqlValue::from(owner_id),
                SqlValue::from(key),
                SqlValue::from(encoded),
            ],
        )
        .await?;
    }
    Ok(())
}

/// Replace the whole property set of an owner
pub async fn replace(
    ctx: &TxContext,
    owner: PropertyOwner,
    owner_id: &str,
    properties: &Properties,
) -> Result<(), GraphError> {
    delete_all(ctx, owner, owner_id).await?;
    insert(ctx, owner, owner_id, properties).await
}

pub async fn delete_all(
    ctx: &TxContext,
    owner: PropertyOwner,
    owner_id: &str,
) -> Result<(), GraphError> {
    let sql = format!(
        "DELETE FROM {} WHERE {} = ?",
        owner.table(),
        owner.owner_column()
    );
    ctx.run(&sql, sql_params![owner_id]).await?;
    Ok(())
}
