//! Exchange, Report and Statistics Types
//!
//! JSON exchange format:
//!
//! ```json
//! { "data": { "nodes": [...], "edges": [...] },
//!   "metadata": { "version": "1.0", "created_at": "2024-01-01T00:00:00Z" } }
//! ```
//!
//! Exports are raw: relationship nodes and relay edges appear as ordinary
//! nodes and edges so that an import reproduces the stored encoding exactly.

use crate::models::{Edge, Node};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Version written into export metadata
pub const EXPORT_FORMAT_VERSION: &str = "1.0";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphExport {
    pub data: GraphData,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ExportMetadata>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphData {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportMetadata {
    pub version: String,
    pub created_at: DateTime<Utc>,
}

impl ExportMetadata {
    pub fn current() -> Self {
        Self {
            version: EXPORT_FORMAT_VERSION.to_string(),
            created_at: Utc::now(),
        }
    }
}

/// How `import_from_json` treats existing data
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ImportMode {
    /// Truncate every table, then insert
    Replace,
    /// Update entities whose id exists, insert the rest
    #[default]
    Merge,
}

impl std::str::FromStr for ImportMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "replace" => Ok(ImportMode::Replace),
            "merge" => Ok(ImportMode::Merge),
            other => Err(format!("unknown import mode '{}'", other)),
        }
    }
}

/// Outcome of an import; per-item failures are collected, not thrown
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImportResult {
    /// False when any item was skipped
    pub success: bool,
    pub nodes_imported: usize,
    pub edges_imported: usize,
    pub errors: Vec<String>,
}

/// Outcome of `validate_structured_relationships`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub relationship_nodes: usize,
    pub valid: usize,
    pub invalid: usize,
    /// RELAY edges not attached to any relationship node
    pub orphaned_relays: Vec<String>,
    pub errors: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.invalid == 0 && self.orphaned_relays.is_empty()
    }
}

/// Outcome of `move_relationships`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveResult {
    pub moved: usize,
    /// Edges left in place because moving them would create a self-loop or
    /// an exact duplicate
    pub skipped: usize,
}

/// Counts of logical entities (internal encodings excluded)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphStats {
    pub node_count: usize,
    pub edge_count: usize,
    pub structured_relationship_count: usize,
    pub nodes_by_type: BTreeMap<String, usize>,
    pub edges_by_type: BTreeMap<String, usize>,
}
