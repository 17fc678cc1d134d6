//! Data Models
//!
//! Nodes, logical edges, search criteria and exchange/report types.

mod edge;
mod exchange;
mod node;
mod search;

/// Arbitrary JSON attributes of a node or edge
pub type Properties = serde_json::Map<String, serde_json::Value>;

pub use edge::{Direction, Edge, EdgeEncoding, EdgeUpdate, NewEdge, RELATIONSHIP_TYPE, RELAY};
pub use exchange::{
    ExportMetadata, GraphData, GraphExport, GraphStats, ImportMode, ImportResult, MoveResult,
    ValidationReport, EXPORT_FORMAT_VERSION,
};
pub use node::{DeleteMode, NewNode, Node, NodeUpdate};
pub use search::{
    EdgeSearchCriteria, FilterOperator, FullTextOptions, FullTextResult, NodeSearchCriteria,
    PropertyFilter, SearchResult, SortDirection, SortKey,
};
