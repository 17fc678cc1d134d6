//! Graph Services
//!
//! - `GraphDatabase` - public facade; every call runs through the
//!   transaction coordinator
//! - `entity_repository` - node and edge CRUD, label independence
//! - `structured` - encoding of property-bearing relationships
//! - `property_store` - per-entity JSON attributes
//! - `traversal`, `search` - path finding, neighborhoods, criteria and
//!   full-text search
//! - `exchange`, `integrity` - JSON import/export, validation and stats

mod entity_repository;
pub mod error;
mod exchange;
mod graph_service;
mod integrity;
mod property_store;
mod search;
mod structured;
mod traversal;

pub use error::GraphError;
pub use graph_service::GraphDatabase;
