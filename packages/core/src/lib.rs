//! RelGraph Core - Embedded Graph Engine on a SQL Substrate
//!
//! Stores nodes, typed relationships and JSON properties in four relational
//! tables and exposes traversal, path finding, property search and JSON
//! import/export on top of them.
//!
//! # Architecture
//!
//! - **libsql/Turso**: Embedded SQLite-compatible database, one connection
//! - **Serialized transactions**: every operation queues on one FIFO
//!   coordinator; nested calls join the running transaction
//! - **Structured relationships**: property-bearing edges are encoded as a
//!   `RELATIONSHIP_TYPE` node plus two `RELAY` edges and surface as ordinary
//!   edges
//!
//! # Modules
//!
//! - [`models`] - Data structures (Node, Edge, search criteria, reports)
//! - [`services`] - `GraphDatabase` facade and graph logic
//! - [`db`] - Storage backend, transaction coordinator, persistence
//! - [`config`] - Database configuration

pub mod config;
pub mod db;
pub mod models;
pub mod services;

pub use config::GraphConfig;
pub use services::{GraphDatabase, GraphError};
