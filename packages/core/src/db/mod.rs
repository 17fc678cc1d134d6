//! Database Layer
//!
//! This module owns everything below the graph model:
//!
//! - `StorageBackend` trait and the libsql/Turso implementation
//! - Relational schema (nodes, relationships and their property tables)
//! - `TransactionCoordinator`, the FIFO queue every operation runs through
//! - Persistence adapters (post-commit flush, backup snapshots)
//!
//! # Architecture
//!
//! The engine runs on exactly one connection. libsql connections are not safe
//! for interleaved statements from concurrent transactions, so all access is
//! serialized by the coordinator rather than by a connection pool.

mod backend;
mod error;
mod libsql_backend;
mod persistence;
mod transaction;

pub use backend::{Row, SqlValue, StorageBackend};
pub use error::DatabaseError;
pub use libsql_backend::LibsqlBackend;
pub use persistence::{BackupInfo, FileBackupAdapter, NoopPersistence, PersistenceAdapter};
pub use transaction::{TransactionCoordinator, TxContext};
