//! Database Error Types
//!
//! This module defines error types for the storage layer, providing
//! clear error handling for connection, initialization, statement and
//! transaction-primitive failures.

use std::path::PathBuf;
use thiserror::Error;

/// Storage layer errors
///
/// Covers connection, schema initialization and raw statement failures.
/// Graph-level failures (missing entities, invalid requests) are modelled
/// by the service-layer `GraphError`.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to establish database connection
    #[error("Failed to connect to database at {path}: {source}")]
    ConnectionFailed {
        path: PathBuf,
        source: libsql::Error,
    },

    /// Failed to initialize database schema
    #[error("Failed to initialize database schema: {0}")]
    InitializationFailed(String),

    /// Permission denied when accessing database
    #[error("Permission denied for database path: {path}")]
    PermissionDenied { path: PathBuf },

    /// Filesystem error (directory creation, backups, exports)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// libsql operation error
    #[error("Database operation failed: {0}")]
    LibsqlError(#[from] libsql::Error),

    /// SQL execution error with context
    #[error("SQL execution failed: {context}")]
    SqlExecutionError { context: String },

    /// A row did not have the expected shape
    #[error("Unexpected row data: {context}")]
    RowDecode { context: String },

    /// The backend has been closed
    #[error("Database connection is closed")]
    Closed,

    /// The backend or adapter does not support the requested operation
    #[error("Unsupported operation: {0}")]
    Unsupported(String),
}

impl DatabaseError {
    /// Create a connection failed error
    pub fn connection_failed(path: PathBuf, source: libsql::Error) -> Self {
        Self::ConnectionFailed { path, source }
    }

    /// Create an initialization failed error
    pub fn initialization_failed(msg: impl Into<String>) -> Self {
        Self::InitializationFailed(msg.into())
    }

    /// Create a permission denied error
    pub fn permission_denied(path: PathBuf) -> Self {
        Self::PermissionDenied { path }
    }

    /// Create a SQL execution error with context
    pub fn sql_execution(context: impl Into<String>) -> Self {
        Self::SqlExecutionError {
            context: context.into(),
        }
    }

    /// Create a row decoding error
    pub fn row_decode(context: impl Into<String>) -> Self {
        Self::RowDecode {
            context: context.into(),
        }
    }

    /// Create an unsupported operation error
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }
}
