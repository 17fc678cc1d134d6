//! LibsqlBackend - StorageBackend Implementation for libsql/Turso
//!
//! Owns the single libsql connection the graph engine runs on and creates the
//! relational schema the engine consumes.
//!
//! # Architecture
//!
//! - **Single connection**: one `libsql::Connection` for the lifetime of the
//!   backend. In-memory databases only exist per connection, and the
//!   transaction coordinator relies on a single transaction state.
//! - **WAL mode**: Write-Ahead Logging for file databases
//! - **Foreign keys**: Enabled by default for referential integrity
//! - **Idempotent schema**: `CREATE TABLE IF NOT EXISTS` only, safe to reopen
//!
//! # Schema
//!
//! ```text
//! nodes(id PK, type, label, is_independent, created_at, updated_at)
//! node_properties(node_id FK, key, value)            PK(node_id, key)
//! relationships(id PK, source_id FK?, target_id FK?, type, created_at)
//! relationship_properties(relationship_id FK, key, value)
//! ```

use crate::config::GraphConfig;
use crate::db::backend::{Row, SqlValue, StorageBackend};
use crate::db::DatabaseError;
use async_trait::async_trait;
use libsql::{Builder, Connection, Database};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

const MEMORY_PATH: &str = ":memory:";

/// libsql-backed storage for file or in-memory databases
pub struct LibsqlBackend {
    /// Kept alive for as long as the connection is used
    _db: Database,
    conn: Connection,
    db_path: Option<PathBuf>,
    closed: AtomicBool,
}

impl std::fmt::Debug for LibsqlBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LibsqlBackend")
            .field("db_path", &self.db_path)
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish()
    }
}

impl LibsqlBackend {
    /// Open (or create) a file database at `db_path` with default settings
    pub async fn open(db_path: impl Into<PathBuf>) -> Result<Self, DatabaseError> {
        let config = GraphConfig {
            database_path: Some(db_path.into()),
            ..GraphConfig::default()
        };
        Self::from_config(&config).await
    }

    /// Open a private in-memory database
    pub async fn in_memory() -> Result<Self, DatabaseError> {
        Self::from_config(&GraphConfig::in_memory()).await
    }

    /// Open the database described by `config`
    ///
    /// This will:
    /// 1. Ensure the parent directory exists (create if needed)
    /// 2. Open/create the database and its single connection
    /// 3. Apply pragmas (journal mode, busy timeout, foreign keys)
    /// 4. Initialize the schema (CREATE TABLE IF NOT EXISTS)
    pub async fn from_config(config: &GraphConfig) -> Result<Self, DatabaseError> {
        let (db, db_path) = match &config.database_path {
            Some(path) => {
                ensure_parent_dir(path)?;
                let db = Builder::new_local(path)
                    .build()
                    .await
                    .map_err(|e| DatabaseError::connection_failed(path.clone(), e))?;
                (db, Some(path.clone()))
            }
            None => {
                let db = Builder::new_local(MEMORY_PATH)
                    .build()
                    .await
                    .map_err(|e| DatabaseError::connection_failed(PathBuf::from(MEMORY_PATH), e))?;
                (db, None)
            }
        };

        let conn = db.connect()?;
        let backend = Self {
            _db: db,
            conn,
            db_path,
            closed: AtomicBool::new(false),
        };

        backend.configure(config).await?;
        backend.initialize_schema().await?;

        tracing::info!(
            "Opened graph database at {}",
            backend
                .db_path
                .as_deref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| MEMORY_PATH.to_string())
        );

        Ok(backend)
    }

    /// Path of the database file, `None` for in-memory databases
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Execute a PRAGMA statement
    ///
    /// PRAGMA statements may return rows, so they go through query() rather
    /// than execute().
    async fn execute_pragma(&self, pragma: &str) -> Result<(), DatabaseError> {
        let mut rows = self.conn.query(pragma, ()).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to execute '{}': {}", pragma, e))
        })?;
        while rows
            .next()
            .await
            .map_err(|e| {
                DatabaseError::sql_execution(format!("Failed to execute '{}': {}", pragma, e))
            })?
            .is_some()
        {}
        Ok(())
    }

    async fn configure(&self, config: &GraphConfig) -> Result<(), DatabaseError> {
        if config.enable_wal && self.db_path.is_some() {
            self.execute_pragma("PRAGMA journal_mode = WAL").await?;
        }

        self.execute_pragma(&format!("PRAGMA busy_timeout = {}", config.busy_timeout_ms))
            .await?;

        let fk = if config.enforce_foreign_keys { "ON" } else { "OFF" };
        self.execute_pragma(&format!("PRAGMA foreign_keys = {}", fk))
            .await?;

        Ok(())
    }

    /// Create tables and indexes
    async fn initialize_schema(&self) -> Result<(), DatabaseError> {
        let statements: [(&str, &str); 4] = [
            (
                "nodes",
                "CREATE TABLE IF NOT EXISTS nodes (
                    id TEXT PRIMARY KEY,
                    type TEXT NOT NULL,
                    label TEXT NOT NULL,
                    is_independent INTEGER NOT NULL DEFAULT 1,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                )",
            ),
            (
                "node_properties",
                "CREATE TABLE IF NOT EXISTS node_properties (
                    node_id TEXT NOT NULL,
                    key TEXT NOT NULL,
                    value TEXT NOT NULL,
                    PRIMARY KEY (node_id, key),
                    FOREIGN KEY (node_id) REFERENCES nodes(id) ON DELETE CASCADE
                )",
            ),
            (
                "relationships",
                "CREATE TABLE IF NOT EXISTS relationships (
                    id TEXT PRIMARY KEY,
                    source_id TEXT,
                    target_id TEXT,
                    type TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    -- Deleting an endpoint leaves the edge in place with a NULL endpoint
                    FOREIGN KEY (source_id) REFERENCES nodes(id) ON DELETE SET NULL,
                    FOREIGN KEY (target_id) REFERENCES nodes(id) ON DELETE SET NULL
                )",
            ),
            (
                "relationship_properties",
                "CREATE TABLE IF NOT EXISTS relationship_properties (
                    relationship_id TEXT NOT NULL,
                    key TEXT NOT NULL,
                    value TEXT NOT NULL,
                    PRIMARY KEY (relationship_id, key),
                    FOREIGN KEY (relationship_id) REFERENCES relationships(id) ON DELETE CASCADE
                )",
            ),
        ];

        for (table, sql) in statements {
            self.conn.execute(sql, ()).await.map_err(|e| {
                DatabaseError::initialization_failed(format!(
                    "Failed to create {} table: {}",
                    table, e
                ))
            })?;
        }

        self.create_core_indexes().await
    }

    async fn create_core_indexes(&self) -> Result<(), DatabaseError> {
        let indexes = [
            ("idx_nodes_label", "nodes(label)"),
            ("idx_nodes_type", "nodes(type)"),
            ("idx_relationships_source", "relationships(source_id)"),
            ("idx_relationships_target", "relationships(target_id)"),
            ("idx_relationships_type", "relationships(type)"),
        ];

        for (name, target) in indexes {
            self.conn
                .execute(&format!("CREATE INDEX IF NOT EXISTS {} ON {}", name, target), ())
                .await
                .map_err(|e| {
                    DatabaseError::initialization_failed(format!(
                        "Failed to create index '{}': {}",
                        name, e
                    ))
                })?;
        }

        Ok(())
    }

    fn ensure_open(&self) -> Result<(), DatabaseError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(DatabaseError::Closed);
        }
        Ok(())
    }

    fn to_libsql(value: SqlValue) -> libsql::Value {
        match value {
            SqlValue::Null => libsql::Value::Null,
            SqlValue::Integer(i) => libsql::Value::Integer(i),
            SqlValue::Real(f) => libsql::Value::Real(f),
            SqlValue::Text(s) => libsql::Value::Text(s),
            SqlValue::Blob(b) => libsql::Value::Blob(b),
        }
    }

    fn from_libsql(value: libsql::Value) -> SqlValue {
        match value {
            libsql::Value::Null => SqlValue::Null,
            libsql::Value::Integer(i) => SqlValue::Integer(i),
            libsql::Value::Real(f) => SqlValue::Real(f),
            libsql::Value::Text(s) => SqlValue::Text(s),
            libsql::Value::Blob(b) => SqlValue::Blob(b),
        }
    }

    fn convert_params(params: Vec<SqlValue>) -> Vec<libsql::Value> {
        params.into_iter().map(Self::to_libsql).collect()
    }
}

fn ensure_parent_dir(db_path: &Path) -> Result<(), DatabaseError> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent).map_err(|e| {
                if e.kind() == std::io::ErrorKind::PermissionDenied {
                    DatabaseError::permission_denied(db_path.to_path_buf())
                } else {
                    DatabaseError::Io(e)
                }
            })?;
        }
    }
    Ok(())
}

#[async_trait]
impl StorageBackend for LibsqlBackend {
    async fn query(&self, sql: &str, params: Vec<SqlValue>) -> Result<Vec<Row>, DatabaseError> {
        self.ensure_open()?;
        let mut rows = self
            .conn
            .query(sql, libsql::params_from_iter(Self::convert_params(params)))
            .await
            .map_err(|e| DatabaseError::sql_execution(format!("{} ({})", e, sql)))?;

        let mut out = Vec::new();
        while let Some(row) = rows.next().await? {
            let count = row.column_count();
            let mut values = Vec::with_capacity(count.max(0) as usize);
            for idx in 0..count {
                values.push(Self::from_libsql(row.get_value(idx)?));
            }
            out.push(Row::new(values));
        }
        Ok(out)
    }

    async fn run(&self, sql: &str, params: Vec<SqlValue>) -> Result<u64, DatabaseError> {
        self.ensure_open()?;
        self.conn
            .execute(sql, libsql::params_from_iter(Self::convert_params(params)))
            .await
            .map_err(|e| DatabaseError::sql_execution(format!("{} ({})", e, sql)))
    }

    async fn begin_transaction(&self) -> Result<(), DatabaseError> {
        self.ensure_open()?;
        self.conn
            .execute("BEGIN IMMEDIATE", ())
            .await
            .map_err(|e| DatabaseError::sql_execution(format!("BEGIN failed: {}", e)))?;
        Ok(())
    }

    async fn commit_transaction(&self) -> Result<(), DatabaseError> {
        self.ensure_open()?;
        self.conn
            .execute("COMMIT", ())
            .await
            .map_err(|e| DatabaseError::sql_execution(format!("COMMIT failed: {}", e)))?;
        Ok(())
    }

    async fn rollback_transaction(&self) -> Result<(), DatabaseError> {
        self.ensure_open()?;
        self.conn
            .execute("ROLLBACK", ())
            .await
            .map_err(|e| DatabaseError::sql_execution(format!("ROLLBACK failed: {}", e)))?;
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        !self.closed.load(Ordering::SeqCst) && !self.conn.is_autocommit()
    }

    async fn flush(&self) -> Result<(), DatabaseError> {
        self.ensure_open()?;
        if self.db_path.is_some() {
            self.execute_pragma("PRAGMA wal_checkpoint(PASSIVE)").await?;
        }
        Ok(())
    }

    async fn export(&self) -> Result<Vec<u8>, DatabaseError> {
        self.ensure_open()?;
        if self.in_transaction() {
            return Err(DatabaseError::unsupported(
                "cannot export while a transaction is open",
            ));
        }

        // VACUUM INTO produces a consistent standalone image for both file and
        // in-memory databases.
        let target = std::env::temp_dir().join(format!(
            "relgraph-export-{}.db",
            uuid::Uuid::new_v4().simple()
        ));
        let target_str = target.to_string_lossy().replace('\'', "''");
        self.conn
            .execute(&format!("VACUUM INTO '{}'", target_str), ())
            .await
            .map_err(|e| DatabaseError::sql_execution(format!("VACUUM INTO failed: {}", e)))?;

        let bytes = tokio::fs::read(&target).await;
        let _ = tokio::fs::remove_file(&target).await;
        Ok(bytes?)
    }

    async fn close(&self) -> Result<(), DatabaseError> {
        if self.closed.load(Ordering::SeqCst) {
            return Ok(());
        }
        self.flush().await?;
        self.closed.store(true, Ordering::SeqCst);
        tracing::debug!("Closed graph database backend");
        Ok(())
    }
}
