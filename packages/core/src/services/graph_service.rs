//! Graph Database - Public Facade
//!
//! `GraphDatabase` is the entry point for callers. It owns the transaction
//! coordinator and routes every operation through it:
//!
//! - mutations run in `execute` (BEGIN/COMMIT, rollback on error, persistence
//!   hook after commit)
//! - reads run in `read` (same FIFO queue, no transaction)
//!
//! Operations called from inside [`GraphDatabase::transaction`] join the
//! surrounding transaction instead of opening their own.
//!
//! # Examples
//!
//! ```rust,no_run
//! use relgraph_core::models::{NewEdge, NewNode};
//! use relgraph_core::GraphDatabase;
//!
//! # async fn example() -> Result<(), relgraph_core::GraphError> {
//! let db = GraphDatabase::in_memory().await?;
//!
//! let ada = db.add_node(NewNode::new("Person", "Ada")).await?;
//! let charles = db.add_node(NewNode::new("Person", "Charles")).await?;
//! db.add_edge(NewEdge::new(&ada.id, &charles.id, "KNOWS")).await?;
//!
//! let path = db.find_path(&ada.id, &charles.id, 3).await?;
//! assert_eq!(path.len(), 1);
//! # Ok(())
//! # }
//! ```

use crate::config::{default_database_path, GraphConfig};
use crate::db::{
    BackupInfo, DatabaseError, FileBackupAdapter, LibsqlBackend, NoopPersistence,
    PersistenceAdapter, StorageBackend, TransactionCoordinator, TxContext,
};
use crate::models::{
    DeleteMode, Direction, Edge, EdgeSearchCriteria, EdgeUpdate, FullTextOptions, FullTextResult,
    GraphExport, GraphStats, ImportMode, ImportResult, MoveResult, NewEdge, NewNode, Node,
    NodeSearchCriteria, NodeUpdate, Properties, SearchResult, ValidationReport,
};
use crate::services::entity_repository as repo;
use crate::services::{exchange, integrity, search, structured, traversal, GraphError};
use std::future::Future;
use std::sync::Arc;

/// Embedded graph database over a single SQL connection
pub struct GraphDatabase {
    coordinator: TransactionCoordinator,
    config: GraphConfig,
}

impl GraphDatabase {
    /// Open the database described by `config`
    ///
    /// File databases get a [`FileBackupAdapter`] rooted at the resolved
    /// backup directory; in-memory databases without a backup directory get
    /// [`NoopPersistence`].
    pub async fn open(config: GraphConfig) -> Result<Self, GraphError> {
        let backend: Arc<dyn StorageBackend> = Arc::new(LibsqlBackend::from_config(&config).await?);
        let persistence: Arc<dyn PersistenceAdapter> = match config.resolve_backup_dir() {
            Some(dir) => Arc::new(FileBackupAdapter::new(dir)),
            None => Arc::new(NoopPersistence),
        };
        Ok(Self::with_backend(backend, persistence, config))
    }

    /// Open the file database at the default location, honoring `RELGRAPH_*`
    /// environment overrides
    pub async fn open_default() -> Result<Self, GraphError> {
        let path = default_database_path().map_err(DatabaseError::from)?;
        Self::open(GraphConfig::with_path(path).with_env_overrides()).await
    }

    /// Open a private in-memory database
    pub async fn in_memory() -> Result<Self, GraphError> {
        Self::open(GraphConfig::in_memory()).await
    }

    /// Assemble a database from platform-supplied collaborators
    pub fn with_backend(
        backend: Arc<dyn StorageBackend>,
        persistence: Arc<dyn PersistenceAdapter>,
        config: GraphConfig,
    ) -> Self {
        let coordinator =
            TransactionCoordinator::new(backend, persistence, config.persist_on_commit);
        Self {
            coordinator,
            config,
        }
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    pub fn backend(&self) -> &Arc<dyn StorageBackend> {
        self.coordinator.backend()
    }

    /// Run several operations atomically
    ///
    /// Graph operations awaited inside `operation` join this transaction. Any
    /// error rolls back every write made inside it.
    ///
    /// ```rust,no_run
    /// # use relgraph_core::{GraphDatabase, GraphError};
    /// # use relgraph_core::models::{NewEdge, NewNode};
    /// # async fn example(db: &GraphDatabase) -> Result<(), GraphError> {
    /// db.transaction("link pair", |_ctx| async move {
    ///     let a = db.add_node(NewNode::new("T", "a")).await?;
    ///     let b = db.add_node(NewNode::new("T", "b")).await?;
    ///     db.add_edge(NewEdge::new(&a.id, &b.id, "NEXT")).await?;
    ///     Ok(())
    /// })
    /// .await
    /// # }
    /// ```
    pub async fn transaction<T, F, Fut>(&self, label: &str, operation: F) -> Result<T, GraphError>
    where
        F: FnOnce(TxContext) -> Fut,
        Fut: Future<Output = Result<T, GraphError>>,
    {
        self.coordinator.execute(label, operation).await
    }

    // -----------------------------------------------------------------------
    // Nodes
    // -----------------------------------------------------------------------

    /// Create a node
    ///
    /// # Errors
    ///
    /// - `Validation` for an empty or reserved (`RELATIONSHIP_TYPE`) type
    /// - `NodeWrite` when the row cannot be written (e.g. duplicate id)
    pub async fn add_node(&self, node: NewNode) -> Result<Node, GraphError> {
        self.coordinator
            .execute("add_node", move |ctx| async move {
                repo::add_node(&ctx, node).await
            })
            .await
    }

    pub async fn get_node(&self, id: &str) -> Result<Option<Node>, GraphError> {
        self.coordinator
            .read("get_node", |ctx| async move { repo::get_node(&ctx, id).await })
            .await
    }

    /// All nodes, oldest first
    pub async fn get_nodes(&self) -> Result<Vec<Node>, GraphError> {
        self.coordinator
            .read("get_nodes", |ctx| async move { repo::get_nodes(&ctx).await })
            .await
    }

    /// Apply a partial update; relabeling re-evaluates label independence
    pub async fn update_node(&self, id: &str, update: NodeUpdate) -> Result<Node, GraphError> {
        self.coordinator
            .execute("update_node", move |ctx| async move {
                repo::update_node(&ctx, id, update).await
            })
            .await
    }

    pub async fn delete_node(&self, id: &str, mode: DeleteMode) -> Result<(), GraphError> {
        self.coordinator
            .execute("delete_node", |ctx| async move {
                repo::delete_node(&ctx, id, mode).await
            })
            .await
    }

    // -----------------------------------------------------------------------
    // Edges
    // -----------------------------------------------------------------------

    /// Create a plain edge
    ///
    /// # Errors
    ///
    /// - `NodeNotFound` naming a missing endpoint
    /// - `Validation` for an empty or reserved (`RELAY`) type
    pub async fn add_edge(&self, edge: NewEdge) -> Result<Edge, GraphError> {
        self.coordinator
            .execute("add_edge", move |ctx| async move {
                repo::add_edge(&ctx, edge).await
            })
            .await
    }

    /// Logical edge by id (plain edge or structured relationship)
    pub async fn get_edge(&self, id: &str) -> Result<Option<Edge>, GraphError> {
        self.coordinator
            .read("get_edge", |ctx| async move { repo::get_edge(&ctx, id).await })
            .await
    }

    /// All logical edges, oldest first
    pub async fn get_edges(&self) -> Result<Vec<Edge>, GraphError> {
        self.coordinator
            .read("get_edges", |ctx| async move { repo::get_edges(&ctx).await })
            .await
    }

    pub async fn get_node_edges(
        &self,
        node_id: &str,
        direction: Direction,
    ) -> Result<Vec<Edge>, GraphError> {
        self.coordinator
            .read("get_node_edges", |ctx| async move {
                repo::get_node_edges(&ctx, node_id, direction).await
            })
            .await
    }

    /// Apply a partial update to a plain or structured edge
    pub async fn update_edge(&self, id: &str, update: EdgeUpdate) -> Result<Edge, GraphError> {
        self.coordinator
            .execute("update_edge", move |ctx| async move {
                repo::update_edge(&ctx, id, update).await
            })
            .await
    }

    /// Delete a logical edge
    ///
    /// Deleting a structured relationship (by its id or by one of its relay
    /// ids) removes the relationship node and both relays.
    pub async fn delete_edge(&self, id: &str) -> Result<(), GraphError> {
        self.coordinator
            .execute("delete_edge", |ctx| async move {
                repo::delete_edge(&ctx, id).await
            })
            .await
    }

    // -----------------------------------------------------------------------
    // Structured relationships
    // -----------------------------------------------------------------------

    /// Create a property-bearing relationship; returns its id
    pub async fn create_structured_relationship(
        &self,
        source_id: &str,
        target_id: &str,
        label: &str,
        properties: Properties,
    ) -> Result<String, GraphError> {
        self.coordinator
            .execute("create_structured_relationship", move |ctx| async move {
                structured::create(&ctx, source_id, target_id, label, properties).await
            })
            .await
    }

    /// Replace a plain edge with a structured relationship
    ///
    /// `label` and `properties` default to the edge's type and properties.
    pub async fn convert_to_structured_relationship(
        &self,
        edge_id: &str,
        label: Option<String>,
        properties: Option<Properties>,
    ) -> Result<String, GraphError> {
        self.coordinator
            .execute("convert_to_structured_relationship", move |ctx| async move {
                structured::convert(&ctx, edge_id, label, properties).await
            })
            .await
    }

    /// Re-point every edge touching `from_id` to `to_id`
    pub async fn move_relationships(
        &self,
        from_id: &str,
        to_id: &str,
    ) -> Result<MoveResult, GraphError> {
        self.coordinator
            .execute("move_relationships", |ctx| async move {
                structured::move_relationships(&ctx, from_id, to_id).await
            })
            .await
    }

    pub async fn validate_structured_relationships(&self) -> Result<ValidationReport, GraphError> {
        self.coordinator
            .read("validate_structured_relationships", |ctx| async move {
                integrity::validate_structured_relationships(&ctx).await
            })
            .await
    }

    // -----------------------------------------------------------------------
    // Traversal & search
    // -----------------------------------------------------------------------

    /// Shortest directed path as an ordered edge list
    ///
    /// Empty when `start_id == end_id` or no path exists within `max_depth`
    /// edges.
    pub async fn find_path(
        &self,
        start_id: &str,
        end_id: &str,
        max_depth: usize,
    ) -> Result<Vec<Edge>, GraphError> {
        self.coordinator
            .read("find_path", |ctx| async move {
                traversal::find_path(&ctx, start_id, end_id, max_depth).await
            })
            .await
    }

    /// Nodes within `depth` hops of `node_id`, ignoring edge direction
    pub async fn find_connected_nodes(
        &self,
        node_id: &str,
        depth: usize,
    ) -> Result<Vec<Node>, GraphError> {
        self.coordinator
            .read("find_connected_nodes", |ctx| async move {
                traversal::find_connected_nodes(&ctx, node_id, depth).await
            })
            .await
    }

    pub async fn search_nodes(
        &self,
        criteria: &NodeSearchCriteria,
    ) -> Result<SearchResult<Node>, GraphError> {
        self.coordinator
            .read("search_nodes", |ctx| async move {
                search::search_nodes(&ctx, criteria).await
            })
            .await
    }

    pub async fn search_edges(
        &self,
        criteria: &EdgeSearchCriteria,
    ) -> Result<SearchResult<Edge>, GraphError> {
        self.coordinator
            .read("search_edges", |ctx| async move {
                search::search_edges(&ctx, criteria).await
            })
            .await
    }

    pub async fn full_text_search(
        &self,
        query: &str,
        options: &FullTextOptions,
    ) -> Result<FullTextResult, GraphError> {
        self.coordinator
            .read("full_text_search", |ctx| async move {
                search::full_text_search(&ctx, query, options).await
            })
            .await
    }

    // -----------------------------------------------------------------------
    // Exchange
    // -----------------------------------------------------------------------

    /// Raw snapshot of the stored graph
    pub async fn export_graph(&self, include_metadata: bool) -> Result<GraphExport, GraphError> {
        self.coordinator
            .read("export_graph", |ctx| async move {
                exchange::export_graph(&ctx, include_metadata).await
            })
            .await
    }

    /// Raw snapshot as pretty-printed JSON, metadata included
    pub async fn export_to_json(&self) -> Result<String, GraphError> {
        let export = self.export_graph(true).await?;
        Ok(serde_json::to_string_pretty(&export)?)
    }

    /// Import an exchange document in one transaction
    ///
    /// # Errors
    ///
    /// `Validation` when the document does not parse or is structurally
    /// invalid; nothing is written in that case. Per-item problems are
    /// reported in [`ImportResult::errors`] instead.
    pub async fn import_from_json(
        &self,
        json: &str,
        mode: ImportMode,
    ) -> Result<ImportResult, GraphError> {
        let export = exchange::parse_export(json)?;
        self.import_graph(export, mode).await
    }

    pub async fn import_graph(
        &self,
        export: GraphExport,
        mode: ImportMode,
    ) -> Result<ImportResult, GraphError> {
        self.coordinator
            .execute("import", move |ctx| async move {
                exchange::import_graph(&ctx, export, mode).await
            })
            .await
    }

    /// Remove every node, edge and property
    pub async fn clear(&self) -> Result<(), GraphError> {
        self.coordinator
            .execute("clear", |ctx| async move { exchange::clear(&ctx).await })
            .await
    }

    pub async fn get_stats(&self) -> Result<GraphStats, GraphError> {
        self.coordinator
            .read("get_stats", |ctx| async move { integrity::graph_stats(&ctx).await })
            .await
    }

    // -----------------------------------------------------------------------
    // Backups & lifecycle
    // -----------------------------------------------------------------------

    pub async fn create_backup(&self) -> Result<BackupInfo, GraphError> {
        let persistence = self.coordinator.persistence().clone();
        self.coordinator
            .read("create_backup", |ctx| async move {
                Ok(persistence.create_backup(ctx.backend()).await?)
            })
            .await
    }

    pub async fn list_backups(&self) -> Result<Vec<BackupInfo>, GraphError> {
        Ok(self.coordinator.persistence().list_backups().await?)
    }

    /// Replace the current graph with the contents of backup `id`
    pub async fn restore_from_backup(&self, id: &str) -> Result<ImportResult, GraphError> {
        let path = self.coordinator.persistence().restore_from_backup(id).await?;

        let backup_config = GraphConfig {
            database_path: Some(path.clone()),
            backup_dir: None,
            enable_wal: false,
            persist_on_commit: false,
            ..self.config.clone()
        };
        let backup_backend: Arc<dyn StorageBackend> =
            Arc::new(LibsqlBackend::from_config(&backup_config).await?);
        let backup = Self::with_backend(backup_backend, Arc::new(NoopPersistence), backup_config);
        let export = backup.export_graph(false).await?;
        backup.close().await?;

        tracing::info!("Restoring backup {} from {}", id, path.display());
        self.import_graph(export, ImportMode::Replace).await
    }

    /// Flush and release the connection; later calls fail with a database
    /// error
    pub async fn close(&self) -> Result<(), GraphError> {
        self.coordinator
            .read("close", |ctx| async move {
                ctx.backend().close().await?;
                Ok(())
            })
            .await
    }
}
