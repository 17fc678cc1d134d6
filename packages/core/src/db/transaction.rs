//! Transaction Coordinator
//!
//! Serializes every graph operation onto the single backend connection.
//!
//! # Queue
//!
//! Callers queue on a `tokio::sync::Mutex`, which hands out the lock in FIFO
//! order. Exactly one transaction is active at a time, and reads queue on the
//! same lock so they never observe another operation's partial writes.
//!
//! # Nesting
//!
//! SQLite rejects a nested `BEGIN`. The context of the running transaction is
//! carried per async task (`tokio::task_local!`), so an operation that calls
//! back into the public API while it holds a transaction runs directly inside
//! the existing one instead of deadlocking on the queue or issuing a second
//! `BEGIN`. The backend's own `in_transaction()` flag covers transactions that
//! were opened outside the coordinator.
//!
//! # Outcome
//!
//! - `begin -> operation -> commit`, then the persistence hook
//! - operation error -> `rollback`, then the error is returned. Not-found and
//!   validation errors pass through unchanged; storage faults are wrapped in
//!   `GraphError::Transaction` with the cause attached
//! - a commit that fails because the engine already ended the transaction is
//!   logged and treated as success

use crate::db::{DatabaseError, PersistenceAdapter, Row, SqlValue, StorageBackend};
use crate::services::GraphError;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

static NEXT_COORDINATOR_ID: AtomicU64 = AtomicU64::new(1);

tokio::task_local! {
    static ACTIVE_CONTEXT: TxContext;
}

/// Handle to the running transaction (or serialized read)
///
/// Passed into every operation run by the coordinator. Code that already holds
/// a `TxContext` issues statements through it and never opens a transaction of
/// its own.
#[derive(Clone)]
pub struct TxContext {
    coordinator_id: u64,
    backend: Arc<dyn StorageBackend>,
}

impl std::fmt::Debug for TxContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TxContext")
            .field("coordinator_id", &self.coordinator_id)
            .finish()
    }
}

impl TxContext {
    pub async fn query(&self, sql: &str, params: Vec<SqlValue>) -> Result<Vec<Row>, DatabaseError> {
        self.backend.query(sql, params).await
    }

    pub async fn run(&self, sql: &str, params: Vec<SqlValue>) -> Result<u64, DatabaseError> {
        self.backend.run(sql, params).await
    }

    /// First row of a query, if any
    pub async fn query_one(
        &self,
        sql: &str,
        params: Vec<SqlValue>,
    ) -> Result<Option<Row>, DatabaseError> {
        Ok(self.backend.query(sql, params).await?.into_iter().next())
    }

    pub fn backend(&self) -> &dyn StorageBackend {
        self.backend.as_ref()
    }
}

/// FIFO transaction queue bound to one backend
pub struct TransactionCoordinator {
    id: u64,
    backend: Arc<dyn StorageBackend>,
    persistence: Arc<dyn PersistenceAdapter>,
    queue: Mutex<()>,
    persist_on_commit: bool,
}

impl TransactionCoordinator {
    pub fn new(
        backend: Arc<dyn StorageBackend>,
        persistence: Arc<dyn PersistenceAdapter>,
        persist_on_commit: bool,
    ) -> Self {
        Self {
            id: NEXT_COORDINATOR_ID.fetch_add(1, Ordering::Relaxed),
            backend,
            persistence,
            queue: Mutex::new(()),
            persist_on_commit,
        }
    }

    pub fn backend(&self) -> &Arc<dyn StorageBackend> {
        &self.backend
    }

    pub fn persistence(&self) -> &Arc<dyn PersistenceAdapter> {
        &self.persistence
    }

    /// Context of the transaction this task is already running for this
    /// coordinator, if any
    fn current_context(&self) -> Option<TxContext> {
        ACTIVE_CONTEXT
            .try_with(|ctx| ctx.clone())
            .ok()
            .filter(|ctx| ctx.coordinator_id == self.id)
    }

    fn new_context(&self) -> TxContext {
        TxContext {
            coordinator_id: self.id,
            backend: self.backend.clone(),
        }
    }

    /// Run `operation` atomically
    ///
    /// `label` names the operation in logs and error contexts.
    pub async fn execute<T, F, Fut>(&self, label: &str, operation: F) -> Result<T, GraphError>
    where
        F: FnOnce(TxContext) -> Fut,
        Fut: Future<Output = Result<T, GraphError>>,
    {
        if let Some(ctx) = self.current_context() {
            tracing::trace!("'{}' joins the active transaction", label);
            return operation(ctx).await;
        }

        let _turn = self.queue.lock().await;
        let ctx = self.new_context();

        if self.backend.in_transaction() {
            tracing::warn!(
                "Backend already has an open transaction; running '{}' without BEGIN",
                label
            );
            return ACTIVE_CONTEXT.scope(ctx.clone(), operation(ctx)).await;
        }

        self.backend.begin_transaction().await.map_err(|e| match e {
            DatabaseError::Closed => GraphError::Database(e),
            other => GraphError::transaction(format!("failed to begin '{}'", label), other.into()),
        })?;
        tracing::debug!("BEGIN {}", label);

        let outcome = ACTIVE_CONTEXT.scope(ctx.clone(), operation(ctx)).await;

        match outcome {
            Ok(value) => {
                self.commit(label).await?;
                self.persist(label).await;
                Ok(value)
            }
            Err(err) => Err(self.rollback(label, err).await),
        }
    }

    /// Run a read-only `operation` in queue order without opening a transaction
    pub async fn read<T, F, Fut>(&self, label: &str, operation: F) -> Result<T, GraphError>
    where
        F: FnOnce(TxContext) -> Fut,
        Fut: Future<Output = Result<T, GraphError>>,
    {
        if let Some(ctx) = self.current_context() {
            return operation(ctx).await;
        }

        let _turn = self.queue.lock().await;
        tracing::trace!("read {}", label);
        let ctx = self.new_context();
        ACTIVE_CONTEXT.scope(ctx.clone(), operation(ctx)).await
    }

    async fn commit(&self, label: &str) -> Result<(), GraphError> {
        match self.backend.commit_transaction().await {
            Ok(()) => {
                tracing::debug!("COMMIT {}", label);
                Ok(())
            }
            Err(e) if !self.backend.in_transaction() => {
                // The engine already closed the transaction (implicit commit
                // or auto-rollback); nothing is left to finish.
                tracing::warn!(
                    "Commit of '{}' reported an error after the transaction had ended: {}",
                    label,
                    e
                );
                Ok(())
            }
            Err(e) => {
                let commit_err = GraphError::Database(e);
                Err(self.rollback(label, commit_err).await)
            }
        }
    }

    async fn rollback(&self, label: &str, err: GraphError) -> GraphError {
        if self.backend.in_transaction() {
            if let Err(rollback_err) = self.backend.rollback_transaction().await {
                tracing::error!(
                    "Rollback of '{}' failed: {} (original error: {})",
                    label,
                    rollback_err,
                    err
                );
                return GraphError::transaction(
                    format!("rollback of '{}' failed after error: {}", label, err),
                    GraphError::Database(rollback_err),
                );
            }
        }
        tracing::debug!("ROLLBACK {}: {}", label, err);

        if err.is_caller_facing() {
            err
        } else {
            GraphError::transaction(format!("'{}' was rolled back", label), err)
        }
    }

    async fn persist(&self, label: &str) {
        if !self.persist_on_commit {
            return;
        }
        if let Err(e) = self.persistence.persist_data(self.backend.as_ref()).await {
            tracing::warn!("Persisting after '{}' failed: {}", label, e);
        }
    }
}
