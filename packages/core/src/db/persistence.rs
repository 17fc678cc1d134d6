//! Persistence Adapters
//!
//! Platform-specific durability hooks invoked by the graph core:
//!
//! - `persist_data` runs after every committed transaction
//! - `create_backup` / `list_backups` / `restore_from_backup` manage snapshots
//!
//! [`FileBackupAdapter`] stores snapshot images in a directory next to the
//! database file. [`NoopPersistence`] is used for in-memory databases where
//! there is nothing to flush and nowhere to keep backups.

use crate::db::{DatabaseError, StorageBackend};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const BACKUP_EXTENSION: &str = "db";

/// Metadata about one backup snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupInfo {
    pub id: String,
    pub path: PathBuf,
    pub created_at: DateTime<Utc>,
    pub size_bytes: u64,
}

/// Durability hooks supplied by the embedding platform
#[async_trait]
pub trait PersistenceAdapter: Send + Sync {
    /// Flush committed state to durable storage
    async fn persist_data(&self, backend: &dyn StorageBackend) -> Result<(), DatabaseError>;

    /// Write a snapshot of the current database
    async fn create_backup(&self, backend: &dyn StorageBackend)
        -> Result<BackupInfo, DatabaseError>;

    /// All known snapshots, oldest first
    async fn list_backups(&self) -> Result<Vec<BackupInfo>, DatabaseError>;

    /// Locate the snapshot image for `id` so the caller can load it
    async fn restore_from_backup(&self, id: &str) -> Result<PathBuf, DatabaseError>;
}

/// No durability beyond the engine itself (in-memory databases)
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPersistence;

#[async_trait]
impl PersistenceAdapter for NoopPersistence {
    async fn persist_data(&self, _backend: &dyn StorageBackend) -> Result<(), DatabaseError> {
        Ok(())
    }

    async fn create_backup(
        &self,
        _backend: &dyn StorageBackend,
    ) -> Result<BackupInfo, DatabaseError> {
        Err(DatabaseError::unsupported(
            "backups require a file-backed database",
        ))
    }

    async fn list_backups(&self) -> Result<Vec<BackupInfo>, DatabaseError> {
        Ok(Vec::new())
    }

    async fn restore_from_backup(&self, id: &str) -> Result<PathBuf, DatabaseError> {
        Err(DatabaseError::unsupported(format!(
            "cannot restore backup '{}' without a backup directory",
            id
        )))
    }
}

/// Snapshot files in a backup directory
#[derive(Debug, Clone)]
pub struct FileBackupAdapter {
    backup_dir: PathBuf,
}

impl FileBackupAdapter {
    pub fn new(backup_dir: impl Into<PathBuf>) -> Self {
        Self {
            backup_dir: backup_dir.into(),
        }
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    fn backup_path(&self, id: &str) -> PathBuf {
        self.backup_dir.join(format!("{}.{}", id, BACKUP_EXTENSION))
    }

    async fn describe(path: &Path) -> Result<Option<BackupInfo>, DatabaseError> {
        if path.extension().and_then(|e| e.to_str()) != Some(BACKUP_EXTENSION) {
            return Ok(None);
        }
        let Some(id) = path.file_stem().and_then(|s| s.to_str()) else {
            return Ok(None);
        };

        let metadata = tokio::fs::metadata(path).await?;
        let created_at = metadata
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());

        Ok(Some(BackupInfo {
            id: id.to_string(),
            path: path.to_path_buf(),
            created_at,
            size_bytes: metadata.len(),
        }))
    }
}

#[async_trait]
impl PersistenceAdapter for FileBackupAdapter {
    async fn persist_data(&self, backend: &dyn StorageBackend) -> Result<(), DatabaseError> {
        backend.flush().await
    }

    async fn create_backup(
        &self,
        backend: &dyn StorageBackend,
    ) -> Result<BackupInfo, DatabaseError> {
        tokio::fs::create_dir_all(&self.backup_dir).await?;

        let now = Utc::now();
        let id = format!(
            "backup-{}-{}",
            now.format("%Y%m%dT%H%M%S%6f"),
            &uuid::Uuid::new_v4().simple().to_string()[..8]
        );
        let path = self.backup_path(&id);

        let image = backend.export().await?;
        tokio::fs::write(&path, &image).await?;

        tracing::info!("Created backup {} ({} bytes)", id, image.len());

        Ok(BackupInfo {
            id,
            path,
            created_at: now,
            size_bytes: image.len() as u64,
        })
    }

    async fn list_backups(&self) -> Result<Vec<BackupInfo>, DatabaseError> {
        if !self.backup_dir.exists() {
            return Ok(Vec::new());
        }

        let mut entries = tokio::fs::read_dir(&self.backup_dir).await?;
        let mut backups = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if let Some(info) = Self::describe(&entry.path()).await? {
                backups.push(info);
            }
        }

        // ids embed a sortable timestamp
        backups.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(backups)
    }

    async fn restore_from_backup(&self, id: &str) -> Result<PathBuf, DatabaseError> {
        if id.is_empty() || id.contains(['/', '\\']) || id.contains("..") {
            return Err(DatabaseError::unsupported(format!(
                "invalid backup id '{}'",
                id
            )));
        }

        let path = self.backup_path(id);
        if !path.exists() {
            return Err(DatabaseError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("backup '{}' not found in {}", id, self.backup_dir.display()),
            )));
        }
        Ok(path)
    }
}
