//! Configuration
//!
//! Database location, backup directory and busy timeout, with defaults,
//! JSON-file loading and environment overrides.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable overriding the database file location
pub const ENV_DB_PATH: &str = "RELGRAPH_DB_PATH";
/// Environment variable overriding the backup directory
pub const ENV_BACKUP_DIR: &str = "RELGRAPH_BACKUP_DIR";
/// Environment variable overriding the SQLite busy timeout
pub const ENV_BUSY_TIMEOUT_MS: &str = "RELGRAPH_BUSY_TIMEOUT_MS";

/// Configuration for the embedded graph database
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Database file. `None` opens a private in-memory database.
    pub database_path: Option<PathBuf>,

    /// Directory for backup snapshots (defaults to `<db dir>/backups`)
    pub backup_dir: Option<PathBuf>,

    /// How long SQLite waits on a locked database before failing
    pub busy_timeout_ms: u64,

    /// Enable Write-Ahead Logging for file databases
    pub enable_wal: bool,

    /// Enforce foreign key constraints between relationships and nodes
    pub enforce_foreign_keys: bool,

    /// Run the persistence hook after every committed transaction
    pub persist_on_commit: bool,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            backup_dir: None,
            busy_timeout_ms: 5000,
            enable_wal: true,
            enforce_foreign_keys: true,
            persist_on_commit: true,
        }
    }
}

impl GraphConfig {
    /// In-memory configuration (nothing touches the filesystem)
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// File-backed configuration at `path`
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            database_path: Some(path.into()),
            ..Self::default()
        }
    }

    /// Load configuration from a JSON file; missing fields use defaults
    pub fn from_file(path: &Path) -> Result<Self, std::io::Error> {
        let raw = std::fs::read_to_string(path)?;
        serde_json::from_str(&raw)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    /// Apply `RELGRAPH_*` environment overrides
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(path) = std::env::var(ENV_DB_PATH) {
            if !path.is_empty() {
                self.database_path = Some(PathBuf::from(path));
            }
        }
        if let Ok(dir) = std::env::var(ENV_BACKUP_DIR) {
            if !dir.is_empty() {
                self.backup_dir = Some(PathBuf::from(dir));
            }
        }
        if let Some(timeout) = std::env::var(ENV_BUSY_TIMEOUT_MS)
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
        {
            self.busy_timeout_ms = timeout;
        }
        self
    }

    /// Backup directory, if the database lives on disk
    pub fn resolve_backup_dir(&self) -> Option<PathBuf> {
        if let Some(dir) = &self.backup_dir {
            return Some(dir.clone());
        }
        self.database_path.as_ref().map(|db| {
            db.parent()
                .map(Path::to_path_buf)
                .unwrap_or_default()
                .join("backups")
        })
    }
}

/// Default database location: `~/.relgraph/database/graph.db`
pub fn default_database_path() -> Result<PathBuf, std::io::Error> {
    let home_dir = dirs::home_dir().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "Cannot determine home directory",
        )
    })?;

    Ok(home_dir.join(".relgraph").join("database").join("graph.db"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = GraphConfig::default();
        assert!(config.database_path.is_none());
        assert_eq!(config.busy_timeout_ms, 5000);
        assert!(config.enforce_foreign_keys);
        assert!(config.resolve_backup_dir().is_none());
    }

    #[test]
    fn test_backup_dir_defaults_next_to_database() {
        let config = GraphConfig::with_path("/tmp/graphs/main.db");
        assert_eq!(
            config.resolve_backup_dir(),
            Some(PathBuf::from("/tmp/graphs/backups"))
        );
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: GraphConfig =
            serde_json::from_str(r#"{"busy_timeout_ms": 250, "enable_wal": false}"#).unwrap();
        assert_eq!(config.busy_timeout_ms, 250);
        assert!(!config.enable_wal);
        assert!(config.persist_on_commit);
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("graph.json");
        std::fs::write(&path, r#"{"database_path": "/data/g.db"}"#).unwrap();

        let config = GraphConfig::from_file(&path).unwrap();
        assert_eq!(config.database_path, Some(PathBuf::from("/data/g.db")));
    }
}
