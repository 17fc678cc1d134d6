//! RelGraph Development Tool
//!
//! Inspect and maintain a graph database file from the command line.
//!
//! # Usage
//!
//! ```bash
//! relgraph-tool [--db <path>] <command> [args]
//!
//! relgraph-tool stats
//! relgraph-tool validate
//! relgraph-tool export graph.json        # "-" writes to stdout
//! relgraph-tool import graph.json merge  # or "replace"
//! relgraph-tool backup
//! relgraph-tool backups
//! relgraph-tool restore <backup-id>
//! ```
//!
//! # Environment Variables
//!
//! - `RELGRAPH_DB_PATH`: Database file (default: ~/.relgraph/database/graph.db)
//! - `RELGRAPH_BACKUP_DIR`: Backup directory (default: `<db dir>/backups`)
//! - `RUST_LOG`: Logging level (e.g., "info", "debug", "trace")

use std::env;
use std::path::PathBuf;

use anyhow::{bail, Context};
use relgraph_core::config::default_database_path;
use relgraph_core::models::ImportMode;
use relgraph_core::{GraphConfig, GraphDatabase};

const USAGE: &str = "usage: relgraph-tool [--db <path>] \
<stats|validate|export <file>|import <file> [replace|merge]|backup|backups|restore <id>>";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut args: Vec<String> = env::args().skip(1).collect();

    let mut config = GraphConfig::default().with_env_overrides();
    if let Some(pos) = args.iter().position(|a| a == "--db") {
        if pos + 1 >= args.len() {
            bail!("--db requires a path\n{}", USAGE);
        }
        let path = args.remove(pos + 1);
        args.remove(pos);
        config.database_path = Some(PathBuf::from(path));
    }
    if config.database_path.is_none() {
        config.database_path = Some(default_database_path()?);
    }

    let Some(command) = args.first().cloned() else {
        bail!(USAGE);
    };

    tracing::info!(
        "Database: {}",
        config
            .database_path
            .as_deref()
            .map(|p| p.display().to_string())
            .unwrap_or_default()
    );
    let db = GraphDatabase::open(config).await?;

    match command.as_str() {
        "stats" => {
            let stats = db.get_stats().await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        "validate" => {
            let report = db.validate_structured_relationships().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.is_valid() {
                tracing::warn!("{} problems found", report.errors.len());
            }
        }
        "export" => {
            let target = args.get(1).context("export requires a file (or -)")?;
            let json = db.export_to_json().await?;
            if target == "-" {
                println!("{}", json);
            } else {
                tokio::fs::write(target, json)
                    .await
                    .with_context(|| format!("failed to write {}", target))?;
                tracing::info!("Exported graph to {}", target);
            }
        }
        "import" => {
            let source = args.get(1).context("import requires a file")?;
            let mode = match args.get(2) {
                Some(mode) => mode.parse::<ImportMode>().map_err(anyhow::Error::msg)?,
                None => ImportMode::Merge,
            };
            let json = tokio::fs::read_to_string(source)
                .await
                .with_context(|| format!("failed to read {}", source))?;
            let result = db.import_from_json(&json, mode).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        "backup" => {
            let info = db.create_backup().await?;
            println!("{}", serde_json::to_string_pretty(&info)?);
        }
        "backups" => {
            let backups = db.list_backups().await?;
            println!("{}", serde_json::to_string_pretty(&backups)?);
        }
        "restore" => {
            let id = args.get(1).context("restore requires a backup id")?;
            let result = db.restore_from_backup(id).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        other => bail!("unknown command '{}'\n{}", other, USAGE),
    }

    db.close().await?;
    Ok(())
}
