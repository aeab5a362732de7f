//! SQLite-backed configuration
//!
//! Owns the connection pool for the graph database and the clone plans that
//! describe which tables hang off the root and how they are copied.

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};

use crate::transaction::TransactionCoordinator;

pub mod db;
pub mod migrations;
pub mod plan;

pub use plan::ClonePlan;

pub struct Config {
    pool: SqlitePool,
    db_path: PathBuf,
}

impl Config {
    /// Default database location, creating its directory if needed
    pub fn default_db_path() -> Result<PathBuf> {
        let config_dir = if cfg!(target_os = "linux") {
            dirs::config_dir()
                .context("Failed to get XDG config directory")?
                .join("entity-graph")
        } else {
            dirs::home_dir()
                .context("Failed to get home directory")?
                .join(".entity-graph")
        };

        Ok(config_dir.join("graph.db"))
    }

    /// Open (or create) the database and bring its schema up to date
    pub async fn load(db_path: Option<PathBuf>) -> Result<Self> {
        let db_path = match db_path {
            Some(path) => path,
            None => Self::default_db_path()?,
        };

        if let Some(dir) = db_path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            if !dir.exists() {
                std::fs::create_dir_all(dir)
                    .with_context(|| format!("Failed to create database directory: {:?}", dir))?;
                log::info!("Created database directory: {:?}", dir);
            }
        }

        log::debug!("Loading database from: {:?}", db_path);
        let pool = db::connect(&db_path).await?;
        db::run_migrations(&pool).await?;

        Ok(Self { pool, db_path })
    }

    /// Create a new config for testing (in-memory database)
    pub async fn new_test() -> Result<Self> {
        let pool = db::connect_memory().await?;
        db::run_migrations(&pool).await?;

        Ok(Self {
            pool,
            db_path: PathBuf::from(":memory:"),
        })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Transaction coordinator sharing this config's pool
    pub fn coordinator(&self) -> TransactionCoordinator {
        TransactionCoordinator::new(self.pool.clone())
    }

    pub async fn migrate_down(&self, target_version: i64) -> Result<()> {
        migrations::MigrationManager::new(&self.pool)
            .migrate_down(target_version)
            .await
    }

    pub async fn migration_status(&self) -> Result<migrations::MigrationStatus> {
        migrations::MigrationManager::new(&self.pool).status().await
    }
}
