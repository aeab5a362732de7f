//! Runs migrations up and down

use anyhow::{Context, Result};
use log::{debug, info, warn};
use serde::Serialize;
use sqlx::SqlitePool;

use super::{
    AppliedMigration, Direction, Migration, calculate_checksum, get_applied_migrations, get_current_version,
    get_pending_migrations, init_migration_table, load_migrations, validate_migrations,
};

pub struct MigrationManager<'a> {
    pool: &'a SqlitePool,
}

impl<'a> MigrationManager<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn init(&self) -> Result<()> {
        debug!("Initializing migration system");
        init_migration_table(self.pool).await
    }

    /// Run all pending migrations
    pub async fn migrate_up(&self) -> Result<()> {
        self.init().await?;
        validate_migrations(self.pool).await?;

        let pending = get_pending_migrations(self.pool).await?;
        if pending.is_empty() {
            debug!("No pending migrations");
            return Ok(());
        }

        info!("Running {} pending migrations", pending.len());
        for migration in pending {
            self.apply_migration(&migration, Direction::Up).await?;
        }

        Ok(())
    }

    /// Roll back every migration above `target_version` (all of them for 0)
    pub async fn migrate_down(&self, target_version: i64) -> Result<()> {
        self.init().await?;
        validate_migrations(self.pool).await?;

        let current = get_current_version(self.pool).await?.unwrap_or(0);
        if target_version >= current {
            info!("Already at or below target version {}", target_version);
            return Ok(());
        }

        let available = load_migrations()?;
        let applied = get_applied_migrations(self.pool).await?;

        let mut to_rollback = Vec::new();
        for migration in applied.into_iter().rev().filter(|m| m.version > target_version) {
            let Some(available) = available.get(&migration.version) else {
                anyhow::bail!("Cannot roll back migration {}: migration file not found", migration.version);
            };
            to_rollback.push(available.clone());
        }

        info!("Rolling back {} migrations to version {}", to_rollback.len(), target_version);
        for migration in to_rollback {
            self.apply_migration(&migration, Direction::Down).await?;
        }

        Ok(())
    }

    async fn apply_migration(&self, migration: &Migration, direction: Direction) -> Result<()> {
        let sql = match direction {
            Direction::Up => &migration.up_sql,
            Direction::Down => &migration.down_sql,
        };

        info!(
            "{} migration {} '{}'",
            match direction {
                Direction::Up => "Applying",
                Direction::Down => "Rolling back",
            },
            migration.version,
            migration.name
        );

        let mut tx = self.pool.begin().await.context("Failed to start migration transaction")?;

        if sql.trim().is_empty() {
            warn!("Migration {} has empty {} SQL", migration.version, direction.as_str());
        } else {
            debug!("Executing SQL:\n{}", sql);
            sqlx::raw_sql(sql).execute(&mut *tx).await.with_context(|| {
                format!(
                    "Failed to execute migration {} {} SQL",
                    migration.version,
                    direction.as_str()
                )
            })?;
        }

        match direction {
            Direction::Up => {
                sqlx::query("INSERT INTO schema_migrations (version, name, checksum) VALUES (?, ?, ?)")
                    .bind(migration.version)
                    .bind(&migration.name)
                    .bind(calculate_checksum(&migration.up_sql))
                    .execute(&mut *tx)
                    .await
                    .context("Failed to record migration")?;
            }
            Direction::Down => {
                sqlx::query("DELETE FROM schema_migrations WHERE version = ?")
                    .bind(migration.version)
                    .execute(&mut *tx)
                    .await
                    .context("Failed to remove migration record")?;
            }
        }

        tx.commit().await.context("Failed to commit migration transaction")?;
        Ok(())
    }

    pub async fn status(&self) -> Result<MigrationStatus> {
        self.init().await?;

        let applied = get_applied_migrations(self.pool).await?;
        let pending = get_pending_migrations(self.pool).await?;

        Ok(MigrationStatus {
            current_version: get_current_version(self.pool).await?,
            applied,
            pending: pending.into_iter().map(|m| (m.version, m.name)).collect(),
        })
    }
}

#[derive(Debug, Serialize)]
pub struct MigrationStatus {
    pub current_version: Option<i64>,
    pub applied: Vec<AppliedMigration>,
    /// (version, name) of migrations not yet applied
    pub pending: Vec<(i64, String)>,
}

impl MigrationStatus {
    pub fn is_up_to_date(&self) -> bool {
        self.pending.is_empty()
    }
}
