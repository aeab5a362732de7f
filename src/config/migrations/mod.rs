//! Embedded up/down migrations for the graph database

use anyhow::{Context, Result};
use include_dir::{Dir, include_dir};
use sqlx::SqlitePool;
use std::collections::{BTreeMap, HashSet};

pub mod manager;

pub use manager::{MigrationManager, MigrationStatus};

static MIGRATIONS_DIR: Dir = include_dir!("$CARGO_MANIFEST_DIR/src/config/migrations/files");

#[derive(Debug, Clone)]
pub struct Migration {
    pub version: i64,
    pub name: String,
    pub up_sql: String,
    pub down_sql: String,
}

#[derive(Debug, Clone, serde::Serialize, sqlx::FromRow)]
pub struct AppliedMigration {
    pub version: i64,
    pub name: String,
    pub applied_at: String,
    pub checksum: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Down => "down",
        }
    }
}

/// Parse `NNN_name` into its version and name
fn parse_dir_name(dir_name: &str) -> Result<(i64, String)> {
    let (version, name) = dir_name
        .split_once('_')
        .with_context(|| format!("Invalid migration directory format: {}. Expected NNN_name", dir_name))?;
    let version: i64 = version
        .parse()
        .with_context(|| format!("Invalid migration version in directory: {}", dir_name))?;
    Ok((version, name.to_string()))
}

fn read_sql(dir_name: &str, file: &str) -> Result<String> {
    let path = format!("{}/{}", dir_name, file);
    let sql = MIGRATIONS_DIR
        .get_file(&path)
        .with_context(|| format!("Missing {} in migration {}", file, dir_name))?
        .contents_utf8()
        .with_context(|| format!("{} is not valid UTF-8 in migration {}", file, dir_name))?;
    Ok(sql.to_string())
}

/// Every migration under `files/`, keyed by version
pub fn load_migrations() -> Result<BTreeMap<i64, Migration>> {
    let mut migrations = BTreeMap::new();

    for entry in MIGRATIONS_DIR.dirs() {
        let dir_name = entry
            .path()
            .file_name()
            .and_then(|n| n.to_str())
            .context("Invalid migration directory name")?;
        let (version, name) = parse_dir_name(dir_name)?;

        let migration = Migration {
            version,
            name,
            up_sql: read_sql(dir_name, "up.sql")?,
            down_sql: read_sql(dir_name, "down.sql")?,
        };
        if migrations.insert(version, migration).is_some() {
            anyhow::bail!("Duplicate migration version {}", version);
        }
    }

    if migrations.is_empty() {
        anyhow::bail!("No migrations found in files directory");
    }

    Ok(migrations)
}

pub async fn init_migration_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            checksum TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create schema_migrations table")?;

    Ok(())
}

pub async fn get_applied_migrations(pool: &SqlitePool) -> Result<Vec<AppliedMigration>> {
    let migrations = sqlx::query_as::<_, AppliedMigration>(
        "SELECT version, name, applied_at, checksum FROM schema_migrations ORDER BY version",
    )
    .fetch_all(pool)
    .await
    .context("Failed to get applied migrations")?;

    Ok(migrations)
}

/// Checksum of migration SQL, insensitive to CRLF checkouts
pub fn calculate_checksum(sql: &str) -> String {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let normalized = sql.replace("\r\n", "\n");
    let mut hasher = DefaultHasher::new();
    normalized.trim().hash(&mut hasher);
    format!("{:x}", hasher.finish())
}

/// Applied migrations must still exist and be unchanged
pub async fn validate_migrations(pool: &SqlitePool) -> Result<()> {
    let available = load_migrations()?;

    for applied in get_applied_migrations(pool).await? {
        let Some(migration) = available.get(&applied.version) else {
            anyhow::bail!(
                "Applied migration {} '{}' not found in available migrations",
                applied.version,
                applied.name
            );
        };
        let expected = calculate_checksum(&migration.up_sql);
        if applied.checksum != expected {
            anyhow::bail!(
                "Migration {} checksum mismatch (applied {}, expected {}); the file was modified after it ran",
                applied.version,
                applied.checksum,
                expected
            );
        }
    }

    Ok(())
}

pub async fn get_pending_migrations(pool: &SqlitePool) -> Result<Vec<Migration>> {
    let applied: HashSet<i64> = get_applied_migrations(pool)
        .await?
        .into_iter()
        .map(|m| m.version)
        .collect();

    Ok(load_migrations()?
        .into_values()
        .filter(|m| !applied.contains(&m.version))
        .collect())
}

/// Highest applied version, `None` on a fresh database
pub async fn get_current_version(pool: &SqlitePool) -> Result<Option<i64>> {
    let version: Option<i64> = sqlx::query_scalar("SELECT MAX(version) FROM schema_migrations")
        .fetch_one(pool)
        .await
        .context("Failed to get current schema version")?;

    Ok(version)
}
