//! Notifications emitted after a clone has been committed

use super::summary::CloneSummary;
use crate::repository::RowId;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;

#[derive(Debug, Clone, Serialize)]
pub struct CloneCompleted {
    /// The destination root that now owns the cloned graph
    pub root_id: RowId,
    pub source_root_id: RowId,
    pub summary: CloneSummary,
    pub completed_at: DateTime<Utc>,
}

impl CloneCompleted {
    pub fn new(summary: CloneSummary) -> Self {
        Self {
            root_id: summary.destination_root_id,
            source_root_id: summary.source_root_id,
            summary,
            completed_at: Utc::now(),
        }
    }
}

/// Receiver of clone notifications. Sinks run after commit, so they cannot
/// fail the clone; implementations log their own errors.
#[async_trait]
pub trait CloneEventSink: Send + Sync {
    async fn clone_completed(&self, event: &CloneCompleted);
}

/// Writes the event to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

#[async_trait]
impl CloneEventSink for LogSink {
    async fn clone_completed(&self, event: &CloneCompleted) {
        log::info!(
            "Clone completed: root {} -> {}, {} rows across {} associations",
            event.source_root_id,
            event.root_id,
            event.summary.total(),
            event.summary.associations.len()
        );
    }
}

/// Persists every completed clone to the `clone_runs` table
#[derive(Debug, Clone)]
pub struct AuditSink {
    pool: SqlitePool,
}

impl AuditSink {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn record(&self, event: &CloneCompleted) -> anyhow::Result<()> {
        let summary_json = serde_json::to_string(&event.summary)?;

        sqlx::query(
            r#"
            INSERT INTO clone_runs (
                source_root_id, destination_root_id, rows_cloned, summary_json, completed_at
            )
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(event.source_root_id)
        .bind(event.root_id)
        .bind(event.summary.total() as i64)
        .bind(&summary_json)
        .bind(event.completed_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl CloneEventSink for AuditSink {
    async fn clone_completed(&self, event: &CloneCompleted) {
        match self.record(event).await {
            Ok(()) => log::debug!("Recorded clone run for root {}", event.root_id),
            Err(e) => log::warn!("Failed to record clone run for root {}: {}", event.root_id, e),
        }
    }
}
