//! Transaction coordination
//!
//! Every mutating call in the engine takes an explicit [`TransactionHandle`].
//! Handles are created by the [`TransactionCoordinator`] and are either
//! committed, rolled back, or dropped (which rolls back).

use crate::error::ConfigurationError;
use crate::repository::StoreResult;
use sqlx::sqlite::{Sqlite, SqliteConnection, SqlitePool};
use uuid::Uuid;

/// One open SQLite transaction plus a correlation id for log lines
pub struct TransactionHandle {
    inner: sqlx::Transaction<'static, Sqlite>,
    id: Uuid,
}

impl TransactionHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Connection all statements of this transaction run on
    pub fn connection(&mut self) -> &mut SqliteConnection {
        &mut self.inner
    }
}

impl std::fmt::Debug for TransactionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionHandle").field("id", &self.id).finish()
    }
}

/// Hands out transactions on a pool
#[derive(Debug, Clone)]
pub struct TransactionCoordinator {
    pool: SqlitePool,
}

impl TransactionCoordinator {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Open a new top-level transaction
    pub async fn begin(&self) -> StoreResult<TransactionHandle> {
        let inner = self.pool.begin().await?;
        let id = Uuid::new_v4();
        log::debug!("Opened transaction {}", id);
        Ok(TransactionHandle { inner, id })
    }

    /// Nested transactions are not supported: callers that already hold a
    /// handle must pass it to the `*_within` variants instead.
    pub fn begin_nested(&self, parent: &TransactionHandle) -> Result<TransactionHandle, ConfigurationError> {
        log::warn!("Rejected nested transaction inside {}", parent.id());
        Err(ConfigurationError::NestedTransaction { parent: parent.id() })
    }

    pub async fn commit(&self, handle: TransactionHandle) -> StoreResult<()> {
        let id = handle.id;
        handle.inner.commit().await?;
        log::debug!("Committed transaction {}", id);
        Ok(())
    }

    pub async fn rollback(&self, handle: TransactionHandle) -> StoreResult<()> {
        let id = handle.id;
        handle.inner.rollback().await?;
        log::info!("Rolled back transaction {}", id);
        Ok(())
    }
}
