//! Error types for the repository layer.

use super::{EntityKind, RowId};
use crate::error::ErrorKind;
use thiserror::Error;

/// Result type for repository operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by repositories and the transaction coordinator.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Error reported by SQLite.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A row could not be decoded from or encoded to JSON.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// No repository was registered for the entity kind.
    #[error("no repository registered for entity kind '{0}'")]
    UnknownKind(EntityKind),

    /// A filter or row named a column the table does not declare.
    #[error("entity kind '{kind}' has no column '{column}'")]
    UnknownColumn { kind: EntityKind, column: String },

    /// Table or column name that is not a plain SQL identifier.
    #[error("invalid SQL identifier '{0}'")]
    InvalidIdentifier(String),

    /// Update target does not exist.
    #[error("{kind} row {id} not found")]
    RowNotFound { kind: EntityKind, id: RowId },
}

impl StoreError {
    /// Constraint rejections are integrity problems; everything else the
    /// database says is a transaction failure.
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::Database(sqlx::Error::Database(db)) => {
                if db.is_foreign_key_violation() || db.is_unique_violation() || db.is_check_violation() {
                    ErrorKind::IntegrityViolation
                } else {
                    ErrorKind::TransactionFailure
                }
            }
            StoreError::Database(_) | StoreError::Serialization(_) => ErrorKind::TransactionFailure,
            StoreError::UnknownKind(_)
            | StoreError::UnknownColumn { .. }
            | StoreError::InvalidIdentifier(_) => ErrorKind::ConfigurationError,
            StoreError::RowNotFound { .. } => ErrorKind::NotFound,
        }
    }
}
