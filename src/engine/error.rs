//! Typed failures of the engine operations

use crate::error::{ConfigurationError, ErrorKind};
use crate::repository::{EntityKind, RowId, StoreError};
use thiserror::Error;

/// Failure inside a single association strategy
#[derive(Debug, Error)]
pub enum StrategyError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("{kind} row {row} references parent {parent}, which was not cloned in this operation")]
    DanglingSelfReference { kind: EntityKind, row: RowId, parent: RowId },

    #[error("{kind} row {row}: {field} points at {target} {old_id}, which has no remap entry")]
    DanglingReference {
        kind: EntityKind,
        row: RowId,
        field: String,
        target: EntityKind,
        old_id: RowId,
    },

    #[error("{kind} depends on {missing}, which has not been cloned yet")]
    OrderingViolation { kind: EntityKind, missing: EntityKind },

    #[error("{kind} {old_id} was already remapped in this operation")]
    DuplicateRemap { kind: EntityKind, old_id: RowId },
}

impl StrategyError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StrategyError::Store(err) => err.kind(),
            StrategyError::DanglingSelfReference { .. }
            | StrategyError::DanglingReference { .. }
            | StrategyError::DuplicateRemap { .. } => ErrorKind::IntegrityViolation,
            StrategyError::OrderingViolation { .. } => ErrorKind::OrderingViolation,
        }
    }
}

#[derive(Debug, Error)]
pub enum CloneError {
    #[error("source root {0} not found")]
    SourceNotFound(RowId),

    #[error("destination root {0} not found")]
    DestinationNotFound(RowId),

    #[error("cloning {descriptor} failed: {cause}")]
    StrategyFailed {
        descriptor: String,
        #[source]
        cause: StrategyError,
    },

    #[error("{descriptor} needs {missing} to be cloned first")]
    CyclicOrderingDetected { descriptor: String, missing: EntityKind },

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("transaction failed: {0}")]
    TransactionFailure(#[from] StoreError),
}

impl CloneError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CloneError::SourceNotFound(_) | CloneError::DestinationNotFound(_) => ErrorKind::NotFound,
            CloneError::StrategyFailed { cause, .. } => cause.kind(),
            CloneError::CyclicOrderingDetected { .. } => ErrorKind::OrderingViolation,
            CloneError::Configuration(_) => ErrorKind::ConfigurationError,
            CloneError::TransactionFailure(err) => err.kind(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("{kind} parent {id} not found")]
    ParentNotFound { kind: EntityKind, id: RowId },

    #[error("{kind} row {id} is not owned by parent {parent}")]
    ItemNotOwnedByParent { kind: EntityKind, id: RowId, parent: RowId },

    #[error("{kind} row {id} appears more than once in the desired list")]
    DuplicateItem { kind: EntityKind, id: RowId },

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("transaction failed: {0}")]
    TransactionFailure(#[from] StoreError),
}

impl ReconcileError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ReconcileError::ParentNotFound { .. } => ErrorKind::NotFound,
            ReconcileError::ItemNotOwnedByParent { .. } | ReconcileError::DuplicateItem { .. } => {
                ErrorKind::IntegrityViolation
            }
            ReconcileError::Configuration(_) => ErrorKind::ConfigurationError,
            ReconcileError::TransactionFailure(err) => err.kind(),
        }
    }
}

#[derive(Debug, Error)]
pub enum DisassociateError {
    #[error("root {0} not found")]
    RootNotFound(RowId),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("transaction failed: {0}")]
    TransactionFailure(#[from] StoreError),
}

impl DisassociateError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DisassociateError::RootNotFound(_) => ErrorKind::NotFound,
            DisassociateError::Configuration(_) => ErrorKind::ConfigurationError,
            DisassociateError::TransactionFailure(err) => err.kind(),
        }
    }
}
