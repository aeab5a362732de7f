//! Error categories shared by every engine operation
//!
//! Each operation returns its own typed error, but all of them collapse onto
//! the same small set of categories so callers can decide how to react
//! (retry on transaction failures, report not-found, fix their plan, ...).

use crate::repository::{EntityKind, RowId};
use serde::Serialize;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Coarse classification of engine failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// A referenced root or parent row does not exist
    NotFound,
    /// Dangling references, rows claimed by the wrong parent, constraint rejections
    IntegrityViolation,
    /// Descriptors were supplied out of dependency order
    OrderingViolation,
    /// The store rejected a statement, the commit, or the connection
    TransactionFailure,
    /// The caller asked for something the engine does not support
    ConfigurationError,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::IntegrityViolation => "integrity_violation",
            ErrorKind::OrderingViolation => "ordering_violation",
            ErrorKind::TransactionFailure => "transaction_failure",
            ErrorKind::ConfigurationError => "configuration_error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller mistakes detected before (or instead of) touching the database
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("nested transactions are not supported (transaction {parent} is already open)")]
    NestedTransaction { parent: Uuid },

    #[error("at least one association descriptor is required")]
    EmptyDescriptors,

    #[error("source and destination root are the same row ({0})")]
    SameRoot(RowId),

    #[error("descriptor '{0}' appears more than once")]
    DuplicateDescriptor(String),

    #[error("'{descriptor}' references {kind}, which may be skipped; clone {kind} with force_replace")]
    SkippableDependency { descriptor: String, kind: EntityKind },

    #[error("cannot resolve owners of '{kind}': no descriptor for owner kind '{owner_kind}'")]
    UnresolvableOwner { kind: EntityKind, owner_kind: EntityKind },

    #[error("unknown collection '{0}'")]
    UnknownCollection(String),

    #[error("unknown lookup '{0}'")]
    UnknownLookup(String),
}
