//! Repository layer for entity rows
//!
//! The engine never sees concrete model types. Every table is described by a
//! [`TableSchema`], rows travel as [`Record`]s (id + JSON object of columns),
//! and all reads and writes go through an [`EntityRepository`] looked up in an
//! explicitly injected [`RepositoryRegistry`].

pub mod error;
pub mod filter;
pub mod registry;
pub mod table;

pub use error::{StoreError, StoreResult};
pub use filter::Filter;
pub use registry::RepositoryRegistry;
pub use table::{TableRepository, TableSchema};

use crate::transaction::TransactionHandle;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Primary key of every row the engine touches
pub type RowId = i64;

/// Column name -> value for one row (scalars and foreign keys alike)
pub type FieldMap = Map<String, Value>;

/// Type tag of an entity; the table name it lives in
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityKind(String);

impl EntityKind {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityKind {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// One persisted row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: RowId,
    pub fields: FieldMap,
}

impl Record {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Foreign key value of `field`, `None` when missing or NULL
    pub fn get_id(&self, field: &str) -> Option<RowId> {
        self.fields.get(field).and_then(Value::as_i64)
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(Value::as_str)
    }
}

/// CRUD capabilities the engine needs from the persistence layer.
///
/// Every call runs on the caller's transaction; implementations must never
/// reach for a connection of their own.
#[async_trait]
pub trait EntityRepository: Send + Sync {
    fn schema(&self) -> &TableSchema;

    /// All rows matching `filter`, ordered by id
    async fn find_all(&self, tx: &mut TransactionHandle, filter: &Filter) -> StoreResult<Vec<Record>>;

    async fn find_by_id(&self, tx: &mut TransactionHandle, id: RowId) -> StoreResult<Option<Record>>;

    /// Insert `rows` and return them with their generated ids, in input order
    async fn bulk_create(&self, tx: &mut TransactionHandle, rows: Vec<FieldMap>) -> StoreResult<Vec<Record>>;

    /// Overwrite the columns present in `record.fields` for `record.id`
    async fn update(&self, tx: &mut TransactionHandle, record: &Record) -> StoreResult<()>;

    /// Delete every row matching `filter`, returning how many went
    async fn destroy(&self, tx: &mut TransactionHandle, filter: &Filter) -> StoreResult<u64>;
}
