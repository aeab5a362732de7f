//! Graph cloning, reconciliation, dedup inserts and teardown
//!
//! Every operation comes in two flavours: one that opens and finishes its
//! own transaction, and a `*_within` variant that runs on a handle the
//! caller already holds (nested transactions are rejected by the
//! coordinator, so the handle is reused instead).

pub mod cloner;
pub mod context;
pub mod dedup;
pub mod descriptor;
pub mod disassociate;
pub mod error;
pub mod events;
pub mod reconcile;
pub mod remap;
pub mod strategies;
pub mod summary;

pub use cloner::GraphCloner;
pub use context::CloneContext;
pub use dedup::{DedupBulkInserter, LookupSpec, normalize_name};
pub use descriptor::{AssociationDescriptor, ForeignKeyRef};
pub use disassociate::GraphDisassociator;
pub use error::{CloneError, DisassociateError, ReconcileError, StrategyError};
pub use events::{AuditSink, CloneCompleted, CloneEventSink, LogSink};
pub use reconcile::{ChildCollectionItem, CollectionSpec, ReconcileSummary, ReconciliationEngine};
pub use remap::IdentifierRemapTable;
pub use summary::{AssociationCount, CloneSummary, DeletedSummary};

use crate::repository::{EntityKind, RepositoryRegistry};
use crate::transaction::TransactionCoordinator;
use std::sync::Arc;

/// The four engine components wired to one registry and one pool
pub struct Engine {
    pub cloner: GraphCloner,
    pub reconciler: ReconciliationEngine,
    pub dedup: DedupBulkInserter,
    pub disassociator: GraphDisassociator,
}

impl Engine {
    pub fn new(registry: Arc<RepositoryRegistry>, coordinator: TransactionCoordinator, root_kind: EntityKind) -> Self {
        Self {
            cloner: GraphCloner::new(registry.clone(), coordinator.clone(), root_kind.clone()),
            reconciler: ReconciliationEngine::new(registry.clone(), coordinator.clone()),
            dedup: DedupBulkInserter::new(registry.clone(), coordinator.clone()),
            disassociator: GraphDisassociator::new(registry, coordinator, root_kind),
        }
    }

    /// Route clone notifications to `sink` instead of the log
    pub fn with_sink(mut self, sink: Arc<dyn CloneEventSink>) -> Self {
        self.cloner = self.cloner.with_sink(sink);
        self
    }
}
