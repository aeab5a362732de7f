//! Orchestrates the association strategies for one root pair

use super::context::CloneContext;
use super::descriptor::AssociationDescriptor;
use super::error::{CloneError, StrategyError};
use super::events::{CloneCompleted, CloneEventSink, LogSink};
use super::strategies;
use super::summary::CloneSummary;
use crate::error::ConfigurationError;
use crate::repository::{EntityKind, RepositoryRegistry, RowId};
use crate::transaction::{TransactionCoordinator, TransactionHandle};
use std::collections::HashSet;
use std::sync::Arc;

/// Copies the graph hanging off a source root onto a destination root
pub struct GraphCloner {
    registry: Arc<RepositoryRegistry>,
    coordinator: TransactionCoordinator,
    root_kind: EntityKind,
    sink: Arc<dyn CloneEventSink>,
}

impl GraphCloner {
    pub fn new(registry: Arc<RepositoryRegistry>, coordinator: TransactionCoordinator, root_kind: EntityKind) -> Self {
        Self {
            registry,
            coordinator,
            root_kind,
            sink: Arc::new(LogSink),
        }
    }

    /// Replace the sink notified after each committed clone
    pub fn with_sink(mut self, sink: Arc<dyn CloneEventSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn root_kind(&self) -> &EntityKind {
        &self.root_kind
    }

    /// Clone in a transaction of its own: either every descriptor lands or nothing does
    pub async fn clone_graph(
        &self,
        source_root_id: RowId,
        destination_root_id: RowId,
        descriptors: &[AssociationDescriptor],
    ) -> Result<CloneSummary, CloneError> {
        self.validate(source_root_id, destination_root_id, descriptors)?;

        let mut tx = self.coordinator.begin().await?;
        log::info!(
            "[{}] Cloning {} {} -> {} ({} associations)",
            tx.id(),
            self.root_kind,
            source_root_id,
            destination_root_id,
            descriptors.len()
        );

        match self.run(&mut tx, source_root_id, destination_root_id, descriptors).await {
            Ok(summary) => {
                self.coordinator.commit(tx).await?;
                log::info!("Cloned {} rows onto {} {}", summary.total(), self.root_kind, destination_root_id);
                self.sink.clone_completed(&CloneCompleted::new(summary.clone())).await;
                Ok(summary)
            }
            Err(err) => {
                log::error!("Clone of {} {} failed: {}", self.root_kind, source_root_id, err);
                if let Err(rollback_err) = self.coordinator.rollback(tx).await {
                    log::warn!("Rollback after failed clone also failed: {}", rollback_err);
                }
                Err(err)
            }
        }
    }

    /// Clone as one step of a larger operation. The caller owns the
    /// transaction, so the caller also commits and notifies.
    pub async fn clone_within(
        &self,
        tx: &mut TransactionHandle,
        source_root_id: RowId,
        destination_root_id: RowId,
        descriptors: &[AssociationDescriptor],
    ) -> Result<CloneSummary, CloneError> {
        self.validate(source_root_id, destination_root_id, descriptors)?;
        self.run(tx, source_root_id, destination_root_id, descriptors).await
    }

    /// Checks that need no database: distinct roots, a non-empty unique
    /// descriptor list, and every dependency cloned before its dependents.
    /// A special kind kept without `force_replace` copies no rows when the
    /// destination already has some, so nothing may depend on it.
    fn validate(
        &self,
        source_root_id: RowId,
        destination_root_id: RowId,
        descriptors: &[AssociationDescriptor],
    ) -> Result<(), CloneError> {
        if source_root_id == destination_root_id {
            return Err(ConfigurationError::SameRoot(source_root_id).into());
        }
        if descriptors.is_empty() {
            return Err(ConfigurationError::EmptyDescriptors.into());
        }

        let mut labels = HashSet::new();
        let mut cloned: HashSet<&EntityKind> = HashSet::from([&self.root_kind]);
        let mut skippable: HashSet<&EntityKind> = HashSet::new();
        for descriptor in descriptors {
            let label = descriptor.label();
            if !labels.insert(label.clone()) {
                return Err(ConfigurationError::DuplicateDescriptor(label).into());
            }
            let dependencies = descriptor.dependencies();
            if let Some(missing) = dependencies.iter().find(|dep| !cloned.contains(**dep)) {
                return Err(CloneError::CyclicOrderingDetected {
                    descriptor: label,
                    missing: (*missing).clone(),
                });
            }
            if let Some(kind) = dependencies.iter().find(|dep| skippable.contains(**dep)) {
                return Err(ConfigurationError::SkippableDependency {
                    descriptor: label,
                    kind: (*kind).clone(),
                }
                .into());
            }
            if let AssociationDescriptor::Special { kind, force_replace: false, .. } = descriptor {
                skippable.insert(kind);
            }
            cloned.insert(descriptor.kind());
        }

        Ok(())
    }

    async fn run(
        &self,
        tx: &mut TransactionHandle,
        source_root_id: RowId,
        destination_root_id: RowId,
        descriptors: &[AssociationDescriptor],
    ) -> Result<CloneSummary, CloneError> {
        let roots = self.registry.get(&self.root_kind)?;
        if roots.find_by_id(tx, source_root_id).await?.is_none() {
            return Err(CloneError::SourceNotFound(source_root_id));
        }
        if roots.find_by_id(tx, destination_root_id).await?.is_none() {
            return Err(CloneError::DestinationNotFound(destination_root_id));
        }

        let mut ctx = CloneContext::new(
            source_root_id,
            destination_root_id,
            &self.root_kind,
            &self.registry,
            tx,
        );
        let mut summary = CloneSummary::new(source_root_id, destination_root_id);

        for descriptor in descriptors {
            match strategies::clone_association(&mut ctx, descriptor).await {
                Ok(count) => {
                    log::debug!("Cloned {} rows for {}", count, descriptor.label());
                    summary.record(descriptor.label(), descriptor.kind().clone(), count);
                }
                Err(StrategyError::OrderingViolation { missing, .. }) => {
                    return Err(CloneError::CyclicOrderingDetected {
                        descriptor: descriptor.label(),
                        missing,
                    });
                }
                Err(cause) => {
                    return Err(CloneError::StrategyFailed {
                        descriptor: descriptor.label(),
                        cause,
                    });
                }
            }
        }

        summary.remapped = ctx.remap.len();
        Ok(summary)
    }
}
