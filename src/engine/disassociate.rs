//! Tear down everything a root owns across a descriptor list

use super::dedup::LookupSpec;
use super::descriptor::{AssociationDescriptor, ForeignKeyRef};
use super::error::DisassociateError;
use super::strategies::hierarchical::stage_levels;
use super::summary::DeletedSummary;
use crate::error::ConfigurationError;
use crate::repository::{EntityKind, FieldMap, Filter, Record, RepositoryRegistry, RowId, StoreResult};
use crate::transaction::{TransactionCoordinator, TransactionHandle};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

pub struct GraphDisassociator {
    registry: Arc<RepositoryRegistry>,
    coordinator: TransactionCoordinator,
    root_kind: EntityKind,
}

impl GraphDisassociator {
    pub fn new(registry: Arc<RepositoryRegistry>, coordinator: TransactionCoordinator, root_kind: EntityKind) -> Self {
        Self {
            registry,
            coordinator,
            root_kind,
        }
    }

    /// Delete every row attached to `root_id`, children before the rows they reference.
    /// The root itself is kept.
    pub async fn disassociate(
        &self,
        root_id: RowId,
        descriptors: &[AssociationDescriptor],
    ) -> Result<DeletedSummary, DisassociateError> {
        let mut tx = self.coordinator.begin().await?;
        log::info!("[{}] Disassociating {} {}", tx.id(), self.root_kind, root_id);

        match self.disassociate_within(&mut tx, root_id, descriptors).await {
            Ok(summary) => {
                self.coordinator.commit(tx).await?;
                log::info!("Removed {} rows from {} {}", summary.total(), self.root_kind, root_id);
                Ok(summary)
            }
            Err(err) => {
                log::error!("Disassociating {} {} failed: {}", self.root_kind, root_id, err);
                if let Err(rollback_err) = self.coordinator.rollback(tx).await {
                    log::warn!("Rollback after failed disassociation also failed: {}", rollback_err);
                }
                Err(err)
            }
        }
    }

    pub async fn disassociate_within(
        &self,
        tx: &mut TransactionHandle,
        root_id: RowId,
        descriptors: &[AssociationDescriptor],
    ) -> Result<DeletedSummary, DisassociateError> {
        if descriptors.is_empty() {
            return Err(ConfigurationError::EmptyDescriptors.into());
        }
        self.check_owners(descriptors)?;

        let roots = self.registry.get(&self.root_kind)?;
        if roots.find_by_id(tx, root_id).await?.is_none() {
            return Err(DisassociateError::RootNotFound(root_id));
        }

        // Owner rows may be deleted before their attachments are reached, so collect owners first
        let mut owners: HashMap<String, Vec<RowId>> = HashMap::new();
        for descriptor in descriptors {
            if let AssociationDescriptor::PolymorphicAttachment { owner_kind, .. } = descriptor {
                let ids = self.owner_ids(tx, root_id, owner_kind, descriptors).await?;
                owners.insert(descriptor.label(), ids);
            }
        }

        let mut summary = DeletedSummary::new(root_id);
        for descriptor in descriptors.iter().rev() {
            let count = match descriptor {
                AssociationDescriptor::Flat { kind, parent_key, .. }
                | AssociationDescriptor::Special { kind, parent_key, .. } => {
                    let repo = self.registry.get(kind)?;
                    repo.destroy(tx, &Filter::eq(parent_key.as_str(), root_id)).await? as usize
                }
                AssociationDescriptor::SelfReferencing { kind, parent_key, self_key, .. } => {
                    self.delete_hierarchy(tx, root_id, kind, parent_key, self_key).await?
                }
                AssociationDescriptor::PolymorphicAttachment {
                    kind,
                    owner_id_field,
                    owner_type_field,
                    imageable_type,
                    ..
                } => {
                    let owner_ids = owners.remove(&descriptor.label()).unwrap_or_default();
                    if owner_ids.is_empty() {
                        0
                    } else {
                        let filter = Filter::eq(owner_type_field.as_str(), imageable_type.as_str())
                            .and(Filter::any_of(owner_id_field.as_str(), owner_ids));
                        self.registry.get(kind)?.destroy(tx, &filter).await? as usize
                    }
                }
            };

            log::debug!("Deleted {} rows for {}", count, descriptor.label());
            summary.record(descriptor.label(), descriptor.kind().clone(), count);
        }

        // Lookup rows are referenced by the rows above, so they go last
        for lookup in scoped_lookups(descriptors) {
            let repo = self.registry.get(&lookup.kind)?;
            let count = repo.destroy(tx, &Filter::eq(lookup.scope_field.as_str(), root_id)).await? as usize;
            log::debug!("Deleted {} {} lookup rows", count, lookup.kind);
            summary.record(lookup.kind.to_string(), lookup.kind.clone(), count);
        }

        Ok(summary)
    }

    /// Every attachment owner must be the root or a kind owned by the root in this list
    fn check_owners(&self, descriptors: &[AssociationDescriptor]) -> Result<(), ConfigurationError> {
        for descriptor in descriptors {
            if let AssociationDescriptor::PolymorphicAttachment { kind, owner_kind, .. } = descriptor {
                let resolvable = *owner_kind == self.root_kind || owner_descriptor(descriptors, owner_kind).is_some();
                if !resolvable {
                    return Err(ConfigurationError::UnresolvableOwner {
                        kind: kind.clone(),
                        owner_kind: owner_kind.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    async fn owner_ids(
        &self,
        tx: &mut TransactionHandle,
        root_id: RowId,
        owner_kind: &EntityKind,
        descriptors: &[AssociationDescriptor],
    ) -> StoreResult<Vec<RowId>> {
        if *owner_kind == self.root_kind {
            return Ok(vec![root_id]);
        }
        let Some(parent_key) = owner_descriptor(descriptors, owner_kind) else {
            return Ok(Vec::new());
        };

        let rows = self
            .registry
            .get(owner_kind)?
            .find_all(tx, &Filter::eq(parent_key, root_id))
            .await?;
        Ok(rows.into_iter().map(|r| r.id).collect())
    }

    /// Leaves first, so no row is deleted while a child still points at it
    async fn delete_hierarchy(
        &self,
        tx: &mut TransactionHandle,
        root_id: RowId,
        kind: &EntityKind,
        parent_key: &str,
        self_key: &str,
    ) -> StoreResult<usize> {
        let repo = self.registry.get(kind)?;
        let rows = repo.find_all(tx, &Filter::eq(parent_key, root_id)).await?;
        let staged = stage_levels(&rows, self_key, true);
        let mut count = 0;

        // Rows caught in a parent cycle are unlinked before they go
        if !staged.unresolved.is_empty() {
            log::warn!("Breaking {} self-reference cycles in {}", staged.unresolved.len(), kind);
            for &i in &staged.unresolved {
                let mut fields = FieldMap::new();
                fields.insert(self_key.to_string(), Value::Null);
                repo.update(tx, &Record { id: rows[i].id, fields }).await?;
            }
            let ids = staged.unresolved.iter().map(|&i| rows[i].id);
            count += repo.destroy(tx, &Filter::ids(ids)).await? as usize;
        }

        for level in staged.levels.iter().rev() {
            let ids = level.iter().map(|&i| rows[i].id);
            count += repo.destroy(tx, &Filter::ids(ids)).await? as usize;
        }

        Ok(count)
    }
}

/// Lookups referenced by `descriptors` whose kind is not itself a descriptor, first use first
fn scoped_lookups(descriptors: &[AssociationDescriptor]) -> Vec<&LookupSpec> {
    let mut lookups: Vec<&LookupSpec> = Vec::new();
    for reference in descriptors.iter().flat_map(AssociationDescriptor::references) {
        if let ForeignKeyRef::SharedLookup { lookup, .. } = reference {
            let listed = descriptors.iter().any(|d| d.kind() == &lookup.kind);
            if !listed && !lookups.iter().any(|l| l.kind == lookup.kind) {
                lookups.push(lookup);
            }
        }
    }
    lookups
}

/// Parent key of the non-attachment descriptor cloning `owner_kind`
fn owner_descriptor<'d>(descriptors: &'d [AssociationDescriptor], owner_kind: &EntityKind) -> Option<&'d str> {
    descriptors
        .iter()
        .filter(|d| d.kind() == owner_kind)
        .find_map(AssociationDescriptor::parent_key)
}
