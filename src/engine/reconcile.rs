//! Converge a persisted child collection onto a caller-supplied list
//!
//! One call runs deletes, then updates, then creates, all on the same
//! transaction. Order values are always the 1-based position of the item in
//! the desired list, whatever the caller put in its fields.

use super::error::ReconcileError;
use crate::repository::{EntityKind, FieldMap, Filter, Record, RepositoryRegistry, RowId};
use crate::transaction::{TransactionCoordinator, TransactionHandle};
use futures::future::{BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

fn default_order_field() -> String {
    "sort_order".to_string()
}

/// One reconcilable parent -> children relationship
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionSpec {
    pub parent_kind: EntityKind,
    pub child_kind: EntityKind,
    pub parent_key: String,
    #[serde(default = "default_order_field")]
    pub order_field: String,
    /// Columns copied from the parent row onto every created child
    #[serde(default)]
    pub inherit: Vec<String>,
    /// Collection owned by each child (objective -> sub-objectives)
    #[serde(default)]
    pub nested: Option<Box<CollectionSpec>>,
}

/// Desired state of one child.
///
/// Without an id the item is created; with one it must already belong to the
/// parent and is updated. `children: None` leaves the nested collection alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChildCollectionItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RowId>,
    #[serde(flatten)]
    pub fields: FieldMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<ChildCollectionItem>>,
}

impl ChildCollectionItem {
    pub fn new(fields: FieldMap) -> Self {
        Self {
            id: None,
            fields,
            children: None,
        }
    }

    pub fn existing(id: RowId, fields: FieldMap) -> Self {
        Self {
            id: Some(id),
            fields,
            children: None,
        }
    }

    pub fn with_children(mut self, children: Vec<ChildCollectionItem>) -> Self {
        self.children = Some(children);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileSummary {
    pub kind: EntityKind,
    pub parent_id: RowId,
    pub created: Vec<RowId>,
    pub updated: Vec<RowId>,
    pub deleted: Vec<RowId>,
    /// Final child ids in desired order
    pub ids: Vec<RowId>,
    /// Nested collection results keyed by the owning child id
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub nested: BTreeMap<RowId, ReconcileSummary>,
}

impl ReconcileSummary {
    fn new(kind: EntityKind, parent_id: RowId) -> Self {
        Self {
            kind,
            parent_id,
            created: Vec::new(),
            updated: Vec::new(),
            deleted: Vec::new(),
            ids: Vec::new(),
            nested: BTreeMap::new(),
        }
    }
}

/// What one level of reconciliation will do, computed before any write
#[derive(Debug, Default, PartialEq)]
struct ChangePlan {
    deletes: Vec<RowId>,
    /// (position in desired list, existing id)
    updates: Vec<(usize, RowId)>,
    /// positions in desired list
    creates: Vec<usize>,
}

fn plan_changes(
    kind: &EntityKind,
    parent_id: RowId,
    current: &[Record],
    desired: &[ChildCollectionItem],
) -> Result<ChangePlan, ReconcileError> {
    let owned: HashSet<RowId> = current.iter().map(|r| r.id).collect();
    let mut kept = HashSet::new();
    let mut plan = ChangePlan::default();

    for (position, item) in desired.iter().enumerate() {
        match item.id {
            Some(id) => {
                if !owned.contains(&id) {
                    return Err(ReconcileError::ItemNotOwnedByParent {
                        kind: kind.clone(),
                        id,
                        parent: parent_id,
                    });
                }
                if !kept.insert(id) {
                    return Err(ReconcileError::DuplicateItem { kind: kind.clone(), id });
                }
                plan.updates.push((position, id));
            }
            None => plan.creates.push(position),
        }
    }

    plan.deletes = current.iter().map(|r| r.id).filter(|id| !kept.contains(id)).collect();
    Ok(plan)
}

pub struct ReconciliationEngine {
    registry: Arc<RepositoryRegistry>,
    coordinator: TransactionCoordinator,
}

impl ReconciliationEngine {
    pub fn new(registry: Arc<RepositoryRegistry>, coordinator: TransactionCoordinator) -> Self {
        Self { registry, coordinator }
    }

    pub async fn reconcile(
        &self,
        spec: &CollectionSpec,
        parent_id: RowId,
        desired: &[ChildCollectionItem],
    ) -> Result<ReconcileSummary, ReconcileError> {
        let mut tx = self.coordinator.begin().await?;
        log::info!(
            "[{}] Reconciling {} of {} {} against {} items",
            tx.id(),
            spec.child_kind,
            spec.parent_kind,
            parent_id,
            desired.len()
        );

        match self.reconcile_within(&mut tx, spec, parent_id, desired).await {
            Ok(summary) => {
                self.coordinator.commit(tx).await?;
                Ok(summary)
            }
            Err(err) => {
                log::error!("Reconciling {} of {} {} failed: {}", spec.child_kind, spec.parent_kind, parent_id, err);
                if let Err(rollback_err) = self.coordinator.rollback(tx).await {
                    log::warn!("Rollback after failed reconciliation also failed: {}", rollback_err);
                }
                Err(err)
            }
        }
    }

    pub async fn reconcile_within(
        &self,
        tx: &mut TransactionHandle,
        spec: &CollectionSpec,
        parent_id: RowId,
        desired: &[ChildCollectionItem],
    ) -> Result<ReconcileSummary, ReconcileError> {
        let parents = self.registry.get(&spec.parent_kind)?;
        if parents.find_by_id(tx, parent_id).await?.is_none() {
            return Err(ReconcileError::ParentNotFound {
                kind: spec.parent_kind.clone(),
                id: parent_id,
            });
        }

        reconcile_level(tx, &self.registry, spec, parent_id, desired).await
    }
}

fn reconcile_level<'a>(
    tx: &'a mut TransactionHandle,
    registry: &'a RepositoryRegistry,
    spec: &'a CollectionSpec,
    parent_id: RowId,
    desired: &'a [ChildCollectionItem],
) -> BoxFuture<'a, Result<ReconcileSummary, ReconcileError>> {
    async move {
        let repo = registry.get(&spec.child_kind)?;
        let current = repo.find_all(tx, &Filter::eq(spec.parent_key.as_str(), parent_id)).await?;
        let plan = plan_changes(&spec.child_kind, parent_id, &current, desired)?;
        let mut summary = ReconcileSummary::new(spec.child_kind.clone(), parent_id);

        if !plan.deletes.is_empty() {
            delete_subtree(tx, registry, spec, plan.deletes.clone()).await?;
            summary.deleted = plan.deletes;
        }

        let mut ids: Vec<Option<RowId>> = vec![None; desired.len()];

        for &(position, id) in &plan.updates {
            let mut fields = delta(spec, &desired[position].fields);
            fields.insert(spec.order_field.clone(), Value::from(position as i64 + 1));
            repo.update(tx, &Record { id, fields }).await?;
            ids[position] = Some(id);
            summary.updated.push(id);
        }

        if !plan.creates.is_empty() {
            let inherited = inherited_fields(tx, registry, spec, parent_id).await?;
            let rows: Vec<FieldMap> = plan
                .creates
                .iter()
                .map(|&position| {
                    let mut fields = delta(spec, &desired[position].fields);
                    fields.extend(inherited.clone());
                    fields.insert(spec.parent_key.clone(), Value::from(parent_id));
                    fields.insert(spec.order_field.clone(), Value::from(position as i64 + 1));
                    fields
                })
                .collect();

            let created = repo.bulk_create(tx, rows).await?;
            for (&position, record) in plan.creates.iter().zip(&created) {
                ids[position] = Some(record.id);
                summary.created.push(record.id);
            }
        }

        summary.ids = ids.into_iter().flatten().collect();
        log::debug!(
            "{} under {}: {} created, {} updated, {} deleted",
            spec.child_kind,
            parent_id,
            summary.created.len(),
            summary.updated.len(),
            summary.deleted.len()
        );

        if let Some(nested) = spec.nested.as_deref() {
            let ids = summary.ids.clone();
            for (item, id) in desired.iter().zip(ids) {
                if let Some(children) = &item.children {
                    let child_summary = reconcile_level(tx, registry, nested, id, children).await?;
                    summary.nested.insert(id, child_summary);
                }
            }
        }

        Ok(summary)
    }
    .boxed()
}

/// Caller fields minus the columns reconciliation owns
fn delta(spec: &CollectionSpec, fields: &FieldMap) -> FieldMap {
    fields
        .iter()
        .filter(|(name, _)| {
            name.as_str() != "id"
                && name.as_str() != spec.parent_key
                && name.as_str() != spec.order_field
                && !spec.inherit.iter().any(|inherited| inherited == name.as_str())
        })
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

async fn inherited_fields(
    tx: &mut TransactionHandle,
    registry: &RepositoryRegistry,
    spec: &CollectionSpec,
    parent_id: RowId,
) -> Result<FieldMap, ReconcileError> {
    if spec.inherit.is_empty() {
        return Ok(FieldMap::new());
    }

    let parent = registry
        .get(&spec.parent_kind)?
        .find_by_id(tx, parent_id)
        .await?
        .ok_or_else(|| ReconcileError::ParentNotFound {
            kind: spec.parent_kind.clone(),
            id: parent_id,
        })?;

    Ok(spec
        .inherit
        .iter()
        .map(|field| (field.clone(), parent.get(field).cloned().unwrap_or(Value::Null)))
        .collect())
}

/// Delete `ids` after everything hanging off them in nested collections
fn delete_subtree<'a>(
    tx: &'a mut TransactionHandle,
    registry: &'a RepositoryRegistry,
    spec: &'a CollectionSpec,
    ids: Vec<RowId>,
) -> BoxFuture<'a, Result<u64, ReconcileError>> {
    async move {
        let mut removed = 0;

        if let Some(nested) = spec.nested.as_deref() {
            let repo = registry.get(&nested.child_kind)?;
            let children: Vec<RowId> = repo
                .find_all(tx, &Filter::any_of(nested.parent_key.as_str(), ids.clone()))
                .await?
                .into_iter()
                .map(|r| r.id)
                .collect();
            if !children.is_empty() {
                removed += delete_subtree(tx, registry, nested, children).await?;
            }
        }

        let repo = registry.get(&spec.child_kind)?;
        removed += repo.destroy(tx, &Filter::ids(ids)).await?;
        Ok(removed)
    }
    .boxed()
}
