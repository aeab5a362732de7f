//! Idempotent "create if absent" inserts for scoped lookup rows

use crate::repository::{EntityKind, FieldMap, Filter, Record, RepositoryRegistry, RowId, StoreResult};
use crate::transaction::{TransactionCoordinator, TransactionHandle};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;

fn default_name_field() -> String {
    "name".to_string()
}

/// A lookup table whose rows are unique by name within a scope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupSpec {
    pub kind: EntityKind,
    #[serde(default = "default_name_field")]
    pub name_field: String,
    pub scope_field: String,
}

/// Comparison key for lookup names
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

pub struct DedupBulkInserter {
    registry: Arc<RepositoryRegistry>,
    coordinator: TransactionCoordinator,
}

impl DedupBulkInserter {
    pub fn new(registry: Arc<RepositoryRegistry>, coordinator: TransactionCoordinator) -> Self {
        Self { registry, coordinator }
    }

    /// Insert the names not yet present in `scope` and return existing + created rows
    pub async fn bulk_create_with_check(
        &self,
        lookup: &LookupSpec,
        scope: RowId,
        names: &[String],
    ) -> StoreResult<Vec<Record>> {
        if names.is_empty() {
            return Ok(Vec::new());
        }

        let mut tx = self.coordinator.begin().await?;
        match insert_missing(&mut tx, &self.registry, lookup, scope, names).await {
            Ok(rows) => {
                self.coordinator.commit(tx).await?;
                Ok(rows)
            }
            Err(err) => {
                log::error!("Dedup insert into {} failed: {}", lookup.kind, err);
                if let Err(rollback_err) = self.coordinator.rollback(tx).await {
                    log::warn!("Rollback after failed dedup insert also failed: {}", rollback_err);
                }
                Err(err)
            }
        }
    }

    /// Same as [`Self::bulk_create_with_check`] on a transaction the caller owns
    pub async fn bulk_create_with_check_within(
        &self,
        tx: &mut TransactionHandle,
        lookup: &LookupSpec,
        scope: RowId,
        names: &[String],
    ) -> StoreResult<Vec<Record>> {
        insert_missing(tx, &self.registry, lookup, scope, names).await
    }
}

/// Candidate names with blanks dropped and case-insensitive duplicates collapsed
/// to their first spelling, as (normalized, trimmed original) pairs
fn unique_candidates(names: &[String]) -> Vec<(String, String)> {
    let mut seen = HashSet::new();
    names
        .iter()
        .map(|name| name.trim())
        .filter(|name| !name.is_empty())
        .filter_map(|name| {
            let normalized = normalize_name(name);
            seen.insert(normalized.clone()).then(|| (normalized, name.to_string()))
        })
        .collect()
}

pub(crate) async fn insert_missing(
    tx: &mut TransactionHandle,
    registry: &RepositoryRegistry,
    lookup: &LookupSpec,
    scope: RowId,
    names: &[String],
) -> StoreResult<Vec<Record>> {
    let candidates = unique_candidates(names);
    if candidates.is_empty() {
        return Ok(Vec::new());
    }

    let repo = registry.get(&lookup.kind)?;
    let wanted: HashSet<&str> = candidates.iter().map(|(normalized, _)| normalized.as_str()).collect();

    // LIKE and NOCASE only fold ASCII, so the scope is loaded and names compared here
    let mut rows: Vec<Record> = repo
        .find_all(tx, &Filter::eq(lookup.scope_field.as_str(), scope))
        .await?
        .into_iter()
        .filter(|record| {
            record
                .get_str(&lookup.name_field)
                .is_some_and(|name| wanted.contains(normalize_name(name).as_str()))
        })
        .collect();

    let present: HashSet<String> = rows
        .iter()
        .filter_map(|record| record.get_str(&lookup.name_field))
        .map(normalize_name)
        .collect();

    let missing: Vec<FieldMap> = candidates
        .iter()
        .filter(|(normalized, _)| !present.contains(normalized))
        .map(|(_, original)| {
            let mut fields = FieldMap::new();
            fields.insert(lookup.name_field.clone(), Value::String(original.clone()));
            fields.insert(lookup.scope_field.clone(), Value::from(scope));
            fields
        })
        .collect();

    let created_count = missing.len();
    if !missing.is_empty() {
        rows.extend(repo.bulk_create(tx, missing).await?);
    }

    log::info!(
        "Resolved {} {} names in scope {}: {} existing, {} created",
        candidates.len(),
        lookup.kind,
        scope,
        rows.len() - created_count,
        created_count
    );

    Ok(rows)
}
