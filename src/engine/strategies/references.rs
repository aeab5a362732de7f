//! Foreign key rewriting shared by the row-copying strategies

use super::super::context::CloneContext;
use super::super::dedup::{self, normalize_name, LookupSpec};
use super::super::descriptor::ForeignKeyRef;
use super::super::error::StrategyError;
use super::super::remap::IdentifierRemapTable;
use crate::repository::{EntityKind, FieldMap, Filter, Record, RowId};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};

/// Turns a source row into the field map of its copy
pub(super) struct FieldRewriter<'r> {
    kind: &'r EntityKind,
    parent_key: &'r str,
    references: &'r [ForeignKeyRef],
    /// field -> old lookup id -> lookup id in the destination scope
    lookups: HashMap<String, HashMap<RowId, RowId>>,
}

impl<'r> FieldRewriter<'r> {
    /// Resolve every shared lookup the sources point at before any row is written
    pub(super) async fn prepare(
        ctx: &mut CloneContext<'_>,
        kind: &'r EntityKind,
        parent_key: &'r str,
        references: &'r [ForeignKeyRef],
        sources: &[Record],
    ) -> Result<Self, StrategyError> {
        let mut lookups = HashMap::new();

        for reference in references {
            let ForeignKeyRef::SharedLookup { field, lookup } = reference else {
                continue;
            };
            let old_ids: BTreeSet<RowId> = sources.iter().filter_map(|source| source.get_id(field)).collect();
            let resolved = resolve_lookup(ctx, lookup, old_ids).await?;
            lookups.insert(field.clone(), resolved);
        }

        Ok(Self {
            kind,
            parent_key,
            references,
            lookups,
        })
    }

    pub(super) fn rewrite(
        &self,
        remap: &IdentifierRemapTable,
        source: &Record,
        destination_root_id: RowId,
    ) -> Result<FieldMap, StrategyError> {
        let mut fields = source.fields.clone();
        fields.insert(self.parent_key.to_string(), Value::from(destination_root_id));

        for reference in self.references {
            let field = reference.field();
            // NULL foreign keys stay NULL
            let Some(old_id) = source.get_id(field) else {
                continue;
            };

            let (target, new_id) = match reference {
                ForeignKeyRef::Remapped { target, .. } => (target, remap.resolve(target, old_id)),
                ForeignKeyRef::SharedLookup { lookup, .. } => (
                    &lookup.kind,
                    self.lookups.get(field).and_then(|ids| ids.get(&old_id)).copied(),
                ),
            };

            let new_id = new_id.ok_or_else(|| StrategyError::DanglingReference {
                kind: self.kind.clone(),
                row: source.id,
                field: field.to_string(),
                target: target.clone(),
                old_id,
            })?;
            fields.insert(field.to_string(), Value::from(new_id));
        }

        Ok(fields)
    }
}

/// Map source lookup rows onto same-named rows in the destination scope,
/// creating the ones that do not exist there yet
async fn resolve_lookup(
    ctx: &mut CloneContext<'_>,
    lookup: &LookupSpec,
    old_ids: BTreeSet<RowId>,
) -> Result<HashMap<RowId, RowId>, StrategyError> {
    if old_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let repo = ctx.registry.get(&lookup.kind)?;
    let originals = repo.find_all(ctx.tx, &Filter::ids(old_ids)).await?;
    let names: Vec<String> = originals
        .iter()
        .filter_map(|record| record.get_str(&lookup.name_field))
        .map(str::to_string)
        .collect();

    let resolved = dedup::insert_missing(ctx.tx, ctx.registry, lookup, ctx.destination_root_id, &names).await?;
    let by_name: HashMap<String, RowId> = resolved
        .iter()
        .filter_map(|record| {
            record
                .get_str(&lookup.name_field)
                .map(|name| (normalize_name(name), record.id))
        })
        .collect();

    Ok(originals
        .iter()
        .filter_map(|record| {
            let name = record.get_str(&lookup.name_field)?;
            by_name.get(&normalize_name(name)).map(|new_id| (record.id, *new_id))
        })
        .collect())
}
