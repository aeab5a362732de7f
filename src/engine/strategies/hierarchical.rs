//! Self-referencing rows (zone -> sub-zone)
//!
//! Rows are staged in an arena and grouped into levels: a row lands in a
//! level only once its self-parent sits in an earlier one. Levels are then
//! inserted in order, so every self-parent is remapped before its children
//! are written and no pointer cycle is ever materialized.

use super::super::context::CloneContext;
use super::super::descriptor::ForeignKeyRef;
use super::super::error::StrategyError;
use super::check_dependencies;
use super::references::FieldRewriter;
use crate::repository::{EntityKind, Filter, Record, RowId};
use serde_json::Value;
use std::collections::HashMap;

/// Arena indices grouped by depth, plus rows that could not be placed
#[derive(Debug, Default, PartialEq)]
pub(crate) struct Levels {
    pub levels: Vec<Vec<usize>>,
    pub unresolved: Vec<usize>,
}

/// Group `rows` by hierarchy depth.
///
/// With `external_parents_are_roots` a self-parent outside `rows` counts as
/// already placed; otherwise such rows (and cycles) end up in `unresolved`.
pub(crate) fn stage_levels(rows: &[Record], self_key: &str, external_parents_are_roots: bool) -> Levels {
    let index: HashMap<RowId, usize> = rows.iter().enumerate().map(|(i, row)| (row.id, i)).collect();
    let mut placed = vec![false; rows.len()];
    let mut remaining: Vec<usize> = (0..rows.len()).collect();
    let mut levels = Vec::new();

    while !remaining.is_empty() {
        let (ready, blocked): (Vec<usize>, Vec<usize>) =
            remaining.iter().copied().partition(|&i| match rows[i].get_id(self_key) {
                None => true,
                Some(parent) => match index.get(&parent) {
                    Some(&p) => placed[p],
                    None => external_parents_are_roots,
                },
            });

        if ready.is_empty() {
            return Levels {
                levels,
                unresolved: blocked,
            };
        }

        for &i in &ready {
            placed[i] = true;
        }
        levels.push(ready);
        remaining = blocked;
    }

    Levels {
        levels,
        unresolved: Vec::new(),
    }
}

pub(super) async fn clone_hierarchy(
    ctx: &mut CloneContext<'_>,
    kind: &EntityKind,
    parent_key: &str,
    self_key: &str,
    references: &[ForeignKeyRef],
) -> Result<usize, StrategyError> {
    check_dependencies(ctx, kind, references)?;

    let repo = ctx.registry.get(kind)?;
    let sources = repo
        .find_all(ctx.tx, &Filter::eq(parent_key, ctx.source_root_id))
        .await?;

    let staged = stage_levels(&sources, self_key, false);
    if let Some(&first) = staged.unresolved.first() {
        // Prefer reporting a row whose parent is missing outright over one stuck behind it
        let culprit = staged
            .unresolved
            .iter()
            .copied()
            .find(|&i| {
                sources[i]
                    .get_id(self_key)
                    .is_some_and(|parent| !sources.iter().any(|s| s.id == parent))
            })
            .unwrap_or(first);
        return Err(StrategyError::DanglingSelfReference {
            kind: kind.clone(),
            row: sources[culprit].id,
            parent: sources[culprit].get_id(self_key).unwrap_or_default(),
        });
    }

    let rewriter = FieldRewriter::prepare(ctx, kind, parent_key, references, &sources).await?;
    let mut count = 0;

    for (depth, level) in staged.levels.iter().enumerate() {
        let mut rows = Vec::with_capacity(level.len());
        for &i in level {
            let source = &sources[i];
            let mut fields = rewriter.rewrite(&ctx.remap, source, ctx.destination_root_id)?;
            if let Some(old_parent) = source.get_id(self_key) {
                let new_parent = ctx
                    .remap
                    .resolve(kind, old_parent)
                    .ok_or_else(|| StrategyError::DanglingSelfReference {
                        kind: kind.clone(),
                        row: source.id,
                        parent: old_parent,
                    })?;
                fields.insert(self_key.to_string(), Value::from(new_parent));
            }
            rows.push(fields);
        }

        let created = repo.bulk_create(ctx.tx, rows).await?;
        for (&i, record) in level.iter().zip(&created) {
            ctx.remap.insert(kind, sources[i].id, record.id)?;
        }
        log::debug!("Cloned {} {} rows at depth {}", created.len(), kind, depth);
        count += created.len();
    }

    ctx.remap.mark_populated(kind);
    Ok(count)
}
