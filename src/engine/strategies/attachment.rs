use super::super::context::CloneContext;
use super::super::error::StrategyError;
use crate::repository::{EntityKind, FieldMap, Filter};
use serde_json::Value;

/// Attachment rows keyed by (owner id, owner type). Owners must already be
/// remapped so every copy points at the new owner.
pub(super) async fn clone_attachments(
    ctx: &mut CloneContext<'_>,
    kind: &EntityKind,
    owner_kind: &EntityKind,
    owner_id_field: &str,
    owner_type_field: &str,
    imageable_type: &str,
) -> Result<usize, StrategyError> {
    if !ctx.remap.is_populated(owner_kind) {
        return Err(StrategyError::OrderingViolation {
            kind: kind.clone(),
            missing: owner_kind.clone(),
        });
    }

    let owner_ids = ctx.remap.old_ids(owner_kind);
    if owner_ids.is_empty() {
        ctx.remap.mark_populated(kind);
        return Ok(0);
    }

    let repo = ctx.registry.get(kind)?;
    let filter = Filter::eq(owner_type_field, imageable_type).and(Filter::any_of(owner_id_field, owner_ids));
    let sources = repo.find_all(ctx.tx, &filter).await?;

    let mut rows: Vec<FieldMap> = Vec::with_capacity(sources.len());
    for source in &sources {
        let old_owner = source.get_id(owner_id_field).unwrap_or_default();
        let new_owner = ctx
            .remap
            .resolve(owner_kind, old_owner)
            .ok_or_else(|| StrategyError::DanglingReference {
                kind: kind.clone(),
                row: source.id,
                field: owner_id_field.to_string(),
                target: owner_kind.clone(),
                old_id: old_owner,
            })?;

        let mut fields = source.fields.clone();
        fields.insert(owner_id_field.to_string(), Value::from(new_owner));
        rows.push(fields);
    }

    let created = repo.bulk_create(ctx.tx, rows).await?;
    for (source, record) in sources.iter().zip(&created) {
        ctx.remap.insert(kind, source.id, record.id)?;
    }
    ctx.remap.mark_populated(kind);

    log::debug!("Cloned {} {} rows for {} owners", created.len(), kind, imageable_type);
    Ok(created.len())
}
