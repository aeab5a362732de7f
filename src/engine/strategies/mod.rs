//! Association cloning strategies, one per descriptor variant

mod attachment;
mod flat;
pub(crate) mod hierarchical;
mod references;
mod special;

use self::references::FieldRewriter;
use super::context::CloneContext;
use super::descriptor::{AssociationDescriptor, ForeignKeyRef};
use super::error::StrategyError;
use crate::repository::{EntityKind, EntityRepository, Record};

/// Clone one edge for the context's root pair, returning how many rows were created
pub async fn clone_association(
    ctx: &mut CloneContext<'_>,
    descriptor: &AssociationDescriptor,
) -> Result<usize, StrategyError> {
    log::debug!(
        "[{}] Cloning {} with {} strategy",
        ctx.tx.id(),
        descriptor.label(),
        descriptor.strategy_name()
    );

    match descriptor {
        AssociationDescriptor::Flat { kind, parent_key, references } => {
            flat::clone_flat(ctx, kind, parent_key, references).await
        }
        AssociationDescriptor::SelfReferencing { kind, parent_key, self_key, references } => {
            hierarchical::clone_hierarchy(ctx, kind, parent_key, self_key, references).await
        }
        AssociationDescriptor::PolymorphicAttachment {
            kind,
            owner_kind,
            owner_id_field,
            owner_type_field,
            imageable_type,
        } => {
            attachment::clone_attachments(ctx, kind, owner_kind, owner_id_field, owner_type_field, imageable_type)
                .await
        }
        AssociationDescriptor::Special { kind, parent_key, force_replace, references } => {
            special::clone_special(ctx, kind, parent_key, *force_replace, references).await
        }
    }
}

/// Every remapped reference must point at a kind that has already been cloned
fn check_dependencies(
    ctx: &CloneContext<'_>,
    kind: &EntityKind,
    references: &[ForeignKeyRef],
) -> Result<(), StrategyError> {
    for reference in references {
        if let ForeignKeyRef::Remapped { target, .. } = reference {
            if !ctx.remap.is_populated(target) {
                return Err(StrategyError::OrderingViolation {
                    kind: kind.clone(),
                    missing: target.clone(),
                });
            }
        }
    }
    Ok(())
}

/// Copy `sources` under the destination root and record their remap entries
async fn copy_rows(
    ctx: &mut CloneContext<'_>,
    repo: &dyn EntityRepository,
    kind: &EntityKind,
    parent_key: &str,
    references: &[ForeignKeyRef],
    sources: &[Record],
) -> Result<usize, StrategyError> {
    if sources.is_empty() {
        ctx.remap.mark_populated(kind);
        return Ok(0);
    }

    let rewriter = FieldRewriter::prepare(ctx, kind, parent_key, references, sources).await?;
    let rows = sources
        .iter()
        .map(|source| rewriter.rewrite(&ctx.remap, source, ctx.destination_root_id))
        .collect::<Result<Vec<_>, _>>()?;

    let created = repo.bulk_create(ctx.tx, rows).await?;
    for (source, record) in sources.iter().zip(&created) {
        ctx.remap.insert(kind, source.id, record.id)?;
    }
    ctx.remap.mark_populated(kind);

    Ok(created.len())
}
