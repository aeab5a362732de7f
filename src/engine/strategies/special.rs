use super::super::context::CloneContext;
use super::super::descriptor::ForeignKeyRef;
use super::super::error::StrategyError;
use super::{check_dependencies, copy_rows};
use crate::repository::{EntityKind, Filter};

/// Singleton-per-root data: replace (or keep) what the destination already
/// has instead of appending a second copy. Kept rows get no remap entries,
/// so the cloner refuses plans that reference a kind cloned this way.
pub(super) async fn clone_special(
    ctx: &mut CloneContext<'_>,
    kind: &EntityKind,
    parent_key: &str,
    force_replace: bool,
    references: &[ForeignKeyRef],
) -> Result<usize, StrategyError> {
    check_dependencies(ctx, kind, references)?;

    let repo = ctx.registry.get(kind)?;
    let at_destination = Filter::eq(parent_key, ctx.destination_root_id);

    if force_replace {
        let removed = repo.destroy(ctx.tx, &at_destination).await?;
        if removed > 0 {
            log::info!("Replaced {} existing {} rows on root {}", removed, kind, ctx.destination_root_id);
        }
    } else if !repo.find_all(ctx.tx, &at_destination).await?.is_empty() {
        log::info!(
            "Root {} already has {} rows, leaving them in place",
            ctx.destination_root_id,
            kind
        );
        ctx.remap.mark_populated(kind);
        return Ok(0);
    }

    let sources = repo
        .find_all(ctx.tx, &Filter::eq(parent_key, ctx.source_root_id))
        .await?;

    copy_rows(ctx, repo.as_ref(), kind, parent_key, references, &sources).await
}
