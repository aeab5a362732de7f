use super::super::context::CloneContext;
use super::super::descriptor::ForeignKeyRef;
use super::super::error::StrategyError;
use super::{check_dependencies, copy_rows};
use crate::repository::{EntityKind, Filter};

/// Independent children: copy every row owned by the source root
pub(super) async fn clone_flat(
    ctx: &mut CloneContext<'_>,
    kind: &EntityKind,
    parent_key: &str,
    references: &[ForeignKeyRef],
) -> Result<usize, StrategyError> {
    check_dependencies(ctx, kind, references)?;

    let repo = ctx.registry.get(kind)?;
    let sources = repo
        .find_all(ctx.tx, &Filter::eq(parent_key, ctx.source_root_id))
        .await?;

    let count = copy_rows(ctx, repo.as_ref(), kind, parent_key, references, &sources).await?;
    log::debug!("Cloned {} {} rows", count, kind);
    Ok(count)
}
