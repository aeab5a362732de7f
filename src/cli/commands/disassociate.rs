use anyhow::Result;
use clap::Args;

use super::{CommandContext, engine_error, print_json, success};
use entity_graph::repository::RowId;

#[derive(Args)]
pub struct DisassociateArgs {
    /// Root whose associated rows are deleted
    #[arg(long)]
    pub root: RowId,
}

pub async fn disassociate_command(ctx: &CommandContext, args: DisassociateArgs) -> Result<()> {
    let engine = ctx.plan.build_engine(ctx.config.coordinator())?;

    let summary = engine
        .disassociator
        .disassociate(args.root, &ctx.plan.associations)
        .await
        .map_err(|e| engine_error("disassociate", e.kind(), e))?;

    print_json(&summary)?;
    success(&format!(
        "Deleted {} rows owned by {} {}",
        summary.total(),
        ctx.plan.root_kind(),
        args.root
    ));
    Ok(())
}
