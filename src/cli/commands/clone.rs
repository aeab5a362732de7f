use anyhow::Result;
use clap::Args;
use std::sync::Arc;

use super::{CommandContext, engine_error, print_json, success};
use entity_graph::engine::AuditSink;
use entity_graph::repository::RowId;

#[derive(Args)]
pub struct CloneArgs {
    /// Root whose graph is copied
    #[arg(long)]
    pub source: RowId,
    /// Existing root that receives the copy
    #[arg(long)]
    pub destination: RowId,
}

pub async fn clone_command(ctx: &CommandContext, args: CloneArgs) -> Result<()> {
    let engine = ctx
        .plan
        .build_engine(ctx.config.coordinator())?
        .with_sink(Arc::new(AuditSink::new(ctx.config.pool().clone())));

    let summary = engine
        .cloner
        .clone_graph(args.source, args.destination, &ctx.plan.associations)
        .await
        .map_err(|e| engine_error("clone", e.kind(), e))?;

    print_json(&summary)?;
    success(&format!(
        "Cloned {} rows from {} {} to {}",
        summary.total(),
        ctx.plan.root_kind(),
        args.source,
        args.destination
    ));
    Ok(())
}
