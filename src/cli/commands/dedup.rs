use anyhow::Result;
use clap::Args;

use super::{CommandContext, engine_error, print_json, success};
use entity_graph::repository::RowId;

#[derive(Args)]
pub struct DedupArgs {
    /// Lookup name from the plan
    #[arg(long)]
    pub lookup: String,
    /// Scope the names belong to
    #[arg(long)]
    pub scope: RowId,
    /// Candidate names
    pub names: Vec<String>,
}

pub async fn dedup_command(ctx: &CommandContext, args: DedupArgs) -> Result<()> {
    let lookup = ctx.plan.lookup(&args.lookup)?;
    let engine = ctx.plan.build_engine(ctx.config.coordinator())?;

    let rows = engine
        .dedup
        .bulk_create_with_check(lookup, args.scope, &args.names)
        .await
        .map_err(|e| engine_error("dedup", e.kind(), e))?;

    print_json(&rows)?;
    success(&format!("{} {} rows in scope {}", rows.len(), lookup.kind, args.scope));
    Ok(())
}
