use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;

use super::{CommandContext, engine_error, print_json, success};
use entity_graph::engine::ChildCollectionItem;
use entity_graph::repository::RowId;

#[derive(Args)]
pub struct ReconcileArgs {
    /// Collection name from the plan
    #[arg(long)]
    pub collection: String,
    /// Parent row owning the collection
    #[arg(long)]
    pub parent: RowId,
    /// JSON array of desired items, in order
    #[arg(long)]
    pub items: PathBuf,
}

pub async fn reconcile_command(ctx: &CommandContext, args: ReconcileArgs) -> Result<()> {
    let spec = ctx.plan.collection(&args.collection)?;

    let raw = std::fs::read_to_string(&args.items)
        .with_context(|| format!("Failed to read items file: {:?}", args.items))?;
    let items: Vec<ChildCollectionItem> =
        serde_json::from_str(&raw).with_context(|| format!("Failed to parse items file: {:?}", args.items))?;

    let engine = ctx.plan.build_engine(ctx.config.coordinator())?;
    let summary = engine
        .reconciler
        .reconcile(spec, args.parent, &items)
        .await
        .map_err(|e| engine_error("reconcile", e.kind(), e))?;

    print_json(&summary)?;
    success(&format!(
        "{} under {} {}: {} created, {} updated, {} deleted",
        spec.child_kind,
        spec.parent_kind,
        args.parent,
        summary.created.len(),
        summary.updated.len(),
        summary.deleted.len()
    ));
    Ok(())
}
