pub mod clone;
pub mod dedup;
pub mod disassociate;
pub mod migrate;
pub mod reconcile;

use anyhow::Result;
use colored::*;
use entity_graph::ErrorKind;
use serde::Serialize;

use super::app::Commands;
use entity_graph::config::{ClonePlan, Config};

/// Everything a command needs: the opened database and the active plan
pub struct CommandContext {
    pub config: Config,
    pub plan: ClonePlan,
}

pub async fn run(ctx: &CommandContext, command: Commands) -> Result<()> {
    match command {
        Commands::Clone(args) => clone::clone_command(ctx, args).await,
        Commands::Disassociate(args) => disassociate::disassociate_command(ctx, args).await,
        Commands::Reconcile(args) => reconcile::reconcile_command(ctx, args).await,
        Commands::Dedup(args) => dedup::dedup_command(ctx, args).await,
        Commands::Migrate(args) => migrate::migrate_command(ctx, args).await,
    }
}

/// Pretty JSON result on stdout
pub(crate) fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Status line on stderr so stdout stays machine readable
pub(crate) fn success(message: &str) {
    eprintln!("{} {}", "✓".bright_green().bold(), message);
}

/// Wrap an engine error so the category survives into the final report
pub(crate) fn engine_error<E>(operation: &str, kind: ErrorKind, err: E) -> anyhow::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    anyhow::Error::new(err).context(format!("{} failed [{}]", operation, kind))
}
