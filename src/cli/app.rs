use super::commands::clone::CloneArgs;
use super::commands::dedup::DedupArgs;
use super::commands::disassociate::DisassociateArgs;
use super::commands::migrate::MigrateArgs;
use super::commands::reconcile::ReconcileArgs;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "entity-graph")]
#[command(about = "Clone, reconcile and tear down relational entity graphs in SQLite")]
pub struct Cli {
    /// Database file (defaults to the user config directory)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Clone plan TOML (defaults to the built-in event configuration plan)
    #[arg(long, global = true)]
    pub plan: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Copy everything a source root owns onto a destination root
    Clone(CloneArgs),
    /// Delete everything a root owns, keeping the root
    Disassociate(DisassociateArgs),
    /// Make a child collection match a JSON list of desired items
    Reconcile(ReconcileArgs),
    /// Insert lookup names that do not exist yet in a scope
    Dedup(DedupArgs),
    /// Show migration status or roll back
    Migrate(MigrateArgs),
}
