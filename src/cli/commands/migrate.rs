use anyhow::Result;
use clap::Args;

use super::{CommandContext, print_json, success};

#[derive(Args)]
pub struct MigrateArgs {
    /// Roll back every migration above this version (0 for all)
    #[arg(long)]
    pub down: Option<i64>,
}

/// Pending migrations already ran when the config was loaded, so without
/// `--down` this only reports the status
pub async fn migrate_command(ctx: &CommandContext, args: MigrateArgs) -> Result<()> {
    if let Some(target) = args.down {
        ctx.config.migrate_down(target).await?;
        success(&format!("Rolled back to version {}", target));
    }

    let status = ctx.config.migration_status().await?;
    print_json(&status)?;
    if status.is_up_to_date() {
        success(&format!("Schema at version {}", status.current_version.unwrap_or(0)));
    }
    Ok(())
}
