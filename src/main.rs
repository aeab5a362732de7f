use anyhow::Result;
use clap::Parser;
use colored::*;
use log::info;

mod cli;

use cli::Cli;
use cli::commands::CommandContext;
use entity_graph::config::{ClonePlan, Config};

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("{} {:#}", "✗".bright_red().bold(), err);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logger to file (truncate on each run)
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open("entity-graph.log")?;
    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Pipe(Box::new(log_file)))
        .init();

    let cli = Cli::parse();
    info!("Starting entity-graph");

    let config = Config::load(cli.db).await?;
    let plan = match cli.plan {
        Some(path) => ClonePlan::load(&path)?,
        None => ClonePlan::event_configuration(),
    };

    let ctx = CommandContext { config, plan };
    cli::commands::run(&ctx, cli.command).await
}
