mod cli;
mod commands;
mod observability;
mod output;

use anyhow::Result;
use clap::Parser;

use cli::{Cli, Commands};
use output::print_error;
use tagcache::config::loader::load_config;

#[tokio::main]
async fn main() {
    match run().await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            print_error(&format!("{e:#}"));
            std::process::exit(1);
        }
    }
}

/// Returns `false` when the command ran but did not fully succeed.
async fn run() -> Result<bool> {
    let cli = Cli::parse();

    // Kind listing and tag rendering need no configuration.
    match &cli.command {
        Commands::Kinds => {
            commands::tags::kinds();
            return Ok(true);
        }
        Commands::Tags(args) => {
            commands::tags::render(&args.kind, &args.ids)?;
            return Ok(true);
        }
        _ => {}
    }

    let config = load_config(cli.config.as_deref())?;
    let level = cli
        .log_level
        .as_deref()
        .unwrap_or(config.logging.level.as_str());
    observability::init_tracing_with_level(level);

    match &cli.command {
        Commands::Probe => commands::probe::probe(&config).await,
        Commands::Revalidate(args) => {
            commands::tags::revalidate(&config, &args.kind, &args.ids).await
        }
        Commands::Kinds | Commands::Tags(_) => Ok(true),
    }
}
