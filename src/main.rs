//! agenda-cache - offline cache for conference agendas
//!
//! CLI entry point that dispatches to subcommands.

use agenda_cache::cli::args::{ConfigAction, ConfigArgs};
use agenda_cache::cli::{Cli, Commands};
use agenda_cache::config::{Config, ConfigManager};
use agenda_cache::error::AgendaResult;
use clap::Parser;
use console::style;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> AgendaResult<()> {
    let cli = Cli::parse();

    // Load configuration
    let config_manager = if let Some(ref path) = cli.config {
        ConfigManager::with_path(path.clone())
    } else {
        ConfigManager::new()
    };

    // Init and path must work even when the file on disk is broken
    let config = match &cli.command {
        Commands::Config(ConfigArgs {
            action: Some(ConfigAction::Init { .. } | ConfigAction::Path),
        }) => Config::default(),
        _ => config_manager.load().await?,
    };

    // Initialize logging: 0 = warn, 1 = info, 2+ = debug
    let filter = match cli.verbose {
        0 => EnvFilter::new("agenda_cache=warn"),
        1 => EnvFilter::new("agenda_cache=info"),
        _ => EnvFilter::new("agenda_cache=debug"),
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    if config.general.log_format == "json" {
        subscriber.json().init();
    } else {
        subscriber.without_time().init();
    }

    // Dispatch to command
    match cli.command {
        Commands::Fetch(args) => agenda_cache::cli::commands::fetch(args, &config).await,
        Commands::Status => agenda_cache::cli::commands::status(&config).await,
        Commands::Mru(args) => agenda_cache::cli::commands::mru(args, &config).await,
        Commands::Cache(args) => agenda_cache::cli::commands::cache(args, &config).await,
        Commands::Config(args) => {
            agenda_cache::cli::commands::config(args, &config, &config_manager).await
        }
    }
}
