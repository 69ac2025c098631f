//! Cache command - manage the blob cache

use super::common;
use crate::cli::args::{CacheAction, CacheArgs};
use crate::config::{Config, ConfigManager};
use crate::error::AgendaResult;
use console::style;
use std::io::{self, Write};

/// Execute the cache command
pub async fn execute(args: CacheArgs, config: &Config) -> AgendaResult<()> {
    match args.action {
        CacheAction::Clear { yes } => clear_cache(config, yes).await,
    }
}

async fn clear_cache(config: &Config, skip_confirm: bool) -> AgendaResult<()> {
    let dir = ConfigManager::cache_dir(config);
    if !dir.exists() {
        println!("No cache to clear.");
        return Ok(());
    }

    if !skip_confirm {
        print!("Remove every cached payload in {}? [y/N] ", dir.display());
        let _ = io::stdout().flush();

        let mut input = String::new();
        if io::stdin().read_line(&mut input).is_err() {
            println!("Failed to read input, aborting.");
            return Ok(());
        }

        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Aborted.");
            return Ok(());
        }
    }

    let cache = common::open_cache(config).await?;
    cache.invalidate_all().await?;

    println!("{} cleared {}", style("✓").green(), dir.display());
    Ok(())
}
