//! Status command - show cached resources and sync settings

use super::common::{self, CHECK, CROSS, DOT};
use crate::config::{Config, ConfigManager};
use crate::error::AgendaResult;
use crate::gate::ConcurrencyGate;
use chrono::Utc;
use console::style;

/// Execute the status command
pub async fn execute(config: &Config) -> AgendaResult<()> {
    println!("{}", style("agenda-cache status").bold().cyan());
    println!();

    let cache = common::open_cache(config).await?;
    let gate = ConcurrencyGate::new(config.download.max_concurrent)?;

    println!("{}", style("Cache:").bold());
    println!(
        "  {}Directory: {}",
        DOT,
        ConfigManager::cache_dir(config).display()
    );
    println!("  {}Concurrent downloads: {}", DOT, gate.capacity());

    println!();
    println!("{}", style("Resources:").bold());
    if config.download.resources.is_empty() {
        println!("  {}", style("none configured").dim());
    }

    let coordinators =
        common::coordinators(&config.download.resources, &cache, &gate, config);
    for coordinator in &coordinators {
        let name = style(coordinator.key()).bold();
        let Some(cached_at) = coordinator.cached_at().await? else {
            println!("  {}{} {}", CROSS, name, style("not downloaded").yellow());
            continue;
        };

        let size = coordinator
            .cached_payload()
            .await?
            .map(|payload| common::format_size(payload.len()))
            .unwrap_or_default();
        let token = coordinator.cached_token().await?.unwrap_or_default();
        let age = Utc::now() - cached_at;
        println!(
            "  {}{} {} cached {}m ago {}",
            CHECK,
            name,
            size,
            age.num_minutes(),
            style(token).dim()
        );
    }

    println!();
    println!("{}", style("MRU:").bold());
    let engine = common::open_mru_engine(config).await?;
    println!("  {}Machine: {}", DOT, engine.machine_name());
    println!(
        "  {}Shared directory: {}",
        DOT,
        ConfigManager::shared_dir(config).display()
    );
    println!("  {}Items in merged list: {}", DOT, engine.current_view().await?.len());

    Ok(())
}
