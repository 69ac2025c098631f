//! Fetch command - download or update resources

use super::common::{self, CHECK, CROSS, DOT};
use crate::cli::args::FetchArgs;
use crate::config::Config;
use crate::download::DownloadOutcome;
use crate::error::{AgendaError, AgendaResult};
use crate::gate::ConcurrencyGate;
use console::style;
use tokio::task::JoinSet;
use tracing::debug;

/// Execute the fetch command
pub async fn execute(args: FetchArgs, config: &Config) -> AgendaResult<()> {
    let resources = common::resolve_resources(&args.resources, config)?;
    if resources.is_empty() {
        println!("No resources configured.");
        println!(
            "{} Add [[download.resources]] entries or pass a URL",
            style("Hint:").yellow()
        );
        return Ok(());
    }

    let cache = common::open_cache(config).await?;
    let gate = ConcurrencyGate::new(config.download.max_concurrent)?;
    debug!(
        "Fetching {} resource(s), {} at a time",
        resources.len(),
        gate.capacity()
    );

    let mut tasks = JoinSet::new();
    for coordinator in common::coordinators(&resources, &cache, &gate, config) {
        tasks.spawn(async move {
            let outcome = coordinator.trigger_download_or_update().await;
            (coordinator, outcome)
        });
    }

    let mut failed = 0usize;
    while let Some(joined) = tasks.join_next().await {
        let (coordinator, outcome) =
            joined.map_err(|e| AgendaError::Internal(format!("download task failed: {}", e)))?;
        let name = style(coordinator.key()).bold();

        match outcome {
            DownloadOutcome::Fetched => {
                let size = coordinator
                    .cached_payload()
                    .await?
                    .map(|payload| common::format_size(payload.len()))
                    .unwrap_or_default();
                println!("{}{} {} {}", CHECK, name, style("downloaded").green(), size);
            }
            DownloadOutcome::UpToDate => {
                println!("{}{} {}", DOT, name, style("up to date").dim());
            }
            DownloadOutcome::Failed => {
                failed += 1;
                let reason = coordinator.state().last_error.unwrap_or_default();
                println!("{}{} {}", CROSS, name, style(reason).red());
            }
        }
    }

    if failed > 0 {
        return Err(AgendaError::fetch(
            format!("{} of {} resource(s)", failed, resources.len()),
            "see errors above",
        ));
    }
    Ok(())
}
