//! MRU command - record visits and show the merged list

use super::common::{self, CHECK};
use crate::cli::args::{MruAction, MruArgs};
use crate::config::{Config, ConfigManager};
use crate::error::AgendaResult;
use crate::mru::{LocalMruStore, MemoryMruStore, MergedMruView, MruRecord};
use chrono::{DateTime, Utc};
use console::style;
use tracing::info;

/// Execute the mru command
pub async fn execute(args: MruArgs, config: &Config) -> AgendaResult<()> {
    match args.action {
        MruAction::Visit { id, title, start } => {
            let store = MemoryMruStore::open(ConfigManager::mru_store_path(config)).await?;
            let record = revisit(store.get(&id).await?, id, title, start);
            store.mark_visited(record.clone()).await?;

            // Republish so other devices see the visit without a running engine
            let engine = common::open_mru_engine(config).await?;
            engine.publish_local().await?;

            println!("{}Visited {}", CHECK, style(&record.id_ref).bold());
        }
        MruAction::List { json } => {
            let engine = common::open_mru_engine(config).await?;
            let view = engine.current_view().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&view)?);
            } else {
                print_view(&view);
            }
        }
        MruAction::Watch { count, json } => {
            let engine = common::open_mru_engine(config).await?;
            info!("Watching {}", ConfigManager::shared_dir(config).display());

            let mut stream = engine.subscribe();
            let mut shown = 0;
            while count.map_or(true, |limit| shown < limit) {
                let Some(view) = stream.recv().await else {
                    break;
                };
                if json {
                    println!("{}", serde_json::to_string(&view)?);
                } else {
                    print_view(&view);
                    println!();
                }
                shown += 1;
            }
        }
        MruAction::Publish => {
            let engine = common::open_mru_engine(config).await?;
            let snapshot = engine.publish_local().await?;
            println!(
                "{}Published {} record(s) as {}",
                CHECK,
                snapshot.records.len(),
                style(&snapshot.machine_name).bold()
            );
        }
    }

    Ok(())
}

/// Merge a visit into the stored record, keeping fields not given on the command line
fn revisit(
    existing: Option<MruRecord>,
    id: String,
    title: Option<String>,
    start: Option<DateTime<Utc>>,
) -> MruRecord {
    match existing {
        Some(mut record) => {
            if let Some(title) = title {
                record.title = title;
            }
            if let Some(start) = start {
                record.start_time = start;
            }
            record.last_looked_at = Utc::now();
            record
        }
        None => {
            let title = title.unwrap_or_else(|| id.clone());
            MruRecord::visited(id, title, start.unwrap_or_else(Utc::now))
        }
    }
}

fn print_view(view: &MergedMruView) {
    if view.is_empty() {
        println!("No recently viewed items.");
        return;
    }

    println!("{:<24} {:<17} {:<17} TITLE", "ID", "STARTS", "LAST VIEWED");
    println!("{}", "-".repeat(80));
    for record in &view.records {
        println!(
            "{:<24} {:<17} {:<17} {}",
            record.id_ref,
            record.start_time.format("%Y-%m-%d %H:%M").to_string(),
            record.last_looked_at.format("%Y-%m-%d %H:%M").to_string(),
            record.title
        );
    }
    println!();
    println!("Total: {} item(s)", view.len());
}
