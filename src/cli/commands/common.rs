//! Wiring shared by several commands

use crate::cache::{CacheAsideFetcher, FileBlobStore};
use crate::config::schema::ResourceConfig;
use crate::config::{Config, ConfigManager};
use crate::download::{HttpSource, ResourceDownloadCoordinator};
use crate::error::{AgendaError, AgendaResult};
use crate::gate::ConcurrencyGate;
use crate::mru::{DirectorySettings, MemoryMruStore, MruMergeEngine};
use console::Emoji;
use std::sync::Arc;
use std::time::Duration;

pub static CHECK: Emoji<'_, '_> = Emoji("✓ ", "[OK] ");
pub static CROSS: Emoji<'_, '_> = Emoji("✗ ", "[FAIL] ");
pub static DOT: Emoji<'_, '_> = Emoji("• ", "- ");

/// Open the blob cache configured in `config`
pub async fn open_cache(config: &Config) -> AgendaResult<CacheAsideFetcher> {
    let store = FileBlobStore::open(ConfigManager::cache_dir(config)).await?;
    Ok(CacheAsideFetcher::new(Arc::new(store)))
}

/// Resolve command-line names to resources; full URLs are used as-is
pub fn resolve_resources(names: &[String], config: &Config) -> AgendaResult<Vec<ResourceConfig>> {
    if names.is_empty() {
        return Ok(config.download.resources.clone());
    }

    names
        .iter()
        .map(|name| {
            if name.contains("://") {
                return Ok(ResourceConfig {
                    name: name.clone(),
                    url: name.clone(),
                });
            }
            config
                .download
                .resource(name)
                .cloned()
                .ok_or_else(|| AgendaError::ResourceNotFound(name.clone()))
        })
        .collect()
}

/// One coordinator per resource, all sharing `cache` and `gate`
pub fn coordinators(
    resources: &[ResourceConfig],
    cache: &CacheAsideFetcher,
    gate: &ConcurrencyGate,
    config: &Config,
) -> Vec<Arc<ResourceDownloadCoordinator>> {
    let timeout = Duration::from_secs(config.download.timeout_secs);
    let expiry = (config.cache.expiry_hours > 0)
        .then(|| chrono::Duration::hours(i64::from(config.cache.expiry_hours)));

    resources
        .iter()
        .map(|resource| {
            let source = Arc::new(HttpSource::new(resource.url.clone(), timeout));
            let coordinator = ResourceDownloadCoordinator::new(
                resource.name.clone(),
                source,
                cache.clone(),
                gate.clone(),
            );
            Arc::new(match expiry {
                Some(ttl) => coordinator.with_expiry(ttl),
                None => coordinator,
            })
        })
        .collect()
}

/// Merge engine over the configured local store and shared directory
pub async fn open_mru_engine(config: &Config) -> AgendaResult<Arc<MruMergeEngine>> {
    let local = MemoryMruStore::open(ConfigManager::mru_store_path(config)).await?;
    let settings = DirectorySettings::open_with_poll_interval(
        ConfigManager::shared_dir(config),
        Duration::from_millis(config.mru.poll_interval_ms),
    )
    .await?;

    let engine =
        MruMergeEngine::new(Arc::new(local), Arc::new(settings)).with_top_n(config.mru.top_n);
    if let Some(name) = &config.mru.machine_name {
        engine.set_machine_name(name.clone())?;
    }
    Ok(Arc::new(engine))
}

/// Human-readable byte count
pub fn format_size(bytes: usize) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", size, UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with(names: &[&str]) -> Config {
        let mut config = Config::default();
        config.download.resources = names
            .iter()
            .map(|n| ResourceConfig {
                name: n.to_string(),
                url: format!("https://agenda.example.org/{}.json", n),
            })
            .collect();
        config
    }

    #[test]
    fn resolve_defaults_to_all_configured() {
        let config = config_with(&["schedule", "speakers"]);
        let resolved = resolve_resources(&[], &config).unwrap();
        assert_eq!(resolved.len(), 2);
    }

    #[test]
    fn resolve_accepts_urls() {
        let config = config_with(&[]);
        let names = vec!["https://example.org/map.pdf".to_string()];
        let resolved = resolve_resources(&names, &config).unwrap();
        assert_eq!(resolved[0].url, "https://example.org/map.pdf");
    }

    #[test]
    fn resolve_unknown_name_fails() {
        let config = config_with(&["schedule"]);
        let names = vec!["venue".to_string()];
        let err = resolve_resources(&names, &config).unwrap_err();
        assert!(matches!(err, AgendaError::ResourceNotFound(name) if name == "venue"));
    }

    #[test]
    fn size_formatting() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.0 KiB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.0 MiB");
    }
}
