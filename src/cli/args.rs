//! CLI argument definitions using clap derive

use chrono::{DateTime, Utc};
use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

/// agenda-cache - offline cache for conference agendas
///
/// Downloads agenda resources with bounded concurrency and keeps a
/// most-recently-used list in sync across devices.
#[derive(Parser, Debug)]
#[command(name = "agenda-cache")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "AGENDA_CACHE_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Download or update resources
    Fetch(FetchArgs),

    /// Show cached resources and their state
    Status,

    /// Work with the most-recently-used list
    Mru(MruArgs),

    /// Manage the blob cache
    Cache(CacheArgs),

    /// Show or edit configuration
    Config(ConfigArgs),
}

/// Arguments for the fetch command
#[derive(Parser, Debug)]
pub struct FetchArgs {
    /// Resource names from the config, or full URLs (defaults to all configured)
    pub resources: Vec<String>,
}

/// Arguments for the mru command
#[derive(Parser, Debug)]
pub struct MruArgs {
    /// Subcommand for mru
    #[command(subcommand)]
    pub action: MruAction,
}

/// MRU subcommands
#[derive(Subcommand, Debug)]
pub enum MruAction {
    /// Record a visit to an agenda item
    Visit {
        /// Item identity
        id: String,

        /// Display title (defaults to the id)
        #[arg(short, long)]
        title: Option<String>,

        /// Start time, RFC 3339 (defaults to now)
        #[arg(short, long, value_parser = parse_time)]
        start: Option<DateTime<Utc>>,
    },

    /// Show the merged list across devices
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Publish this device's snapshot to the shared directory
    Publish,

    /// Print the merged list every time its order changes
    Watch {
        /// Exit after this many views
        #[arg(short = 'n', long)]
        count: Option<usize>,

        /// Print JSON lines instead of tables
        #[arg(long)]
        json: bool,
    },
}

/// Arguments for the cache command
#[derive(Parser, Debug)]
pub struct CacheArgs {
    /// Subcommand for cache
    #[command(subcommand)]
    pub action: CacheAction,
}

/// Cache subcommands
#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// Remove every cached payload
    Clear {
        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Subcommand for config
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Initialize default configuration
    Init {
        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },
}

/// Parse an RFC 3339 timestamp
fn parse_time(s: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| format!("invalid RFC 3339 time '{s}': {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_time_valid() {
        let t = parse_time("2026-10-19T09:30:00+02:00").unwrap();
        assert_eq!(t.to_rfc3339(), "2026-10-19T07:30:00+00:00");
    }

    #[test]
    fn parse_time_invalid() {
        assert!(parse_time("tomorrow").is_err());
    }

    #[test]
    fn cli_parses_fetch() {
        let cli = Cli::parse_from(["agenda-cache", "fetch", "keynote", "schedule"]);
        match cli.command {
            Commands::Fetch(args) => assert_eq!(args.resources, vec!["keynote", "schedule"]),
            _ => panic!("expected Fetch command"),
        }
    }

    #[test]
    fn cli_parses_fetch_without_names() {
        let cli = Cli::parse_from(["agenda-cache", "fetch"]);
        match cli.command {
            Commands::Fetch(args) => assert!(args.resources.is_empty()),
            _ => panic!("expected Fetch command"),
        }
    }

    #[test]
    fn cli_parses_mru_visit() {
        let cli = Cli::parse_from([
            "agenda-cache",
            "mru",
            "visit",
            "talk-42",
            "--title",
            "Async Rust",
            "--start",
            "2026-10-19T10:00:00Z",
        ]);
        match cli.command {
            Commands::Mru(MruArgs {
                action: MruAction::Visit { id, title, start },
            }) => {
                assert_eq!(id, "talk-42");
                assert_eq!(title.as_deref(), Some("Async Rust"));
                assert!(start.is_some());
            }
            _ => panic!("expected Mru Visit command"),
        }
    }

    #[test]
    fn cli_parses_mru_watch() {
        let cli = Cli::parse_from(["agenda-cache", "mru", "watch", "-n", "3"]);
        assert!(matches!(
            cli.command,
            Commands::Mru(MruArgs {
                action: MruAction::Watch {
                    count: Some(3),
                    json: false
                }
            })
        ));
    }

    #[test]
    fn cli_parses_cache_clear() {
        let cli = Cli::parse_from(["agenda-cache", "cache", "clear", "--yes"]);
        assert!(matches!(
            cli.command,
            Commands::Cache(CacheArgs {
                action: CacheAction::Clear { yes: true }
            })
        ));
    }

    #[test]
    fn cli_verbose_levels() {
        let cli = Cli::parse_from(["agenda-cache", "status"]);
        assert_eq!(cli.verbose, 0);

        let cli = Cli::parse_from(["agenda-cache", "-v", "status"]);
        assert_eq!(cli.verbose, 1);

        let cli = Cli::parse_from(["agenda-cache", "-vv", "status"]);
        assert_eq!(cli.verbose, 2);
    }
}
