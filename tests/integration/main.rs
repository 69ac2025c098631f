//! Integration tests for agenda-cache

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    fn agenda() -> Command {
        cargo_bin_cmd!("agenda-cache")
    }

    /// Config whose every path points inside `dir`
    fn write_config(dir: &Path, machine: &str, shared: &Path) -> PathBuf {
        let path = dir.join("config.toml");
        let content = format!(
            r#"
[cache]
dir = "{cache}"

[download]
max_concurrent = 2

[[download.resources]]
name = "schedule"
url = "http://127.0.0.1:9/schedule.json"

[mru]
machine_name = "{machine}"
local_store = "{local}"
shared_dir = "{shared}"
"#,
            cache = dir.join("blobs").display(),
            local = dir.join("mru.json").display(),
            shared = shared.display(),
        );
        std::fs::write(&path, content).unwrap();
        path
    }

    fn with_config(config: &Path) -> Command {
        let mut cmd = agenda();
        cmd.env("AGENDA_CACHE_CONFIG", config);
        cmd
    }

    #[test]
    fn help_displays() {
        agenda()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("offline cache for conference agendas"));
    }

    #[test]
    fn version_displays() {
        agenda()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("agenda-cache"));
    }

    #[test]
    fn config_path_uses_override() {
        let temp = TempDir::new().unwrap();
        let config = write_config(temp.path(), "desk", &temp.path().join("shared"));
        with_config(&config)
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn config_show() {
        let temp = TempDir::new().unwrap();
        let config = write_config(temp.path(), "desk", &temp.path().join("shared"));
        with_config(&config)
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[download]"))
            .stdout(predicate::str::contains("schedule"));
    }

    #[test]
    fn config_init_creates_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("config.toml");
        with_config(&path)
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Configuration initialized"));
        assert!(path.exists());

        with_config(&path)
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("already exists"));
    }

    #[test]
    fn invalid_config_reports_hint() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "[download]\nmax_concurrent = -1\n").unwrap();
        with_config(&path)
            .arg("status")
            .assert()
            .failure()
            .stderr(predicate::str::contains("max_concurrent must be positive"))
            .stderr(predicate::str::contains("Hint:"));
    }

    #[test]
    fn fetch_unknown_resource() {
        let temp = TempDir::new().unwrap();
        let config = write_config(temp.path(), "desk", &temp.path().join("shared"));
        with_config(&config)
            .args(["fetch", "venue-map"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Resource not configured: venue-map"));
    }

    #[test]
    fn fetch_unreachable_resource_fails() {
        let temp = TempDir::new().unwrap();
        let config = write_config(temp.path(), "desk", &temp.path().join("shared"));
        with_config(&config)
            .args(["fetch", "schedule"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Fetch failed"));
    }

    #[test]
    fn status_lists_resources() {
        let temp = TempDir::new().unwrap();
        let config = write_config(temp.path(), "desk", &temp.path().join("shared"));
        with_config(&config)
            .arg("status")
            .assert()
            .success()
            .stdout(predicate::str::contains("schedule"))
            .stdout(predicate::str::contains("not downloaded"))
            .stdout(predicate::str::contains("Machine: desk"));
    }

    #[test]
    fn mru_visit_then_list() {
        let temp = TempDir::new().unwrap();
        let config = write_config(temp.path(), "desk", &temp.path().join("shared"));

        with_config(&config)
            .args([
                "mru",
                "visit",
                "talk-7",
                "--title",
                "Pinning in practice",
                "--start",
                "2026-10-20T09:00:00Z",
            ])
            .assert()
            .success()
            .stdout(predicate::str::contains("Visited talk-7"));

        with_config(&config)
            .args(["mru", "list"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Pinning in practice"))
            .stdout(predicate::str::contains("Total: 1 item(s)"));
    }

    #[test]
    fn mru_list_merges_devices() {
        let shared = TempDir::new().unwrap();
        let desk = TempDir::new().unwrap();
        let laptop = TempDir::new().unwrap();
        let desk_config = write_config(desk.path(), "desk", shared.path());
        let laptop_config = write_config(laptop.path(), "laptop", shared.path());

        with_config(&desk_config)
            .args(["mru", "visit", "keynote", "--start", "2026-10-20T09:00:00Z"])
            .assert()
            .success();
        with_config(&laptop_config)
            .args(["mru", "visit", "closing", "--start", "2026-10-21T17:00:00Z"])
            .assert()
            .success();

        let output = with_config(&desk_config)
            .args(["mru", "list", "--json"])
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();
        let view: serde_json::Value = serde_json::from_slice(&output).unwrap();
        let ids: Vec<&str> = view["records"]
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["idRef"].as_str().unwrap())
            .collect();
        assert_eq!(ids, vec!["closing", "keynote"]);
    }

    #[test]
    fn mru_repeat_visit_keeps_title_and_start() {
        let temp = TempDir::new().unwrap();
        let config = write_config(temp.path(), "desk", &temp.path().join("shared"));

        with_config(&config)
            .args([
                "mru",
                "visit",
                "keynote",
                "--title",
                "Opening Keynote",
                "--start",
                "2026-11-02T09:00:00Z",
            ])
            .assert()
            .success();
        with_config(&config)
            .args(["mru", "visit", "keynote"])
            .assert()
            .success();

        let output = with_config(&config)
            .args(["mru", "list", "--json"])
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();
        let view: serde_json::Value = serde_json::from_slice(&output).unwrap();
        let records = view["records"].as_array().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["title"], "Opening Keynote");
        assert!(records[0]["startTime"]
            .as_str()
            .unwrap()
            .starts_with("2026-11-02T09:00:00"));
    }

    #[test]
    fn mru_watch_prints_current_view() {
        let temp = TempDir::new().unwrap();
        let config = write_config(temp.path(), "desk", &temp.path().join("shared"));

        with_config(&config)
            .args(["mru", "visit", "talk-7", "--title", "Pinning in practice"])
            .assert()
            .success();
        with_config(&config)
            .args(["mru", "watch", "--count", "1"])
            .timeout(std::time::Duration::from_secs(30))
            .assert()
            .success()
            .stdout(predicate::str::contains("Pinning in practice"));
    }

    #[test]
    fn mru_list_empty() {
        let temp = TempDir::new().unwrap();
        let config = write_config(temp.path(), "desk", &temp.path().join("shared"));
        with_config(&config)
            .args(["mru", "list"])
            .assert()
            .success()
            .stdout(predicate::str::contains("No recently viewed items"));
    }

    #[test]
    fn cache_clear() {
        let temp = TempDir::new().unwrap();
        let config = write_config(temp.path(), "desk", &temp.path().join("shared"));
        std::fs::create_dir_all(temp.path().join("blobs")).unwrap();
        with_config(&config)
            .args(["cache", "clear", "--yes"])
            .assert()
            .success()
            .stdout(predicate::str::contains("cleared"));
    }
}
