use std::fs;
use std::path::Path;
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::str::contains;
use serde_json::Value;
use tempfile::TempDir;

fn relay_cmd(home: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_relay"));
    cmd.env("HOME", home)
        .env("USERPROFILE", home)
        .env_remove("RUST_LOG");
    cmd
}

fn add_record(home: &Path, first: &str, department: &str) {
    relay_cmd(home)
        .args([
            "records",
            "add",
            "--first-name",
            first,
            "--last-name",
            "Kuznetsova",
            "--age",
            "29",
            "--department",
            department,
        ])
        .assert()
        .success()
        .stdout(contains("Added #"));
}

fn json_stdout(cmd: &mut Command) -> Value {
    let output = cmd.output().expect("run relay");
    assert!(
        output.status.success(),
        "relay failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("stdout is JSON")
}

fn spooled_lines(topic_dir: &Path) -> usize {
    let Ok(entries) = fs::read_dir(topic_dir) else {
        return 0;
    };
    entries
        .filter_map(|e| e.ok())
        .map(|e| fs::read_to_string(e.path()).unwrap_or_default().lines().count())
        .sum()
}

#[test]
fn init_writes_config_once() {
    let home = TempDir::new().expect("home");

    relay_cmd(home.path())
        .arg("init")
        .assert()
        .success()
        .stdout(contains("Wrote default config"));
    let config = fs::read_to_string(home.path().join(".relay/config.yaml")).expect("config");
    assert!(config.contains("employee-bulk-sync"));

    relay_cmd(home.path())
        .arg("init")
        .assert()
        .success()
        .stdout(contains("already present"));
}

#[test]
fn one_shot_sync_drains_store_without_daemon() {
    let home = TempDir::new().expect("home");
    add_record(home.path(), "Anna", "IT");
    add_record(home.path(), "Boris", "Finance");
    add_record(home.path(), "Vera", "IT");

    let records = json_stdout(relay_cmd(home.path()).args(["records", "list", "--unsynced", "--json"]));
    assert_eq!(records.as_array().map(Vec::len), Some(3));

    let job = json_stdout(relay_cmd(home.path()).args(["sync", "--json"]));
    assert_eq!(job["status"], "COMPLETED");
    assert_eq!(job["processed"], 3);
    assert_eq!(job["running"], false);

    let records = json_stdout(relay_cmd(home.path()).args(["records", "list", "--unsynced", "--json"]));
    assert_eq!(records.as_array().map(Vec::len), Some(0));
    assert_eq!(
        spooled_lines(&home.path().join(".relay/broker/employee-bulk-sync")),
        3
    );

    // Nothing left: the next run reports NO_DATA.
    let job = json_stdout(relay_cmd(home.path()).args(["sync", "--json"]));
    assert_eq!(job["status"], "NO_DATA");
}

#[test]
fn resync_reoffers_records_and_status_counts_them() {
    let home = TempDir::new().expect("home");
    add_record(home.path(), "Anna", "IT");
    add_record(home.path(), "Boris", "HR");
    relay_cmd(home.path()).arg("sync").assert().success();

    relay_cmd(home.path())
        .args(["records", "resync", "2"])
        .assert()
        .success()
        .stdout(contains("1 record(s)"));

    let status = json_stdout(relay_cmd(home.path()).args(["status", "--json"]));
    assert_eq!(status["daemon_running"], false);
    assert_eq!(status["store"]["records"], 2);
    assert_eq!(status["store"]["unsynced"], 1);
    assert!(status.get("job").is_none());

    relay_cmd(home.path())
        .args(["records", "resync"])
        .assert()
        .failure()
        .stderr(contains("provide record ids"));
}

#[test]
fn disabled_bulk_sync_is_refused() {
    let home = TempDir::new().expect("home");
    relay_cmd(home.path()).arg("init").assert().success();
    let path = home.path().join(".relay/config.yaml");
    let config = fs::read_to_string(&path).expect("config");
    fs::write(&path, config.replace("enabled: true", "enabled: false")).expect("write config");
    add_record(home.path(), "Anna", "IT");

    relay_cmd(home.path())
        .arg("sync")
        .assert()
        .failure()
        .stderr(contains("bulk sync is disabled"));
}

#[test]
fn add_with_publish_sends_created_event() {
    let home = TempDir::new().expect("home");
    relay_cmd(home.path())
        .args([
            "records",
            "add",
            "--first-name",
            "Pavel",
            "--last-name",
            "Egorov",
            "--age",
            "50",
            "--department",
            "Legal",
            "--post",
            "Counsel",
            "--publish",
        ])
        .assert()
        .success()
        .stdout(contains("created event enqueued"));

    assert_eq!(
        spooled_lines(&home.path().join(".relay/broker/employee-sync")),
        1
    );
    // The created event does not flag the record; bulk sync still owns that.
    let records = json_stdout(relay_cmd(home.path()).args(["records", "list", "--unsynced", "--json"]));
    assert_eq!(records.as_array().map(Vec::len), Some(1));
}

#[test]
fn stop_without_daemon_is_a_no_op() {
    let home = TempDir::new().expect("home");
    relay_cmd(home.path())
        .args(["sync", "--stop"])
        .assert()
        .success()
        .stdout(contains("daemon is not running"));
}
