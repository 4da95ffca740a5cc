use std::path::Path;
use std::process::Command;

use assert_cmd::prelude::*;
use chrono::{Duration, Utc};
use predicates::str::contains;

use synchub_core::records::{append_activity_at, load_record_at, save_record_at};
use synchub_core::{ActivityEntry, EntryLevel, LockToken, ProviderId, ProviderRecord, SyncStatus};
use tempfile::TempDir;

fn synchub_cmd(home: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("synchub"));
    cmd.env("HOME", home).env("USERPROFILE", home);
    cmd
}

fn seed(home: &Path, id: &str, status: SyncStatus, error: Option<&str>) -> ProviderRecord {
    let mut record = ProviderRecord::new(ProviderId::from(id), None, "10m");
    record.status = status;
    record.last_error = error.map(str::to_string);
    record.last_run = Some(Utc::now() - Duration::hours(2));
    save_record_at(home, &record).expect("save record");
    record
}

#[test]
fn status_json_lists_every_record() {
    let home = TempDir::new().expect("home");
    seed(home.path(), "calendar", SyncStatus::Idle, None);
    seed(home.path(), "github", SyncStatus::Error, Some("401 Unauthorized"));

    let output = synchub_cmd(home.path())
        .args(["status", "--json"])
        .output()
        .expect("run status");
    assert!(output.status.success());

    let rows: serde_json::Value = serde_json::from_slice(&output.stdout).expect("status json");
    let rows = rows.as_array().expect("array");
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["id"], "calendar");
    assert_eq!(rows[0]["last_run_age"], "2h ago");
    assert_eq!(rows[1]["status"], "error");
    assert_eq!(rows[1]["last_error"], "401 Unauthorized");
}

#[test]
fn status_table_on_empty_home() {
    let home = TempDir::new().expect("home");
    synchub_cmd(home.path())
        .arg("status")
        .assert()
        .success()
        .stdout(contains("0 providers"))
        .stdout(contains("No providers registered."));
}

#[test]
fn reset_clears_stuck_records_only() {
    let home = TempDir::new().expect("home");
    let mut stuck = seed(home.path(), "notes", SyncStatus::Syncing, None);
    stuck.sync_lock = Some(LockToken::new(Utc::now(), "run-1"));
    save_record_at(home.path(), &stuck).expect("save lock");
    seed(home.path(), "mail", SyncStatus::Error, Some("timeout"));

    synchub_cmd(home.path())
        .arg("reset")
        .assert()
        .success()
        .stdout(contains("Reset 1 stuck sync(s)"));

    let notes = load_record_at(home.path(), &ProviderId::from("notes"))
        .expect("load")
        .expect("record");
    assert_eq!(notes.status, SyncStatus::Idle);
    assert_eq!(notes.last_error.as_deref(), Some("Reset by user"));
    assert!(notes.sync_lock.is_some(), "lock is left to expire on its own");

    let mail = load_record_at(home.path(), &ProviderId::from("mail"))
        .expect("load")
        .expect("record");
    assert_eq!(mail.status, SyncStatus::Error);

    synchub_cmd(home.path())
        .arg("reset")
        .assert()
        .success()
        .stdout(contains("No stuck syncs found"));
}

#[test]
fn activity_prints_the_most_recent_entries() {
    let home = TempDir::new().expect("home");
    seed(home.path(), "slack", SyncStatus::Idle, None);
    let id = ProviderId::from("slack");
    for n in 1..=5 {
        append_activity_at(
            home.path(),
            &id,
            &ActivityEntry::message(Utc::now(), EntryLevel::Info, format!("entry {n}")),
        )
        .expect("append");
    }

    let output = synchub_cmd(home.path())
        .args(["activity", "slack", "--limit", "2"])
        .output()
        .expect("run activity");
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).expect("utf8");
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 2, "{stdout}");
    assert!(lines[0].ends_with("entry 4"));
    assert!(lines[1].ends_with("entry 5"));

    synchub_cmd(home.path())
        .args(["activity", "ghost"])
        .assert()
        .failure()
        .stderr(contains("unknown provider 'ghost'"));
}

#[test]
fn sync_without_daemon_points_at_daemon_start() {
    let home = TempDir::new().expect("home");
    synchub_cmd(home.path())
        .args(["sync", "github"])
        .assert()
        .failure()
        .stderr(contains("synchub daemon start"));
}
