//! Record file error-message, atomic-write-safety, and ledger integration tests.
//! Storage: ~/.synchub/records/<plugin_id>.yaml, ~/.synchub/activity/<plugin_id>.jsonl

use assert_fs::prelude::*;
use chrono::Utc;
use predicates::prelude::predicate;
use std::fs;
use synchub_core::{
    records, ActivityEntry, EntryLevel, ProviderId, ProviderRecord, RecordError, RecordUpdate,
    SyncStatus,
};

fn id() -> ProviderId { ProviderId::from("readwise-sync") }

// ---------------------------------------------------------------------------
// 1. Load error messages
// ---------------------------------------------------------------------------

#[test]
fn load_corrupt_yaml_returns_parse_error_with_path() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let dir = home.path().join(".synchub").join("records");
    fs::create_dir_all(&dir).expect("mkdir");
    fs::write(dir.join("readwise-sync.yaml"), b": : corrupt : yaml : !!!\n  - broken: [unclosed")
        .expect("write");

    let err = records::load_record_at(home.path(), &id()).unwrap_err();
    assert!(matches!(err, RecordError::Parse { .. }), "got: {err}");
    assert!(err.to_string().contains("readwise-sync.yaml"), "must contain file path, got: {err}");
}

#[test]
fn load_wrong_type_yaml_returns_parse_error() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let dir = home.path().join(".synchub").join("records");
    fs::create_dir_all(&dir).expect("mkdir");
    fs::write(dir.join("readwise-sync.yaml"), b"- this is a list, not a mapping\n").expect("write");

    let err = records::load_record_at(home.path(), &id()).unwrap_err();
    assert!(matches!(err, RecordError::Parse { .. }), "got: {err}");
}

#[test]
fn update_missing_record_names_the_provider() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let err = records::update_record_at(home.path(), &id(), RecordUpdate::Enabled(true)).unwrap_err();
    assert!(err.to_string().contains("readwise-sync"), "got: {err}");
}

// ---------------------------------------------------------------------------
// 2. Atomic write safety
// ---------------------------------------------------------------------------

#[test]
fn mid_write_crash_leaves_original_intact() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    records::save_record_at(home.path(), &ProviderRecord::new(id(), None, "5m")).expect("save");

    let yaml_path = records::record_path_at(home.path(), &id());
    let original_bytes = fs::read(&yaml_path).expect("read original");

    // Simulate crash: .tmp written but process died before rename
    let tmp = yaml_path.with_file_name("readwise-sync.yaml.tmp");
    fs::write(&tmp, b"CRASH - INCOMPLETE WRITE").expect("write crash tmp");

    let current_bytes = fs::read(&yaml_path).expect("read after crash");
    assert_eq!(original_bytes, current_bytes, "original must be unchanged after crash");

    let listed = records::list_records_at(home.path()).expect("list ignores orphan tmp");
    assert_eq!(listed.len(), 1);
}

#[test]
fn persisted_field_names_are_stable() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let mut record = ProviderRecord::new(id(), Some("Readwise".into()), "1h");
    record.last_error = Some("rate limited".into());
    records::save_record_at(home.path(), &record).expect("save");

    home.child(".synchub/records/readwise-sync.yaml")
        .assert(predicate::path::exists());
    let yaml = fs::read_to_string(records::record_path_at(home.path(), &id())).expect("read");
    for field in [
        "plugin_id", "enabled", "status", "interval", "last_run", "last_error", "sync_lock",
        "log_level", "toast", "journal",
    ] {
        assert!(yaml.contains(&format!("{field}:")), "missing field {field} in:\n{yaml}");
    }
    assert!(yaml.contains("toast: new_records"));
    assert!(yaml.contains("journal: major_only"));
}

// ---------------------------------------------------------------------------
// 3. Updates and the ledger
// ---------------------------------------------------------------------------

#[test]
fn sequential_updates_touch_only_their_field() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    records::save_record_at(home.path(), &ProviderRecord::new(id(), None, "5m")).expect("save");

    let now = Utc::now();
    records::update_record_at(home.path(), &id(), RecordUpdate::Status(SyncStatus::Syncing)).expect("status");
    records::update_record_at(home.path(), &id(), RecordUpdate::LastRun(Some(now))).expect("last_run");

    let loaded = records::load_record_at(home.path(), &id()).expect("load").expect("present");
    assert_eq!(loaded.status, SyncStatus::Syncing);
    assert_eq!(loaded.last_run, Some(now));
    assert_eq!(loaded.interval, "5m");
}

#[test]
fn activity_ledger_is_per_provider() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let other = ProviderId::from("github-sync");
    let now = Utc::now();
    records::append_activity_at(home.path(), &id(), &ActivityEntry::message(now, EntryLevel::Info, "a"))
        .expect("append");
    records::append_activity_at(home.path(), &other, &ActivityEntry::message(now, EntryLevel::Error, "b"))
        .expect("append");

    assert_eq!(records::load_activity_at(home.path(), &id()).expect("load").len(), 1);
    assert_eq!(records::load_activity_at(home.path(), &other).expect("load").len(), 1);
    home.child(".synchub/activity/github-sync.jsonl")
        .assert(predicate::path::exists());
}
