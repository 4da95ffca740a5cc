//! Outbound surfaces for finished runs: notifications and the journal feed.

use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use synchub_core::{records, Change, JournalLevel, ProviderId, SyncResult, ToastLevel};

use crate::error::SyncError;

const CHILD_PREVIEW_CHARS: usize = 100;

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// `None` for hub-wide messages.
    pub provider: Option<ProviderId>,
    pub title: String,
    pub message: String,
    pub level: NotificationLevel,
}

/// User-facing toast surface.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Emits notifications as log events; the daemon has no other UI.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, n: Notification) {
        match n.level {
            NotificationLevel::Info => {
                info!(provider = ?n.provider, title = %n.title, "{}", n.message)
            }
            NotificationLevel::Error => {
                warn!(provider = ?n.provider, title = %n.title, "{}", n.message)
            }
        }
    }
}

/// Keeps every notification in memory.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    seen: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.seen
            .lock()
            .map(|seen| seen.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: Notification) {
        match self.seen.lock() {
            Ok(mut seen) => seen.push(notification),
            Err(poisoned) => poisoned.into_inner().push(notification),
        }
    }
}

/// Whether a successful run should surface a toast under `level`.
pub fn should_toast(level: ToastLevel, result: &SyncResult) -> bool {
    match level {
        ToastLevel::None | ToastLevel::ErrorsOnly => false,
        ToastLevel::NewRecords => result.created > 0,
        ToastLevel::AllUpdates => true,
    }
}

// ---------------------------------------------------------------------------
// Journal
// ---------------------------------------------------------------------------

/// Daily feed of notable changes.
#[async_trait]
pub trait JournalSink: Send + Sync {
    async fn append(&self, day: &str, lines: Vec<String>) -> Result<(), SyncError>;
}

/// Appends to `~/.synchub/journal/<YYYYMMDD>.md`.
#[derive(Debug, Clone)]
pub struct FileJournal {
    home: PathBuf,
}

impl FileJournal {
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self { home: home.into() }
    }
}

#[async_trait]
impl JournalSink for FileJournal {
    async fn append(&self, day: &str, lines: Vec<String>) -> Result<(), SyncError> {
        let home = self.home.clone();
        let day = day.to_string();
        tokio::task::spawn_blocking(move || records::append_journal_at(&home, &day, &lines))
            .await??;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryJournal {
    lines: Mutex<Vec<(String, String)>>,
}

impl MemoryJournal {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(day, line)` pairs in append order.
    pub fn lines(&self) -> Vec<(String, String)> {
        self.lines
            .lock()
            .map(|l| l.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }
}

#[async_trait]
impl JournalSink for MemoryJournal {
    async fn append(&self, day: &str, lines: Vec<String>) -> Result<(), SyncError> {
        let mut held = self
            .lines
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        held.extend(lines.into_iter().map(|line| (day.to_string(), line)));
        Ok(())
    }
}

/// Markdown lines for the changes `level` admits, stamped with `now`.
pub fn journal_lines(now: DateTime<Utc>, changes: &[Change], level: JournalLevel) -> Vec<String> {
    let stamp = now.format("%H:%M");
    let mut lines = Vec::new();
    for change in changes {
        let admitted = match level {
            JournalLevel::None => false,
            JournalLevel::MajorOnly => change.major,
            JournalLevel::Verbose => true,
        };
        if !admitted {
            continue;
        }
        let mut line = format!("- **{stamp}** {}", change.verb);
        if let Some(title) = &change.title {
            line.push(' ');
            line.push_str(title);
        }
        if !change.guid.is_empty() {
            line.push_str(&format!(" [[{}]]", change.guid));
        }
        lines.push(line);
        if level == JournalLevel::Verbose {
            lines.extend(
                change
                    .children
                    .iter()
                    .map(|child| format!("  > {}", preview(child))),
            );
        }
    }
    lines
}

fn preview(text: &str) -> String {
    if text.chars().count() <= CHILD_PREVIEW_CHARS {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(CHILD_PREVIEW_CHARS).collect();
    cut.push_str("...");
    cut
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn change(verb: &str, major: bool, children: Vec<String>) -> Change {
        Change {
            verb: verb.into(),
            title: Some("Weekly sync".into()),
            guid: "evt-1".into(),
            major,
            children,
        }
    }

    fn result(created: u64, updated: u64) -> SyncResult {
        SyncResult {
            summary: "s".into(),
            created,
            updated,
            changes: vec![],
        }
    }

    #[test]
    fn toast_policy_table() {
        assert!(!should_toast(ToastLevel::None, &result(4, 1)));
        assert!(!should_toast(ToastLevel::ErrorsOnly, &result(4, 1)));
        assert!(should_toast(ToastLevel::NewRecords, &result(1, 0)));
        assert!(!should_toast(ToastLevel::NewRecords, &result(0, 7)));
        assert!(should_toast(ToastLevel::AllUpdates, &result(0, 0)));
    }

    #[test]
    fn major_only_filters_minor_changes() {
        let now = Utc.with_ymd_and_hms(2025, 3, 2, 9, 5, 0).unwrap();
        let changes = vec![
            change("created", true, vec!["agenda".into()]),
            change("updated", false, vec![]),
        ];
        let lines = journal_lines(now, &changes, JournalLevel::MajorOnly);
        assert_eq!(lines, vec!["- **09:05** created Weekly sync [[evt-1]]".to_string()]);
        assert!(journal_lines(now, &changes, JournalLevel::None).is_empty());
    }

    #[test]
    fn verbose_includes_truncated_children() {
        let now = Utc.with_ymd_and_hms(2025, 3, 2, 9, 5, 0).unwrap();
        let long = "x".repeat(150);
        let changes = vec![change("updated", false, vec![long, "short".into()])];
        let lines = journal_lines(now, &changes, JournalLevel::Verbose);
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1], format!("  > {}...", "x".repeat(100)));
        assert_eq!(lines[2], "  > short");
    }

    #[tokio::test]
    async fn file_journal_appends_daily_page() {
        let home = tempfile::TempDir::new().expect("home");
        let journal = FileJournal::new(home.path());
        journal
            .append("20250302", vec!["- one".into()])
            .await
            .expect("append");
        journal
            .append("20250302", vec!["- two".into()])
            .await
            .expect("append");
        let page = std::fs::read_to_string(records::journal_path_at(home.path(), "20250302"))
            .expect("read");
        assert_eq!(page, "- one\n- two\n");
    }
}
