//! Domain types for the Sync Hub record store.
//!
//! [`ProviderRecord`] is the only state that survives restarts and is shared
//! between client instances. Every field has a defined default so that
//! records written by older or foreign clients still load.

use std::fmt;

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

use crate::interval::{Interval, DEFAULT_INTERVAL_SPEC};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Stable identity of a sync provider (e.g. `github-sync`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProviderId(pub String);

impl ProviderId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Ids double as file names in the record store, so they are restricted
    /// to ASCII alphanumerics, `-`, `_` and `.` and may not start with a dot.
    pub fn is_valid(&self) -> bool {
        !self.0.is_empty()
            && !self.0.starts_with('.')
            && self
                .0
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for ProviderId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ProviderId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Lifecycle state of a provider record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    #[default]
    Idle,
    Syncing,
    Error,
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncStatus::Idle => write!(f, "idle"),
            SyncStatus::Syncing => write!(f, "syncing"),
            SyncStatus::Error => write!(f, "error"),
        }
    }
}

/// How much a provider writes to its activity log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    #[default]
    Info,
    Debug,
}

/// When a successful run surfaces a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ToastLevel {
    None,
    ErrorsOnly,
    #[default]
    NewRecords,
    AllUpdates,
}

/// Which changes are mirrored into the daily journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JournalLevel {
    #[default]
    None,
    MajorOnly,
    Verbose,
}

// ---------------------------------------------------------------------------
// Lock token
// ---------------------------------------------------------------------------

/// Advisory lock written into a record's `sync_lock` field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockToken {
    /// Unix milliseconds at which the token was written.
    pub timestamp: i64,
    pub sync_run_id: String,
}

impl LockToken {
    pub fn new(now: DateTime<Utc>, sync_run_id: impl Into<String>) -> Self {
        Self {
            timestamp: now.timestamp_millis(),
            sync_run_id: sync_run_id.into(),
        }
    }

    pub fn written_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.timestamp).single()
    }

    /// Age relative to `now`. A token from the future (clock skew) has age zero.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        let millis = now.timestamp_millis().saturating_sub(self.timestamp).max(0);
        Duration::milliseconds(millis)
    }

    pub fn is_stale(&self, now: DateTime<Utc>, threshold: Duration) -> bool {
        self.age(now) >= threshold
    }
}

/// `sync_lock` is persisted as a JSON string inside the record, so foreign
/// clients that only understand text fields can still round-trip it.
mod lock_json {
    use serde::{de::Deserializer, ser::Error as _, Deserialize, Serializer};

    use super::LockToken;

    pub fn serialize<S>(token: &Option<LockToken>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match token {
            Some(token) => {
                let json = serde_json::to_string(token).map_err(S::Error::custom)?;
                serializer.serialize_some(&json)
            }
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<LockToken>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        // An unreadable token is treated as no token; it can never be verified.
        Ok(raw
            .filter(|s| !s.trim().is_empty())
            .and_then(|s| serde_json::from_str(&s).ok()))
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum EnabledCompat {
    Flag(bool),
    Choice(String),
}

fn enabled_compat<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<EnabledCompat>::deserialize(deserializer)? {
        Some(EnabledCompat::Flag(flag)) => flag,
        Some(EnabledCompat::Choice(choice)) => matches!(
            choice.trim().to_ascii_lowercase().as_str(),
            "yes" | "true" | "on"
        ),
        None => false,
    })
}

/// Unknown or mistyped choice values load as the field's default instead of
/// failing the whole record.
fn or_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let raw = serde_yaml::Value::deserialize(deserializer)?;
    Ok(T::deserialize(raw).unwrap_or_default())
}

fn default_interval_spec() -> String {
    DEFAULT_INTERVAL_SPEC.to_string()
}

// ---------------------------------------------------------------------------
// Provider record
// ---------------------------------------------------------------------------

/// Durable per-provider record. One YAML document per provider id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderRecord {
    pub plugin_id: ProviderId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "enabled_compat")]
    pub enabled: bool,
    #[serde(default, deserialize_with = "or_default")]
    pub status: SyncStatus,
    #[serde(default = "default_interval_spec")]
    pub interval: String,
    #[serde(default)]
    pub last_run: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_error: Option<String>,
    #[serde(default, with = "lock_json")]
    pub sync_lock: Option<LockToken>,
    #[serde(default, deserialize_with = "or_default")]
    pub log_level: LogLevel,
    #[serde(default, deserialize_with = "or_default")]
    pub toast: ToastLevel,
    #[serde(default, deserialize_with = "or_default")]
    pub journal: JournalLevel,
}

impl ProviderRecord {
    /// A freshly registered provider: enabled, idle, never run.
    pub fn new(id: ProviderId, name: Option<String>, interval: impl Into<String>) -> Self {
        Self {
            plugin_id: id,
            name,
            enabled: true,
            status: SyncStatus::Idle,
            interval: interval.into(),
            last_run: None,
            last_error: None,
            sync_lock: None,
            log_level: LogLevel::Info,
            toast: ToastLevel::NewRecords,
            journal: JournalLevel::MajorOnly,
        }
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(self.plugin_id.as_str())
    }

    pub fn interval(&self) -> Interval {
        Interval::parse(&self.interval)
    }

    pub fn is_syncing(&self) -> bool {
        self.status == SyncStatus::Syncing
    }
}

/// A single-field mutation of a [`ProviderRecord`].
///
/// Writers change one field at a time so that concurrent writers touching
/// different fields of the same record do not clobber each other's intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordUpdate {
    Enabled(bool),
    Status(SyncStatus),
    Interval(String),
    LastRun(Option<DateTime<Utc>>),
    LastError(Option<String>),
    SyncLock(Option<LockToken>),
    LogLevel(LogLevel),
    Toast(ToastLevel),
    Journal(JournalLevel),
}

impl RecordUpdate {
    pub fn apply(self, record: &mut ProviderRecord) {
        match self {
            RecordUpdate::Enabled(v) => record.enabled = v,
            RecordUpdate::Status(v) => record.status = v,
            RecordUpdate::Interval(v) => record.interval = v,
            RecordUpdate::LastRun(v) => record.last_run = v,
            RecordUpdate::LastError(v) => record.last_error = v,
            RecordUpdate::SyncLock(v) => record.sync_lock = v,
            RecordUpdate::LogLevel(v) => record.log_level = v,
            RecordUpdate::Toast(v) => record.toast = v,
            RecordUpdate::Journal(v) => record.journal = v,
        }
    }
}

// ---------------------------------------------------------------------------
// Activity ledger
// ---------------------------------------------------------------------------

/// Severity attached to a plain activity message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EntryLevel {
    #[default]
    Info,
    Debug,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActivityKind {
    Message {
        message: String,
        #[serde(default)]
        level: EntryLevel,
    },
    Change {
        verb: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        subject: Option<String>,
        #[serde(default)]
        major: bool,
    },
}

/// One line of a provider's append-only activity ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: ActivityKind,
}

impl ActivityEntry {
    pub fn message(timestamp: DateTime<Utc>, level: EntryLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp,
            kind: ActivityKind::Message {
                message: message.into(),
                level,
            },
        }
    }

    pub fn change(timestamp: DateTime<Utc>, change: &Change) -> Self {
        Self {
            timestamp,
            kind: ActivityKind::Change {
                verb: change.verb.clone(),
                title: change.title.clone(),
                subject: (!change.guid.is_empty()).then(|| change.guid.clone()),
                major: change.major,
            },
        }
    }
}

impl fmt::Display for ActivityEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.timestamp.format("%Y-%m-%d %H:%M"))?;
        match &self.kind {
            ActivityKind::Message { message, .. } => write!(f, " {message}"),
            ActivityKind::Change {
                verb,
                title,
                subject,
                ..
            } => {
                write!(f, " {verb}")?;
                if let Some(title) = title {
                    write!(f, " {title}")?;
                }
                if let Some(subject) = subject {
                    write!(f, " [[{subject}]]")?;
                }
                Ok(())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Provider results
// ---------------------------------------------------------------------------

/// One notable effect of a sync run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    pub verb: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub guid: String,
    #[serde(default)]
    pub major: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<String>,
}

/// What a provider routine reports back on success.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SyncResult {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub created: u64,
    #[serde(default)]
    pub updated: u64,
    #[serde(default)]
    pub changes: Vec<Change>,
}

impl SyncResult {
    /// A configuration problem is reported as a normal, empty result.
    pub fn skipped(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            ..Self::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
