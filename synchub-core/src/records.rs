//! File-backed provider records and activity ledgers.
//!
//! # Storage layout
//!
//! ```text
//! ~/.synchub/
//!   records/<plugin_id>.yaml     (one record per provider, mode 0600)
//!   activity/<plugin_id>.jsonl   (append-only ledger, one JSON entry per line)
//!   journal/<YYYYMMDD>.md        (daily journal feed)
//! ```
//!
//! # API pattern
//!
//! Every function takes the home directory explicitly (`fn_at(home, …)`).
//! Binaries resolve it once with [`home`]; tests pass a `TempDir`.
//!
//! Nothing here is atomic across processes. A record update is a
//! read-modify-write of one file; the last rename wins.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::{io_err, RecordError};
use crate::types::{ActivityEntry, ProviderId, ProviderRecord, RecordUpdate};

// ---------------------------------------------------------------------------
// 1. Path helpers
// ---------------------------------------------------------------------------

/// `<home>/.synchub/`
pub fn synchub_root(home: &Path) -> PathBuf {
    home.join(".synchub")
}

/// `<home>/.synchub/records/`
pub fn records_dir(home: &Path) -> PathBuf {
    synchub_root(home).join("records")
}

/// `<home>/.synchub/activity/`
pub fn activity_dir(home: &Path) -> PathBuf {
    synchub_root(home).join("activity")
}

/// `<home>/.synchub/journal/`
pub fn journal_dir(home: &Path) -> PathBuf {
    synchub_root(home).join("journal")
}

/// `<home>/.synchub/records/<id>.yaml`. Pure, no I/O.
pub fn record_path_at(home: &Path, id: &ProviderId) -> PathBuf {
    records_dir(home).join(format!("{}.yaml", id.0))
}

/// `<home>/.synchub/activity/<id>.jsonl`. Pure, no I/O.
pub fn activity_path_at(home: &Path, id: &ProviderId) -> PathBuf {
    activity_dir(home).join(format!("{}.jsonl", id.0))
}

/// `<home>/.synchub/journal/<YYYYMMDD>.md`. Pure, no I/O.
pub fn journal_path_at(home: &Path, day: &str) -> PathBuf {
    journal_dir(home).join(format!("{day}.md"))
}

// ---------------------------------------------------------------------------
// 2. Load
// ---------------------------------------------------------------------------

/// Load the record for `id`, or `None` if no record exists yet.
///
/// Returns `RecordError::Parse` (with path + line context) if malformed YAML.
pub fn load_record_at(home: &Path, id: &ProviderId) -> Result<Option<ProviderRecord>, RecordError> {
    let path = record_path_at(home, checked(id)?);
    let contents = match std::fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(io_err(&path, err)),
    };
    serde_yaml::from_str(&contents)
        .map(Some)
        .map_err(|e| RecordError::Parse { path, source: e })
}

/// Every record under `<home>/.synchub/records/`, sorted by provider id.
///
/// Only `.yaml` files are read, so temp files from interrupted saves never
/// show up. A record that fails to parse is logged and left out; one broken
/// file must not hide the others.
pub fn list_records_at(home: &Path) -> Result<Vec<ProviderRecord>, RecordError> {
    let dir = records_dir(home);
    if !dir.exists() {
        return Ok(vec![]);
    }

    let mut entries: Vec<_> = std::fs::read_dir(&dir)
        .map_err(|e| io_err(&dir, e))?
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
        .collect();
    entries.sort_by_key(|e| e.file_name());

    let mut records = Vec::new();
    for entry in entries {
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("yaml") {
            continue;
        }
        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            // Renamed or removed since read_dir.
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
            Err(err) => return Err(io_err(&path, err)),
        };
        match serde_yaml::from_str::<ProviderRecord>(&contents) {
            Ok(record) => records.push(record),
            Err(err) => warn!(path = %path.display(), error = %err, "skipping unreadable record"),
        }
    }
    records.sort_by(|a, b| a.plugin_id.cmp(&b.plugin_id));
    Ok(records)
}

// ---------------------------------------------------------------------------
// 3. Save (atomic)
// ---------------------------------------------------------------------------

/// Atomically save a record to `<home>/.synchub/records/<id>.yaml`.
///
/// Write flow: serialize → uniquely named temp sibling → `chmod 0600` → `rename`.
///
/// Each call gets its own temp file, so concurrent saves of the same record
/// never clobber each other's half-written data. The temp file is removed if
/// anything fails before the rename.
pub fn save_record_at(home: &Path, record: &ProviderRecord) -> Result<(), RecordError> {
    let path = record_path_at(home, checked(&record.plugin_id)?);
    let dir = records_dir(home);
    ensure_dir(&dir)?;

    let yaml = serde_yaml::to_string(record)?;
    let mut tmp = tempfile::Builder::new()
        .prefix(&format!(".{}.", record.plugin_id.0))
        .suffix(".tmp")
        .tempfile_in(&dir)
        .map_err(|e| io_err(&dir, e))?;
    tmp.write_all(yaml.as_bytes())
        .map_err(|e| io_err(tmp.path(), e))?;
    set_file_permissions(tmp.path())?;
    tmp.persist(&path).map_err(|e| io_err(&path, e.error))?;
    Ok(())
}

/// Create `record` unless one already exists for its id.
///
/// Returns `true` when a new record was written.
pub fn create_record_at(home: &Path, record: &ProviderRecord) -> Result<bool, RecordError> {
    if load_record_at(home, &record.plugin_id)?.is_some() {
        return Ok(false);
    }
    save_record_at(home, record)?;
    Ok(true)
}

/// Apply a single-field update to an existing record and return the result.
pub fn update_record_at(
    home: &Path,
    id: &ProviderId,
    update: RecordUpdate,
) -> Result<ProviderRecord, RecordError> {
    let mut record = load_record_at(home, id)?.ok_or_else(|| RecordError::RecordNotFound {
        id: id.0.clone(),
    })?;
    update.apply(&mut record);
    save_record_at(home, &record)?;
    Ok(record)
}

// ---------------------------------------------------------------------------
// 4. Activity ledger
// ---------------------------------------------------------------------------

/// Append one entry to the provider's ledger. Existing lines are never rewritten.
pub fn append_activity_at(
    home: &Path,
    id: &ProviderId,
    entry: &ActivityEntry,
) -> Result<(), RecordError> {
    let path = activity_path_at(home, checked(id)?);
    ensure_dir(&activity_dir(home))?;
    let mut line = serde_json::to_string(entry)?;
    line.push('\n');
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|e| io_err(&path, e))?;
    file.write_all(line.as_bytes()).map_err(|e| io_err(&path, e))?;
    Ok(())
}

/// Read the ledger oldest-to-newest.
///
/// A torn trailing line from an interrupted append is skipped.
pub fn load_activity_at(home: &Path, id: &ProviderId) -> Result<Vec<ActivityEntry>, RecordError> {
    let path = activity_path_at(home, checked(id)?);
    let contents = match std::fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(vec![]),
        Err(err) => return Err(io_err(&path, err)),
    };
    Ok(contents
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| serde_json::from_str(line).ok())
        .collect())
}

// ---------------------------------------------------------------------------
// 5. Journal
// ---------------------------------------------------------------------------

/// Append markdown lines to the journal page for `day` (`YYYYMMDD`).
pub fn append_journal_at(home: &Path, day: &str, lines: &[String]) -> Result<(), RecordError> {
    if lines.is_empty() {
        return Ok(());
    }
    let path = journal_path_at(home, day);
    ensure_dir(&journal_dir(home))?;
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|e| io_err(&path, e))?;
    let mut buf = lines.join("\n");
    buf.push('\n');
    file.write_all(buf.as_bytes()).map_err(|e| io_err(&path, e))?;
    Ok(())
}

/// Home directory of the current user.
pub fn home() -> Result<PathBuf, RecordError> {
    dirs::home_dir().ok_or(RecordError::HomeNotFound)
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

fn checked(id: &ProviderId) -> Result<&ProviderId, RecordError> {
    if id.is_valid() {
        Ok(id)
    } else {
        Err(RecordError::InvalidId { id: id.0.clone() })
    }
}

fn ensure_dir(dir: &Path) -> Result<(), RecordError> {
    if !dir.exists() {
        std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
        set_dir_permissions(dir)?;
    }
    Ok(())
}

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), RecordError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
        .map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), RecordError> {
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), RecordError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), RecordError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
