//! Durable record store seam.
//!
//! [`RecordStore`] is the only state shared between client instances. It
//! offers plain reads and single-field writes and nothing stronger: there is
//! no compare-and-swap, which is why [`crate::lock`] exists.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use synchub_core::{
    records, ActivityEntry, ProviderId, ProviderRecord, RecordError, RecordUpdate,
};

use crate::error::SyncError;

/// Async access to provider records and their activity ledgers.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Fresh read of one record; `None` if it does not exist.
    async fn load(&self, id: &ProviderId) -> Result<Option<ProviderRecord>, SyncError>;

    /// All records, sorted by provider id.
    async fn list(&self) -> Result<Vec<ProviderRecord>, SyncError>;

    /// Write `record` unless one already exists. Returns `true` if written.
    async fn create(&self, record: ProviderRecord) -> Result<bool, SyncError>;

    /// Apply one field update. Errors if the record is missing.
    async fn update(&self, id: &ProviderId, update: RecordUpdate) -> Result<(), SyncError>;

    async fn append_activity(&self, id: &ProviderId, entry: ActivityEntry) -> Result<(), SyncError>;

    /// Ledger entries, oldest first.
    async fn activity(&self, id: &ProviderId) -> Result<Vec<ActivityEntry>, SyncError>;
}

// ---------------------------------------------------------------------------
// File store
// ---------------------------------------------------------------------------

/// [`RecordStore`] over `~/.synchub/`; blocking file I/O runs on the
/// blocking pool so the event loop is never stalled.
#[derive(Debug, Clone)]
pub struct FileStore {
    home: PathBuf,
}

impl FileStore {
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self { home: home.into() }
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T, SyncError>
    where
        T: Send + 'static,
        F: FnOnce(&Path) -> Result<T, RecordError> + Send + 'static,
    {
        let home = self.home.clone();
        Ok(tokio::task::spawn_blocking(move || f(&home)).await??)
    }
}

#[async_trait]
impl RecordStore for FileStore {
    async fn load(&self, id: &ProviderId) -> Result<Option<ProviderRecord>, SyncError> {
        let id = id.clone();
        self.blocking(move |home| records::load_record_at(home, &id)).await
    }

    async fn list(&self) -> Result<Vec<ProviderRecord>, SyncError> {
        self.blocking(records::list_records_at).await
    }

    async fn create(&self, record: ProviderRecord) -> Result<bool, SyncError> {
        self.blocking(move |home| records::create_record_at(home, &record))
            .await
    }

    async fn update(&self, id: &ProviderId, update: RecordUpdate) -> Result<(), SyncError> {
        let id = id.clone();
        self.blocking(move |home| records::update_record_at(home, &id, update).map(|_| ()))
            .await
    }

    async fn append_activity(&self, id: &ProviderId, entry: ActivityEntry) -> Result<(), SyncError> {
        let id = id.clone();
        self.blocking(move |home| records::append_activity_at(home, &id, &entry))
            .await
    }

    async fn activity(&self, id: &ProviderId) -> Result<Vec<ActivityEntry>, SyncError> {
        let id = id.clone();
        self.blocking(move |home| records::load_activity_at(home, &id))
            .await
    }
}

// ---------------------------------------------------------------------------
// Memory store
// ---------------------------------------------------------------------------

/// In-process [`RecordStore`].
///
/// An optional per-operation latency makes every read and write suspend,
/// which lets tests interleave several simulated instances deterministically
/// under a paused clock.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<BTreeMap<ProviderId, ProviderRecord>>,
    activity: Mutex<HashMap<ProviderId, Vec<ActivityEntry>>>,
    latency: Option<Duration>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Self::default()
        }
    }

    /// Synchronous peek, for assertions.
    pub fn snapshot(&self, id: &ProviderId) -> Option<ProviderRecord> {
        lock(&self.records).get(id).cloned()
    }

    /// Overwrite a record wholesale, bypassing single-field updates.
    pub fn put(&self, record: ProviderRecord) {
        lock(&self.records).insert(record.plugin_id.clone(), record);
    }

    pub fn remove(&self, id: &ProviderId) -> Option<ProviderRecord> {
        lock(&self.records).remove(id)
    }

    async fn settle(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn load(&self, id: &ProviderId) -> Result<Option<ProviderRecord>, SyncError> {
        self.settle().await;
        Ok(lock(&self.records).get(id).cloned())
    }

    async fn list(&self) -> Result<Vec<ProviderRecord>, SyncError> {
        self.settle().await;
        Ok(lock(&self.records).values().cloned().collect())
    }

    async fn create(&self, record: ProviderRecord) -> Result<bool, SyncError> {
        self.settle().await;
        let mut records = lock(&self.records);
        if records.contains_key(&record.plugin_id) {
            return Ok(false);
        }
        records.insert(record.plugin_id.clone(), record);
        Ok(true)
    }

    async fn update(&self, id: &ProviderId, update: RecordUpdate) -> Result<(), SyncError> {
        self.settle().await;
        let mut records = lock(&self.records);
        let record = records.get_mut(id).ok_or_else(|| RecordError::RecordNotFound {
            id: id.0.clone(),
        })?;
        update.apply(record);
        Ok(())
    }

    async fn append_activity(&self, id: &ProviderId, entry: ActivityEntry) -> Result<(), SyncError> {
        self.settle().await;
        lock(&self.activity).entry(id.clone()).or_default().push(entry);
        Ok(())
    }

    async fn activity(&self, id: &ProviderId) -> Result<Vec<ActivityEntry>, SyncError> {
        self.settle().await;
        Ok(lock(&self.activity).get(id).cloned().unwrap_or_default())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
