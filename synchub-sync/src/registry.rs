//! In-memory plugin registry for one orchestrator instance.
//!
//! Descriptors live only in memory. Registration lazily creates the durable
//! record the first time an id is seen; unregistration leaves it alone so a
//! provider resumes from its prior state when it comes back.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::Serialize;
use tracing::{info, warn};

use synchub_core::{EntryLevel, ProviderId, ProviderRecord};

use crate::activity::ActivityLog;
use crate::error::SyncError;
use crate::provider::SyncProvider;
use crate::store::RecordStore;

/// Version providers are expected to declare.
pub const HOST_VERSION: &str = env!("CARGO_PKG_VERSION");

/// What a provider hands over when it registers.
#[derive(Clone)]
pub struct ProviderDescriptor {
    pub id: ProviderId,
    pub name: String,
    pub icon: String,
    /// `manual` or `<N>[s|m|h|d]`; empty means the engine default.
    pub default_interval: String,
    pub version: String,
    pub provider: Arc<dyn SyncProvider>,
}

impl ProviderDescriptor {
    pub fn new(id: impl Into<ProviderId>, name: impl Into<String>, provider: Arc<dyn SyncProvider>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            icon: String::new(),
            default_interval: String::new(),
            version: HOST_VERSION.to_string(),
            provider,
        }
    }

    pub fn icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = icon.into();
        self
    }

    pub fn interval(mut self, spec: impl Into<String>) -> Self {
        self.default_interval = spec.into();
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }
}

impl fmt::Debug for ProviderDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderDescriptor")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("icon", &self.icon)
            .field("default_interval", &self.default_interval)
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

/// Health view of one registered provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderInfo {
    pub id: ProviderId,
    pub name: String,
    pub icon: String,
    pub default_interval: String,
    pub version: String,
    pub version_matches: bool,
}

pub struct Registry {
    store: Arc<dyn RecordStore>,
    activity: ActivityLog,
    default_interval: String,
    providers: RwLock<HashMap<ProviderId, ProviderDescriptor>>,
}

impl Registry {
    pub fn new(store: Arc<dyn RecordStore>, activity: ActivityLog, default_interval: impl Into<String>) -> Self {
        Self {
            store,
            activity,
            default_interval: default_interval.into(),
            providers: RwLock::new(HashMap::new()),
        }
    }

    /// Store or replace the descriptor, creating the durable record if absent.
    ///
    /// Returns `true` when a new record was created.
    pub async fn register(&self, descriptor: ProviderDescriptor) -> Result<bool, SyncError> {
        if descriptor.id.as_str().trim().is_empty() || !descriptor.id.is_valid() {
            return Err(SyncError::InvalidDescriptor(format!(
                "provider id '{}' is not usable",
                descriptor.id
            )));
        }
        if descriptor.version != HOST_VERSION {
            warn!(
                provider = %descriptor.id,
                provider_version = %descriptor.version,
                host_version = HOST_VERSION,
                "provider version differs from host"
            );
        }

        let id = descriptor.id.clone();
        let name = descriptor.name.clone();
        let interval = if descriptor.default_interval.trim().is_empty() {
            self.default_interval.clone()
        } else {
            descriptor.default_interval.clone()
        };

        self.write().insert(id.clone(), descriptor);

        let display = (!name.is_empty()).then(|| name.clone());
        let created = self
            .store
            .create(ProviderRecord::new(id.clone(), display, interval))
            .await?;
        if created {
            let shown = if name.is_empty() { id.to_string() } else { name };
            self.activity
                .message(&id, EntryLevel::Info, format!("Plugin registered: {shown}"));
            info!(provider = %id, "created provider record");
        }
        Ok(created)
    }

    /// Drop the in-memory descriptor. The durable record is untouched.
    pub fn unregister(&self, id: &ProviderId) -> Option<ProviderDescriptor> {
        self.write().remove(id)
    }

    pub fn get(&self, id: &ProviderId) -> Option<ProviderDescriptor> {
        self.read().get(id).cloned()
    }

    pub fn contains(&self, id: &ProviderId) -> bool {
        self.read().contains_key(id)
    }

    pub fn ids(&self) -> Vec<ProviderId> {
        let mut ids: Vec<_> = self.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Every registered provider, sorted by id.
    pub fn list(&self) -> Vec<ProviderInfo> {
        let mut infos: Vec<ProviderInfo> = self
            .read()
            .values()
            .map(|d| ProviderInfo {
                id: d.id.clone(),
                name: d.name.clone(),
                icon: d.icon.clone(),
                default_interval: d.default_interval.clone(),
                version: d.version.clone(),
                version_matches: d.version == HOST_VERSION,
            })
            .collect();
        infos.sort_by(|a, b| a.id.cmp(&b.id));
        infos
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<ProviderId, ProviderDescriptor>> {
        self.providers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<ProviderId, ProviderDescriptor>> {
        self.providers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use synchub_core::{RecordUpdate, SyncResult, SyncStatus};

    use super::*;
    use crate::provider::provider_fn;
    use crate::store::MemoryStore;

    fn noop() -> Arc<dyn SyncProvider> {
        provider_fn(|_ctx| async { Ok(SyncResult::skipped("noop")) })
    }

    fn registry() -> (Arc<MemoryStore>, ActivityLog, Registry) {
        let store = Arc::new(MemoryStore::new());
        let activity = ActivityLog::spawn(store.clone());
        let registry = Registry::new(store.clone(), activity.clone(), "5m");
        (store, activity, registry)
    }

    #[tokio::test]
    async fn register_creates_record_once() {
        let (store, activity, registry) = registry();
        let id = ProviderId::from("github");
        let created = registry
            .register(ProviderDescriptor::new("github", "GitHub", noop()).interval("15m"))
            .await
            .expect("register");
        assert!(created);

        let record = store.snapshot(&id).expect("record");
        assert!(record.enabled);
        assert_eq!(record.status, SyncStatus::Idle);
        assert_eq!(record.interval, "15m");
        assert_eq!(record.name.as_deref(), Some("GitHub"));

        let again = registry
            .register(ProviderDescriptor::new("github", "GitHub v2", noop()).interval("1h"))
            .await
            .expect("re-register");
        assert!(!again);
        assert_eq!(store.snapshot(&id).expect("record").interval, "15m");
        assert_eq!(registry.get(&id).expect("descriptor").name, "GitHub v2");

        let entries = activity.entries(&id).await.expect("entries");
        assert_eq!(entries.len(), 1);
        assert!(entries[0].to_string().ends_with("Plugin registered: GitHub"));
    }

    #[tokio::test]
    async fn unregister_keeps_durable_state() {
        let (store, _activity, registry) = registry();
        let id = ProviderId::from("calendar");
        registry
            .register(ProviderDescriptor::new("calendar", "Calendar", noop()))
            .await
            .expect("register");
        store
            .update(&id, RecordUpdate::Interval("manual".into()))
            .await
            .expect("update");

        assert!(registry.unregister(&id).is_some());
        assert!(!registry.contains(&id));
        assert_eq!(store.snapshot(&id).expect("record").interval, "manual");

        registry
            .register(ProviderDescriptor::new("calendar", "Calendar", noop()))
            .await
            .expect("register again");
        assert_eq!(store.snapshot(&id).expect("record").interval, "manual");
    }

    #[tokio::test]
    async fn empty_interval_uses_engine_default() {
        let (store, _activity, registry) = registry();
        registry
            .register(ProviderDescriptor::new("contacts", "", noop()))
            .await
            .expect("register");
        let record = store.snapshot(&ProviderId::from("contacts")).expect("record");
        assert_eq!(record.interval, "5m");
        assert!(record.name.is_none());
    }

    #[tokio::test]
    async fn invalid_ids_are_rejected() {
        let (_store, _activity, registry) = registry();
        for bad in ["", "   ", "../x"] {
            let err = registry
                .register(ProviderDescriptor::new(bad, "Bad", noop()))
                .await
                .expect_err("invalid");
            assert!(matches!(err, SyncError::InvalidDescriptor(_)), "{bad:?}");
        }
        assert!(registry.list().is_empty());
    }

    #[tokio::test]
    async fn list_flags_version_mismatch() {
        let (_store, _activity, registry) = registry();
        registry
            .register(ProviderDescriptor::new("b", "B", noop()).version("0.0.1"))
            .await
            .expect("register");
        registry
            .register(ProviderDescriptor::new("a", "A", noop()))
            .await
            .expect("register");
        let list = registry.list();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].id.as_str(), "a");
        assert!(list[0].version_matches);
        assert!(!list[1].version_matches);
    }
}
