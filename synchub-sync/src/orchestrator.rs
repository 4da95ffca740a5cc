//! The façade one client instance owns.
//!
//! All in-memory state (registry, activity queue, executor) hangs off a
//! single [`Orchestrator`] built at startup and shut down explicitly.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use synchub_core::{time::format_relative_time, ProviderId, RecordUpdate, SyncStatus};

use crate::activity::ActivityLog;
use crate::config::EngineConfig;
use crate::error::SyncError;
use crate::executor::{Executor, RunOutcome, SyncRequest};
use crate::notify::{JournalSink, Notification, NotificationLevel, Notifier};
use crate::registry::{ProviderDescriptor, ProviderInfo, Registry};
use crate::scheduler::{Scheduler, TickReport};
use crate::store::RecordStore;

const HUB_TITLE: &str = "Sync Hub";
pub const RESET_MARKER: &str = "Reset by user";

/// Status view of one provider record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderStatus {
    pub id: ProviderId,
    pub name: String,
    pub enabled: bool,
    pub registered: bool,
    pub status: SyncStatus,
    pub interval: String,
    pub last_run: Option<DateTime<Utc>>,
    pub last_run_relative: String,
    pub last_error: Option<String>,
}

pub struct Orchestrator {
    store: Arc<dyn RecordStore>,
    registry: Arc<Registry>,
    activity: ActivityLog,
    executor: Executor,
    scheduler: Scheduler,
    notifier: Arc<dyn Notifier>,
    config: EngineConfig,
}

impl Orchestrator {
    /// Must be called from within a tokio runtime.
    pub fn new(
        store: Arc<dyn RecordStore>,
        notifier: Arc<dyn Notifier>,
        journal: Arc<dyn JournalSink>,
        config: EngineConfig,
    ) -> Self {
        let activity = ActivityLog::spawn(Arc::clone(&store));
        let registry = Arc::new(Registry::new(
            Arc::clone(&store),
            activity.clone(),
            config.default_interval.clone(),
        ));
        let executor = Executor::new(
            Arc::clone(&store),
            activity.clone(),
            Arc::clone(&notifier),
            journal,
            config.clone(),
        );
        let scheduler = Scheduler::new(Arc::clone(&store), Arc::clone(&registry), executor.clone());
        Self {
            store,
            registry,
            activity,
            executor,
            scheduler,
            notifier,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn activity(&self) -> &ActivityLog {
        &self.activity
    }

    pub async fn register(&self, descriptor: ProviderDescriptor) -> Result<bool, SyncError> {
        self.registry.register(descriptor).await
    }

    pub fn unregister(&self, id: &ProviderId) -> bool {
        self.registry.unregister(id).is_some()
    }

    pub fn providers(&self) -> Vec<ProviderInfo> {
        self.registry.list()
    }

    /// Run one provider now, skipping the due-time check.
    pub async fn request_sync(
        &self,
        id: &ProviderId,
        request: SyncRequest,
    ) -> Result<RunOutcome, SyncError> {
        let record = self
            .store
            .load(id)
            .await?
            .ok_or_else(|| SyncError::UnknownProvider(id.to_string()))?;
        if !record.enabled {
            return Err(SyncError::Disabled(id.to_string()));
        }
        let descriptor = self
            .registry
            .get(id)
            .ok_or_else(|| SyncError::NotRegistered(id.to_string()))?;
        self.executor.run(&descriptor, request).await
    }

    /// Run every enabled, registered provider one after another, due or not.
    pub async fn sync_all(&self) -> Result<Vec<(ProviderId, RunOutcome)>, SyncError> {
        let runnable: Vec<ProviderDescriptor> = self
            .store
            .list()
            .await?
            .into_iter()
            .filter(|r| r.enabled)
            .filter_map(|r| self.registry.get(&r.plugin_id))
            .collect();

        if runnable.is_empty() {
            self.hub_notice("No syncs enabled");
            return Ok(Vec::new());
        }
        self.hub_notice(format!("Syncing {} plugins...", runnable.len()));

        let mut outcomes = Vec::with_capacity(runnable.len());
        for descriptor in runnable {
            match self.executor.run(&descriptor, SyncRequest::default()).await {
                Ok(outcome) => outcomes.push((descriptor.id, outcome)),
                Err(e) => warn!(provider = %descriptor.id, error = %e, "sync-all run could not start"),
            }
        }
        Ok(outcomes)
    }

    pub async fn tick(&self) -> Result<TickReport, SyncError> {
        self.scheduler.tick().await
    }

    /// Force every `syncing` record back to idle. Lock tokens are left to
    /// expire on their own.
    pub async fn reset_stuck_syncs(&self) -> Result<usize, SyncError> {
        let count = reset_stuck_syncs(self.store.as_ref()).await?;
        self.hub_notice(if count > 0 {
            format!("Reset {count} stuck sync(s)")
        } else {
            "No stuck syncs found".to_string()
        });
        Ok(count)
    }

    pub async fn status(&self, id: &ProviderId) -> Result<Option<ProviderStatus>, SyncError> {
        let Some(record) = self.store.load(id).await? else {
            return Ok(None);
        };
        let now = Utc::now();
        Ok(Some(ProviderStatus {
            registered: self.registry.contains(id),
            name: record.display_name().to_string(),
            id: record.plugin_id,
            enabled: record.enabled,
            status: record.status,
            interval: record.interval,
            last_run_relative: format_relative_time(now, record.last_run),
            last_run: record.last_run,
            last_error: record.last_error,
        }))
    }

    /// Status of every record, registered here or not.
    pub async fn statuses(&self) -> Result<Vec<ProviderStatus>, SyncError> {
        let mut out = Vec::new();
        for record in self.store.list().await? {
            if let Some(status) = self.status(&record.plugin_id).await? {
                out.push(status);
            }
        }
        Ok(out)
    }

    /// Release runs still in flight and drain queued activity entries. Call
    /// before dropping the orchestrator.
    ///
    /// A run still holding its lock here is recorded as interrupted.
    pub async fn shutdown(&self) -> Result<(), SyncError> {
        for id in self.registry.ids() {
            self.registry.unregister(&id);
        }
        let interrupted = self.executor.reset_interrupted().await;
        if interrupted > 0 {
            warn!(interrupted, "released runs still in flight");
        }
        self.activity.flush().await?;
        info!("orchestrator shut down");
        Ok(())
    }

    fn hub_notice(&self, message: impl Into<String>) {
        self.notifier.notify(Notification {
            provider: None,
            title: HUB_TITLE.to_string(),
            message: message.into(),
            level: NotificationLevel::Info,
        });
    }
}

/// Operator escape hatch, usable without a running orchestrator.
///
/// Only `status` and `last_error` are touched.
pub async fn reset_stuck_syncs(store: &dyn RecordStore) -> Result<usize, SyncError> {
    let mut count = 0;
    for record in store.list().await? {
        if !record.is_syncing() {
            continue;
        }
        let id = &record.plugin_id;
        store
            .update(id, RecordUpdate::Status(SyncStatus::Idle))
            .await?;
        store
            .update(id, RecordUpdate::LastError(Some(RESET_MARKER.to_string())))
            .await?;
        info!(provider = %id, "reset stuck sync");
        count += 1;
    }
    Ok(count)
}
