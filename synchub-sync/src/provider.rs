//! The provider seam: what a sync routine receives and returns.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use synchub_core::{ActivityEntry, EntryLevel, LogLevel, ProviderId, ProviderRecord, SyncResult};

use crate::activity::ActivityLog;
use crate::error::SyncError;
use crate::store::RecordStore;

/// An externally authored sync routine.
///
/// Returning `Err` marks the run failed. Returning a [`SyncResult`] with zero
/// counts and an explanatory summary is the way to report a configuration
/// problem without entering the error state.
#[async_trait]
pub trait SyncProvider: Send + Sync {
    async fn sync(&self, ctx: SyncContext) -> anyhow::Result<SyncResult>;
}

struct FnProvider<F>(F);

#[async_trait]
impl<F, Fut> SyncProvider for FnProvider<F>
where
    F: Fn(SyncContext) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<SyncResult>> + Send + 'static,
{
    async fn sync(&self, ctx: SyncContext) -> anyhow::Result<SyncResult> {
        (self.0)(ctx).await
    }
}

/// Build a provider from an async closure.
///
/// ```ignore
/// let provider = provider_fn(|ctx| async move {
///     ctx.log("pulling issues");
///     Ok(SyncResult::skipped("no token configured"))
/// });
/// ```
pub fn provider_fn<F, Fut>(f: F) -> Arc<dyn SyncProvider>
where
    F: Fn(SyncContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<SyncResult>> + Send + 'static,
{
    Arc::new(FnProvider(f))
}

/// Read-only view of the shared store handed to providers.
#[derive(Clone)]
pub struct Workspace {
    store: Arc<dyn RecordStore>,
}

impl Workspace {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    pub async fn record(&self, id: &ProviderId) -> Result<Option<ProviderRecord>, SyncError> {
        self.store.load(id).await
    }

    pub async fn records(&self) -> Result<Vec<ProviderRecord>, SyncError> {
        self.store.list().await
    }

    pub async fn activity(&self, id: &ProviderId) -> Result<Vec<ActivityEntry>, SyncError> {
        self.store.activity(id).await
    }
}

/// Everything a routine may touch during one run.
#[derive(Clone)]
pub struct SyncContext {
    pub provider_id: ProviderId,
    /// Completion time of the previous run; `None` on a cold or full run.
    pub last_run: Option<DateTime<Utc>>,
    pub full: bool,
    pub workspace: Workspace,
    log_level: LogLevel,
    activity: ActivityLog,
}

impl SyncContext {
    pub(crate) fn new(
        provider_id: ProviderId,
        last_run: Option<DateTime<Utc>>,
        full: bool,
        workspace: Workspace,
        log_level: LogLevel,
        activity: ActivityLog,
    ) -> Self {
        Self {
            provider_id,
            last_run,
            full,
            workspace,
            log_level,
            activity,
        }
    }

    /// Append a line to this provider's activity log.
    pub fn log(&self, message: impl Into<String>) {
        self.activity
            .message(&self.provider_id, EntryLevel::Info, message);
    }

    /// Like [`Self::log`], but only recorded when the record's log level is debug.
    pub fn debug(&self, message: impl AsRef<str>) {
        if self.log_level == LogLevel::Debug {
            self.activity.message(
                &self.provider_id,
                EntryLevel::Debug,
                format!("[debug] {}", message.as_ref()),
            );
        }
    }
}

impl std::fmt::Debug for SyncContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncContext")
            .field("provider_id", &self.provider_id)
            .field("last_run", &self.last_run)
            .field("full", &self.full)
            .field("log_level", &self.log_level)
            .finish_non_exhaustive()
    }
}
