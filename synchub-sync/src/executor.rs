//! Per-provider run state machine.
//!
//! ```text
//! idle/error --acquire--> syncing --ok--------> idle
//!                                 --err/timeout--> error
//! ```
//!
//! Whatever happens after the lock is held, the run ends by stamping
//! `last_run` and releasing the lock. If the run future itself is dropped
//! halfway, [`RunGuard`] schedules the release instead. Runs still holding a
//! lock when the engine shuts down are released by
//! [`Executor::reset_interrupted`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use synchub_core::{
    time::journal_day, EntryLevel, JournalLevel, LockToken, LogLevel, ProviderId, RecordUpdate,
    SyncResult, SyncStatus, ToastLevel,
};

use crate::activity::ActivityLog;
use crate::config::EngineConfig;
use crate::error::SyncError;
use crate::lock::LockManager;
use crate::notify::{journal_lines, should_toast, JournalSink, Notification, NotificationLevel, Notifier};
use crate::provider::{SyncContext, Workspace};
use crate::registry::ProviderDescriptor;
use crate::store::RecordStore;

const INTERRUPTED: &str = "Sync interrupted";

/// How a run was asked for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncRequest {
    /// Clear `last_run` first so the provider does a cold run.
    pub full: bool,
    /// User-triggered; success always notifies.
    pub manual: bool,
}

impl SyncRequest {
    pub fn manual() -> Self {
        Self {
            full: false,
            manual: true,
        }
    }

    pub fn full() -> Self {
        Self {
            full: true,
            manual: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Another run holds a fresh lock, or the record disappeared.
    LockUnavailable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub provider: ProviderId,
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<SyncResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "report", rename_all = "snake_case")]
pub enum RunOutcome {
    Skipped(SkipReason),
    Succeeded(RunReport),
    Failed(RunReport),
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Succeeded(_))
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, RunOutcome::Skipped(_))
    }

    pub fn report(&self) -> Option<&RunReport> {
        match self {
            RunOutcome::Skipped(_) => None,
            RunOutcome::Succeeded(report) | RunOutcome::Failed(report) => Some(report),
        }
    }
}

/// Record settings read once the run is underway.
struct RunSettings {
    last_run: Option<DateTime<Utc>>,
    log_level: LogLevel,
    toast: ToastLevel,
    journal: JournalLevel,
}

/// Provider → run id, for every lock held by a run on this instance.
type InFlight = Arc<Mutex<HashMap<ProviderId, String>>>;

#[derive(Clone)]
pub struct Executor {
    store: Arc<dyn RecordStore>,
    locks: LockManager,
    in_flight: InFlight,
    activity: ActivityLog,
    notifier: Arc<dyn Notifier>,
    journal: Arc<dyn JournalSink>,
    config: EngineConfig,
}

impl Executor {
    pub fn new(
        store: Arc<dyn RecordStore>,
        activity: ActivityLog,
        notifier: Arc<dyn Notifier>,
        journal: Arc<dyn JournalSink>,
        config: EngineConfig,
    ) -> Self {
        Self {
            locks: LockManager::new(Arc::clone(&store), &config),
            in_flight: InFlight::default(),
            store,
            activity,
            notifier,
            journal,
            config,
        }
    }

    /// Run one provider through lock, invocation and cleanup.
    ///
    /// `Err` only comes from the store failing before the lock is held.
    /// Provider failures are reported as [`RunOutcome::Failed`].
    pub async fn run(
        &self,
        descriptor: &ProviderDescriptor,
        request: SyncRequest,
    ) -> Result<RunOutcome, SyncError> {
        let id = descriptor.id.clone();
        let Some(token) = self.locks.acquire(&id).await? else {
            return Ok(RunOutcome::Skipped(SkipReason::LockUnavailable));
        };

        let guard = RunGuard::arm(
            Arc::clone(&self.store),
            Arc::clone(&self.in_flight),
            id.clone(),
            token.sync_run_id.clone(),
        );
        let outcome = self.drive(descriptor, request, &token).await;

        // last_run lands before the lock clears so no other instance sees
        // an unlocked record that still looks overdue.
        self.update_logged(&id, RecordUpdate::LastRun(Some(Utc::now())))
            .await;
        if let Err(e) = self.locks.release(&id).await {
            error!(provider = %id, error = %e, "failed to release lock");
        }
        guard.disarm();
        if let Err(e) = self.activity.flush().await {
            warn!(provider = %id, error = %e, "activity flush failed");
        }
        Ok(outcome)
    }

    /// Mark every run still holding a lock as interrupted and clear its lock.
    ///
    /// For shutdown: covers runs whose task was cancelled before its guard's
    /// cleanup got to execute. Returns how many records were reset.
    pub async fn reset_interrupted(&self) -> usize {
        let ids: Vec<ProviderId> = lock_set(&self.in_flight).drain().map(|(id, _)| id).collect();
        for id in &ids {
            warn!(provider = %id, "run still in flight at shutdown; resetting record");
            mark_interrupted(self.store.as_ref(), id).await;
        }
        ids.len()
    }

    async fn drive(
        &self,
        descriptor: &ProviderDescriptor,
        request: SyncRequest,
        token: &LockToken,
    ) -> RunOutcome {
        let id = &descriptor.id;
        let run_id = token.sync_run_id.clone();
        let started_at = Utc::now();
        let clock = tokio::time::Instant::now();

        if request.full {
            self.update_logged(id, RecordUpdate::LastRun(None)).await;
        }
        self.update_logged(id, RecordUpdate::Status(SyncStatus::Syncing))
            .await;
        let settings = self.settings(id).await;

        info!(provider = %id, run_id = %run_id, full = request.full, "sync started");

        let ctx = SyncContext::new(
            id.clone(),
            settings.last_run,
            request.full,
            Workspace::new(Arc::clone(&self.store)),
            settings.log_level,
            self.activity.clone(),
        );
        let provider = Arc::clone(&descriptor.provider);
        // Spawned so a timeout only stops the wait; the routine keeps running.
        let handle = tokio::spawn(async move { provider.sync(ctx).await });

        let attempt = match tokio::time::timeout(self.config.run_timeout, handle).await {
            Ok(Ok(Ok(result))) => Ok(result),
            Ok(Ok(Err(e))) => Err(format!("{e:#}")),
            Ok(Err(join)) if join.is_panic() => Err("provider panicked".to_string()),
            Ok(Err(_)) => Err("provider task cancelled".to_string()),
            Err(_) => Err(self.config.timeout_message()),
        };

        let duration_ms = u64::try_from(clock.elapsed().as_millis()).unwrap_or(u64::MAX);
        let mut report = RunReport {
            provider: id.clone(),
            run_id,
            started_at,
            finished_at: Utc::now(),
            duration_ms,
            result: None,
            error: None,
        };

        match attempt {
            Ok(result) => {
                self.on_success(descriptor, request, &settings, &result, duration_ms)
                    .await;
                report.result = Some(result);
                RunOutcome::Succeeded(report)
            }
            Err(message) => {
                self.on_failure(descriptor, &message).await;
                report.error = Some(message);
                RunOutcome::Failed(report)
            }
        }
    }

    async fn on_success(
        &self,
        descriptor: &ProviderDescriptor,
        request: SyncRequest,
        settings: &RunSettings,
        result: &SyncResult,
        duration_ms: u64,
    ) {
        let id = &descriptor.id;
        self.update_logged(id, RecordUpdate::Status(SyncStatus::Idle))
            .await;
        self.update_logged(id, RecordUpdate::LastError(None)).await;

        for change in &result.changes {
            self.activity.change(id, change);
        }
        if settings.log_level == LogLevel::Debug {
            self.activity.message(
                id,
                EntryLevel::Debug,
                format!("{} ({duration_ms}ms)", result.summary),
            );
        }

        if request.manual || should_toast(settings.toast, result) {
            self.notifier.notify(Notification {
                provider: Some(id.clone()),
                title: title(descriptor),
                message: result.summary.clone(),
                level: NotificationLevel::Info,
            });
        }

        let now = Utc::now();
        let lines = journal_lines(now, &result.changes, settings.journal);
        if !lines.is_empty() {
            if let Err(e) = self.journal.append(&journal_day(now), lines).await {
                warn!(provider = %id, error = %e, "journal append failed");
            }
        }

        info!(
            provider = %id,
            created = result.created,
            updated = result.updated,
            duration_ms,
            "sync finished: {}",
            result.summary
        );
    }

    async fn on_failure(&self, descriptor: &ProviderDescriptor, message: &str) {
        let id = &descriptor.id;
        warn!(provider = %id, error = %message, "sync failed");
        self.update_logged(id, RecordUpdate::Status(SyncStatus::Error))
            .await;
        self.update_logged(id, RecordUpdate::LastError(Some(message.to_string())))
            .await;
        self.activity
            .message(id, EntryLevel::Error, format!("ERROR: {message}"));
        self.notifier.notify(Notification {
            provider: Some(id.clone()),
            title: title(descriptor),
            message: format!("Sync failed: {message}"),
            level: NotificationLevel::Error,
        });
    }

    async fn settings(&self, id: &ProviderId) -> RunSettings {
        let record = match self.store.load(id).await {
            Ok(record) => record,
            Err(e) => {
                error!(provider = %id, error = %e, "failed to re-read record; using defaults");
                None
            }
        };
        match record {
            Some(r) => RunSettings {
                last_run: r.last_run,
                log_level: r.log_level,
                toast: r.toast,
                journal: r.journal,
            },
            None => RunSettings {
                last_run: None,
                log_level: LogLevel::default(),
                toast: ToastLevel::default(),
                journal: JournalLevel::default(),
            },
        }
    }

    async fn update_logged(&self, id: &ProviderId, update: RecordUpdate) {
        debug!(provider = %id, ?update, "record update");
        if let Err(e) = self.store.update(id, update).await {
            error!(provider = %id, error = %e, "record update failed");
        }
    }
}

fn title(descriptor: &ProviderDescriptor) -> String {
    if descriptor.name.is_empty() {
        descriptor.id.to_string()
    } else {
        descriptor.name.clone()
    }
}

fn lock_set(
    set: &Mutex<HashMap<ProviderId, String>>,
) -> MutexGuard<'_, HashMap<ProviderId, String>> {
    set.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Forget `run_id`, unless a newer run of the same provider took its place.
fn forget_run(in_flight: &InFlight, id: &ProviderId, run_id: &str) {
    let mut runs = lock_set(in_flight);
    if runs.get(id).is_some_and(|current| current == run_id) {
        runs.remove(id);
    }
}

async fn mark_interrupted(store: &dyn RecordStore, id: &ProviderId) {
    let updates = [
        RecordUpdate::Status(SyncStatus::Error),
        RecordUpdate::LastError(Some(INTERRUPTED.to_string())),
        RecordUpdate::SyncLock(None),
    ];
    for update in updates {
        if let Err(e) = store.update(id, update).await {
            error!(provider = %id, error = %e, "interrupted-run cleanup failed");
        }
    }
}

/// Clears the lock and the `syncing` status if a run is dropped before it
/// reaches its own cleanup.
///
/// The run stays in the in-flight map until that cleanup has written, so a
/// shutdown racing the spawned cleanup still resets the record.
struct RunGuard {
    store: Arc<dyn RecordStore>,
    in_flight: InFlight,
    id: ProviderId,
    run_id: String,
    armed: bool,
}

impl RunGuard {
    fn arm(
        store: Arc<dyn RecordStore>,
        in_flight: InFlight,
        id: ProviderId,
        run_id: String,
    ) -> Self {
        lock_set(&in_flight).insert(id.clone(), run_id.clone());
        Self {
            store,
            in_flight,
            id,
            run_id,
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
        forget_run(&self.in_flight, &self.id, &self.run_id);
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let id = self.id.clone();
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            error!(provider = %id, "run dropped outside a runtime; lock left for staleness recovery");
            return;
        };
        warn!(provider = %id, "run dropped before cleanup; resetting record");
        let store = Arc::clone(&self.store);
        let in_flight = Arc::clone(&self.in_flight);
        let run_id = std::mem::take(&mut self.run_id);
        runtime.spawn(async move {
            mark_interrupted(store.as_ref(), &id).await;
            forget_run(&in_flight, &id, &run_id);
        });
    }
}
