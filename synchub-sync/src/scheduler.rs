//! Periodic due-check.
//!
//! The scheduler has no timer of its own; the host calls [`Scheduler::tick`]
//! at `EngineConfig::tick_interval`. Each tick reads every record fresh and
//! hands the due ones to the executor concurrently.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{debug, error};

use synchub_core::{Interval, ProviderId, ProviderRecord};

use crate::error::SyncError;
use crate::executor::{Executor, RunOutcome, SyncRequest};
use crate::registry::Registry;
use crate::store::RecordStore;

/// Whether `record` should run on a scheduled tick at `now`.
///
/// Disabled, manual and currently syncing records are never due. A record
/// that has never run is always due. A `last_run` in the future (skewed
/// clock) is not due until the clock catches up.
pub fn is_due(record: &ProviderRecord, now: DateTime<Utc>) -> bool {
    if !record.enabled || record.is_syncing() {
        return false;
    }
    let Interval::Every(period) = record.interval() else {
        return false;
    };
    let Some(last_run) = record.last_run else {
        return true;
    };
    let Ok(period) = chrono::Duration::from_std(period) else {
        return false;
    };
    now.signed_duration_since(last_run) >= period
}

/// Due records among those with a registered routine, in record order.
pub fn due_providers(
    records: &[ProviderRecord],
    registered: &[ProviderId],
    now: DateTime<Utc>,
) -> Vec<ProviderId> {
    records
        .iter()
        .filter(|r| registered.contains(&r.plugin_id))
        .filter(|r| is_due(r, now))
        .map(|r| r.plugin_id.clone())
        .collect()
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TickReport {
    pub due: Vec<ProviderId>,
    pub outcomes: Vec<(ProviderId, RunOutcome)>,
}

impl TickReport {
    pub fn ran(&self) -> usize {
        self.outcomes.iter().filter(|(_, o)| !o.is_skipped()).count()
    }
}

#[derive(Clone)]
pub struct Scheduler {
    store: Arc<dyn RecordStore>,
    registry: Arc<Registry>,
    executor: Executor,
}

impl Scheduler {
    pub fn new(store: Arc<dyn RecordStore>, registry: Arc<Registry>, executor: Executor) -> Self {
        Self {
            store,
            registry,
            executor,
        }
    }

    /// One due-check. Resolves when every run it started has finished.
    pub async fn tick(&self) -> Result<TickReport, SyncError> {
        let records = self.store.list().await?;
        let due = due_providers(&records, &self.registry.ids(), Utc::now());
        debug!(checked = records.len(), due = due.len(), "scheduler tick");

        let mut runs = JoinSet::new();
        for id in &due {
            let Some(descriptor) = self.registry.get(id) else {
                continue;
            };
            let executor = self.executor.clone();
            runs.spawn(async move {
                let outcome = executor.run(&descriptor, SyncRequest::default()).await;
                (descriptor.id, outcome)
            });
        }

        let mut report = TickReport {
            due,
            outcomes: Vec::new(),
        };
        while let Some(joined) = runs.join_next().await {
            match joined {
                Ok((id, Ok(outcome))) => report.outcomes.push((id, outcome)),
                Ok((id, Err(e))) => error!(provider = %id, error = %e, "scheduled run could not start"),
                Err(e) => error!(error = %e, "scheduled run task failed"),
            }
        }
        report.outcomes.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(report)
    }
}
