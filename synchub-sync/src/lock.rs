//! Advisory cross-instance lock on a record's `sync_lock` field.
//!
//! The store has no compare-and-swap, so acquisition is optimistic: write a
//! fresh token, wait a jittered settle delay so concurrent writers land, then
//! re-read and keep the lock only if our token survived. Tokens older than
//! the staleness threshold are treated as abandoned and may be overwritten.
//!
//! Two acquirers can still both verify if a third write interleaves badly;
//! this residual window is accepted.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use tracing::debug;
use uuid::Uuid;

use synchub_core::{LockToken, ProviderId, RecordUpdate};

use crate::config::EngineConfig;
use crate::error::SyncError;
use crate::store::RecordStore;

#[derive(Clone)]
pub struct LockManager {
    store: Arc<dyn RecordStore>,
    stale_after: chrono::Duration,
    settle_base: Duration,
    settle_jitter: Duration,
}

impl LockManager {
    pub fn new(store: Arc<dyn RecordStore>, config: &EngineConfig) -> Self {
        Self {
            store,
            stale_after: config.stale_threshold(),
            settle_base: config.settle_base,
            settle_jitter: config.settle_jitter,
        }
    }

    /// Try to claim the provider. `Ok(None)` means someone else holds it (or
    /// the record is gone) and this attempt should be skipped quietly.
    pub async fn acquire(&self, id: &ProviderId) -> Result<Option<LockToken>, SyncError> {
        let Some(record) = self.store.load(id).await? else {
            debug!(provider = %id, "no record; lock not acquired");
            return Ok(None);
        };

        let now = Utc::now();
        if let Some(held) = &record.sync_lock {
            if !held.is_stale(now, self.stale_after) {
                debug!(
                    provider = %id,
                    holder = %held.sync_run_id,
                    age_ms = held.age(now).num_milliseconds(),
                    "lock held elsewhere; skipping"
                );
                return Ok(None);
            }
            debug!(provider = %id, holder = %held.sync_run_id, "taking over stale lock");
        }

        let token = LockToken::new(now, Uuid::new_v4().to_string());
        self.store
            .update(id, RecordUpdate::SyncLock(Some(token.clone())))
            .await?;

        tokio::time::sleep(self.settle_delay()).await;

        let current = self.store.load(id).await?.and_then(|r| r.sync_lock);
        match current {
            Some(current) if current.sync_run_id == token.sync_run_id => Ok(Some(token)),
            other => {
                debug!(
                    provider = %id,
                    run_id = %token.sync_run_id,
                    winner = other.as_ref().map(|t| t.sync_run_id.as_str()).unwrap_or("<none>"),
                    "lost lock race"
                );
                Ok(None)
            }
        }
    }

    /// Clear the lock field, whoever wrote it.
    pub async fn release(&self, id: &ProviderId) -> Result<(), SyncError> {
        self.store.update(id, RecordUpdate::SyncLock(None)).await
    }

    fn settle_delay(&self) -> Duration {
        let jitter_ms = u64::try_from(self.settle_jitter.as_millis()).unwrap_or(u64::MAX);
        let extra = if jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=jitter_ms)
        };
        self.settle_base + Duration::from_millis(extra)
    }
}

#[cfg(test)]
mod tests {
    use synchub_core::ProviderRecord;

    use super::*;
    use crate::store::MemoryStore;

    fn setup() -> (Arc<MemoryStore>, LockManager, ProviderId) {
        let store = Arc::new(MemoryStore::new());
        let id = ProviderId::from("linear");
        store.put(ProviderRecord::new(id.clone(), None, "5m"));
        let locks = LockManager::new(store.clone(), &EngineConfig::default());
        (store, locks, id)
    }

    #[tokio::test(start_paused = true)]
    async fn acquire_writes_token_and_release_clears_it() {
        let (store, locks, id) = setup();
        let token = locks.acquire(&id).await.expect("acquire").expect("token");
        assert_eq!(store.snapshot(&id).and_then(|r| r.sync_lock), Some(token));

        locks.release(&id).await.expect("release");
        assert!(store.snapshot(&id).and_then(|r| r.sync_lock).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn fresh_foreign_lock_blocks() {
        let (store, locks, id) = setup();
        let mut record = store.snapshot(&id).expect("record");
        record.sync_lock = Some(LockToken::new(Utc::now() - chrono::Duration::seconds(30), "other"));
        store.put(record);

        assert!(locks.acquire(&id).await.expect("acquire").is_none());
        let kept = store.snapshot(&id).and_then(|r| r.sync_lock).expect("lock");
        assert_eq!(kept.sync_run_id, "other");
    }

    #[tokio::test(start_paused = true)]
    async fn missing_record_is_not_acquired() {
        let (_store, locks, _id) = setup();
        assert!(locks
            .acquire(&ProviderId::from("ghost"))
            .await
            .expect("acquire")
            .is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn settle_delay_stays_within_bounds() {
        let (_store, locks, _id) = setup();
        for _ in 0..50 {
            let delay = locks.settle_delay();
            assert!(delay >= Duration::from_millis(250));
            assert!(delay <= Duration::from_millis(500));
        }
    }
}
