//! Ordered activity ledger writer.
//!
//! Appends are queued on a single consumer task so entries land in the store
//! in the order they were issued, even though each store write suspends.
//! Callers never wait on an append; [`ActivityLog::flush`] waits for
//! everything queued so far.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tracing::warn;

use synchub_core::{ActivityEntry, Change, EntryLevel, ProviderId};

use crate::error::SyncError;
use crate::store::RecordStore;

enum Op {
    Append(ProviderId, ActivityEntry),
    Flush(oneshot::Sender<()>),
}

/// Cloneable handle to the per-instance activity queue.
#[derive(Clone)]
pub struct ActivityLog {
    tx: mpsc::UnboundedSender<Op>,
    store: Arc<dyn RecordStore>,
}

impl ActivityLog {
    /// Start the consumer task. Must be called from within a tokio runtime.
    ///
    /// The task exits once every handle has been dropped.
    pub fn spawn(store: Arc<dyn RecordStore>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Op>();
        let writer = Arc::clone(&store);
        tokio::spawn(async move {
            while let Some(op) = rx.recv().await {
                match op {
                    Op::Append(id, entry) => {
                        if let Err(e) = writer.append_activity(&id, entry).await {
                            warn!(provider = %id, error = %e, "failed to append activity entry");
                        }
                    }
                    Op::Flush(done) => {
                        let _ = done.send(());
                    }
                }
            }
        });
        Self { tx, store }
    }

    pub fn append(&self, id: &ProviderId, entry: ActivityEntry) {
        if self.tx.send(Op::Append(id.clone(), entry)).is_err() {
            warn!(provider = %id, "activity queue closed; entry dropped");
        }
    }

    pub fn message(&self, id: &ProviderId, level: EntryLevel, message: impl Into<String>) {
        self.append(id, ActivityEntry::message(Utc::now(), level, message));
    }

    pub fn change(&self, id: &ProviderId, change: &Change) {
        self.append(id, ActivityEntry::change(Utc::now(), change));
    }

    /// Resolves once every entry queued before this call has been written.
    pub async fn flush(&self) -> Result<(), SyncError> {
        let (done, wait) = oneshot::channel();
        self.tx
            .send(Op::Flush(done))
            .map_err(|_| SyncError::ChannelClosed("activity"))?;
        wait.await.map_err(|_| SyncError::ChannelClosed("activity"))
    }

    /// Flushed read of a provider's ledger, oldest first.
    pub async fn entries(&self, id: &ProviderId) -> Result<Vec<ActivityEntry>, SyncError> {
        self.flush().await?;
        self.store.activity(id).await
    }
}

impl std::fmt::Debug for ActivityLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivityLog").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test(start_paused = true)]
    async fn entries_keep_issue_order_despite_store_latency() {
        let store = Arc::new(MemoryStore::with_latency(Duration::from_millis(10)));
        let log = ActivityLog::spawn(store.clone());
        let id = ProviderId::from("todoist");
        for n in 0..5 {
            log.message(&id, EntryLevel::Info, format!("entry {n}"));
        }
        let entries = log.entries(&id).await.expect("entries");
        let lines: Vec<String> = entries.iter().map(|e| e.to_string()).collect();
        assert_eq!(lines.len(), 5);
        for (n, line) in lines.iter().enumerate() {
            assert!(line.ends_with(&format!("entry {n}")), "{line}");
        }
    }

    #[tokio::test]
    async fn flush_on_empty_queue_resolves() {
        let log = ActivityLog::spawn(Arc::new(MemoryStore::new()));
        log.flush().await.expect("flush");
    }
}
