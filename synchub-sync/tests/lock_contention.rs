use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinSet;

use synchub_core::{LockToken, ProviderId, ProviderRecord, SyncResult};
use synchub_sync::{
    provider_fn, EngineConfig, LockManager, MemoryJournal, MemoryStore, Orchestrator,
    ProviderDescriptor, RecordStore, RecordingNotifier,
};

fn seeded_store(latency: Duration, id: &ProviderId) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::with_latency(latency));
    store.put(ProviderRecord::new(id.clone(), None, "1m"));
    store
}

#[tokio::test(start_paused = true)]
async fn at_most_one_concurrent_acquirer_wins() {
    let id = ProviderId::from("github");
    let store = seeded_store(Duration::from_millis(10), &id);

    let mut attempts = JoinSet::new();
    for _ in 0..8 {
        let locks = LockManager::new(store.clone(), &EngineConfig::default());
        let id = id.clone();
        attempts.spawn(async move { locks.acquire(&id).await.expect("acquire") });
    }

    let mut winners = Vec::new();
    while let Some(joined) = attempts.join_next().await {
        if let Some(token) = joined.expect("join") {
            winners.push(token);
        }
    }
    assert_eq!(winners.len(), 1, "exactly one verified token: {winners:?}");

    let held = store.snapshot(&id).and_then(|r| r.sync_lock).expect("lock");
    assert_eq!(held, winners[0]);
}

#[tokio::test(start_paused = true)]
async fn stale_lock_is_taken_over_without_release() {
    let id = ProviderId::from("calendar");
    let store = seeded_store(Duration::ZERO, &id);
    let mut record = store.snapshot(&id).expect("record");
    record.sync_lock = Some(LockToken::new(
        Utc::now() - chrono::Duration::minutes(6),
        "crashed-instance",
    ));
    store.put(record);

    let locks = LockManager::new(store.clone(), &EngineConfig::default());
    let token = locks.acquire(&id).await.expect("acquire").expect("takeover");
    assert_ne!(token.sync_run_id, "crashed-instance");
}

#[tokio::test(start_paused = true)]
async fn lock_just_under_threshold_is_respected() {
    let id = ProviderId::from("calendar");
    let store = seeded_store(Duration::ZERO, &id);
    let mut record = store.snapshot(&id).expect("record");
    record.sync_lock = Some(LockToken::new(
        Utc::now() - chrono::Duration::minutes(4),
        "busy-instance",
    ));
    store.put(record);

    let locks = LockManager::new(store.clone(), &EngineConfig::default());
    assert!(locks.acquire(&id).await.expect("acquire").is_none());
}

#[tokio::test(start_paused = true)]
async fn record_vanishing_during_settle_fails_acquisition() {
    let id = ProviderId::from("contacts");
    let store = seeded_store(Duration::ZERO, &id);
    let locks = LockManager::new(store.clone(), &EngineConfig::default());

    let attempt = {
        let id = id.clone();
        tokio::spawn(async move { locks.acquire(&id).await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    store.remove(&id);

    assert!(attempt.await.expect("join").expect("acquire").is_none());
}

#[tokio::test(start_paused = true)]
async fn two_instances_ticking_together_run_provider_once() {
    let id = ProviderId::from("linear");
    let store: Arc<MemoryStore> = Arc::new(MemoryStore::with_latency(Duration::from_millis(10)));
    let calls = Arc::new(AtomicUsize::new(0));

    let mut instances = Vec::new();
    for _ in 0..2 {
        let hub = Orchestrator::new(
            store.clone(),
            Arc::new(RecordingNotifier::new()),
            Arc::new(MemoryJournal::new()),
            EngineConfig::default(),
        );
        let calls = calls.clone();
        hub.register(
            ProviderDescriptor::new(
                id.clone(),
                "Linear",
                provider_fn(move |_ctx| {
                    let calls = calls.clone();
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok(SyncResult::skipped("nothing new"))
                    }
                }),
            )
            .interval("1m"),
        )
        .await
        .expect("register");
        instances.push(Arc::new(hub));
    }

    let mut ticks = JoinSet::new();
    for hub in &instances {
        let hub = hub.clone();
        ticks.spawn(async move { hub.tick().await.expect("tick") });
    }
    let mut ran = 0;
    while let Some(report) = ticks.join_next().await {
        ran += report.expect("join").ran();
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(ran, 1);
    let record = store.load(&id).await.expect("load").expect("record");
    assert!(record.sync_lock.is_none());
    assert!(record.last_run.is_some());
}
