use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use synchub_core::{ProviderId, SyncStatus};
use synchub_daemon::{CommandProvider, CommandProviderConfig};
use synchub_sync::{
    EngineConfig, MemoryJournal, MemoryStore, Orchestrator, RecordingNotifier, SyncRequest,
};

fn script(id: &str, body: &str) -> CommandProviderConfig {
    CommandProviderConfig {
        id: id.to_string(),
        name: format!("{id} script"),
        icon: String::new(),
        interval: "manual".to_string(),
        version: None,
        command: "sh".to_string(),
        args: vec!["-c".to_string(), body.to_string()],
        env: BTreeMap::new(),
    }
}

async fn hub_with(config: CommandProviderConfig) -> (Orchestrator, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let hub = Orchestrator::new(
        store.clone(),
        Arc::new(RecordingNotifier::new()),
        Arc::new(MemoryJournal::new()),
        EngineConfig {
            settle_base: Duration::from_millis(1),
            settle_jitter: Duration::from_millis(1),
            ..EngineConfig::default()
        },
    );
    hub.register(CommandProvider::new(config).descriptor())
        .await
        .expect("register");
    (hub, store)
}

#[tokio::test]
async fn stdout_result_and_stderr_progress_are_recorded() {
    let (hub, store) = hub_with(script(
        "tasks",
        r#"echo "fetching tasks" >&2
echo '{"summary":"1 created","created":1,"changes":[{"verb":"created","title":"Write docs","guid":"t-1"}]}'"#,
    ))
    .await;

    let id = ProviderId::from("tasks");
    let outcome = hub
        .request_sync(&id, SyncRequest::manual())
        .await
        .expect("sync");
    assert!(outcome.is_success(), "{outcome:?}");
    assert_eq!(
        outcome.report().and_then(|r| r.result.as_ref()).map(|r| r.created),
        Some(1)
    );

    let lines: Vec<String> = hub
        .activity()
        .entries(&id)
        .await
        .expect("entries")
        .iter()
        .map(ToString::to_string)
        .collect();
    assert!(lines.iter().any(|l| l.ends_with("fetching tasks")), "{lines:?}");
    assert!(lines.iter().any(|l| l.contains("Write docs")), "{lines:?}");
    assert_eq!(store.snapshot(&id).expect("record").status, SyncStatus::Idle);
}

#[tokio::test]
async fn run_parameters_are_passed_in_the_environment() {
    let (hub, _store) = hub_with(script(
        "env",
        r#"printf '{"summary":"%s full=%s last=%s"}' "$SYNCHUB_PROVIDER_ID" "$SYNCHUB_FULL" "$SYNCHUB_LAST_RUN""#,
    ))
    .await;

    let outcome = hub
        .request_sync(&ProviderId::from("env"), SyncRequest::full())
        .await
        .expect("sync");
    let summary = outcome
        .report()
        .and_then(|r| r.result.as_ref())
        .map(|r| r.summary.clone());
    assert_eq!(summary.as_deref(), Some("env full=1 last="));
}

#[tokio::test]
async fn non_zero_exit_fails_with_stderr_tail() {
    let (hub, store) = hub_with(script("broken", "echo 'token expired' >&2; exit 3")).await;

    let id = ProviderId::from("broken");
    let outcome = hub
        .request_sync(&id, SyncRequest::manual())
        .await
        .expect("sync");
    assert!(!outcome.is_success());

    let record = store.snapshot(&id).expect("record");
    assert_eq!(record.status, SyncStatus::Error);
    let error = record.last_error.expect("last_error");
    assert!(error.contains("token expired"), "{error}");
}

#[tokio::test]
async fn unparseable_output_is_a_failure() {
    let (hub, store) = hub_with(script("chatty", "echo 'done!'")).await;

    let id = ProviderId::from("chatty");
    hub.request_sync(&id, SyncRequest::manual())
        .await
        .expect("sync");

    let error = store.snapshot(&id).expect("record").last_error.expect("last_error");
    assert!(error.contains("did not print a sync result"), "{error}");
}
