use std::fs;
use std::io::ErrorKind;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast;
use tokio::task::JoinSet;

use synchub_core::{ProviderId, SyncStatus};
use synchub_sync::{FileJournal, FileStore, Orchestrator, SyncRequest, TracingNotifier};

use crate::command_provider::CommandProvider;
use crate::config::DaemonConfig;
use crate::error::{io_err, DaemonError};
use crate::paths::{socket_path, synchub_root};
use crate::protocol::{DaemonRequest, DaemonResponse};

/// Start the daemon runtime and block the current thread until it exits.
pub fn start_blocking(home: &Path) -> Result<(), DaemonError> {
    init_tracing();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(home.to_path_buf()))
}

/// Build an orchestrator from `config.yaml` over the file store and run it.
pub async fn run(home: PathBuf) -> Result<(), DaemonError> {
    ensure_runtime_dirs(&home)?;
    let config = DaemonConfig::load_at(&home)?;

    let hub = Arc::new(Orchestrator::new(
        Arc::new(FileStore::new(&home)),
        Arc::new(TracingNotifier),
        Arc::new(FileJournal::new(&home)),
        config.engine(),
    ));

    for provider in config.providers {
        let id = provider.id.clone();
        match hub.register(CommandProvider::new(provider).descriptor()).await {
            Ok(created) => tracing::info!(provider = %id, created, "registered command provider"),
            Err(err) => tracing::error!(provider = %id, error = %err, "skipping provider"),
        }
    }

    run_hub(home, hub).await
}

/// Serve an already-populated orchestrator until `stop` or ctrl-c.
pub async fn run_hub(home: PathBuf, hub: Arc<Orchestrator>) -> Result<(), DaemonError> {
    ensure_runtime_dirs(&home)?;
    let started_at_unix = unix_seconds_now();
    let (shutdown_tx, _) = broadcast::channel::<()>(16);

    let scheduler_handle = {
        let shutdown = shutdown_tx.clone();
        let hub = hub.clone();
        tokio::spawn(async move {
            let result = scheduler_task(hub, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let socket_handle = {
        let shutdown = shutdown_tx.clone();
        let home = home.clone();
        let hub = hub.clone();
        tokio::spawn(async move {
            let result = socket_server_task(
                home,
                hub,
                shutdown.clone(),
                shutdown.subscribe(),
                started_at_unix,
            )
            .await;
            let _ = shutdown.send(());
            result
        })
    };

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            let mut shutdown_rx = shutdown.subscribe();
            tokio::select! {
                _ = shutdown_rx.recv() => Ok(()),
                signal = tokio::signal::ctrl_c() => {
                    match signal {
                        Ok(()) => {
                            tracing::info!("received ctrl-c, shutting down daemon");
                            let _ = shutdown.send(());
                            Ok(())
                        }
                        Err(err) => Err(DaemonError::Protocol(format!("ctrl-c handler failed: {err}"))),
                    }
                }
            }
        })
    };

    let (scheduler_result, socket_result, signal_result) =
        tokio::join!(scheduler_handle, socket_handle, signal_handle);

    hub.shutdown().await?;
    handle_join("scheduler", scheduler_result)?;
    handle_join("socket_server", socket_result)?;
    handle_join("signal_handler", signal_result)?;
    Ok(())
}

/// Fires a due-check every tick interval. Each tick runs in its own task so a
/// slow provider never delays the next check.
///
/// On shutdown, ticks still running get `shutdown_grace` to finish and are
/// then cancelled. Either way they are gone before this returns, so their run
/// guards fire while the runtime is still alive.
async fn scheduler_task(
    hub: Arc<Orchestrator>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let mut interval = tokio::time::interval(hub.config().tick_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut ticks = JoinSet::new();

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = interval.tick() => {
                let hub = hub.clone();
                ticks.spawn(async move {
                    match hub.tick().await {
                        Ok(report) if !report.due.is_empty() => tracing::info!(
                            due = report.due.len(),
                            ran = report.ran(),
                            "scheduler tick completed",
                        ),
                        Ok(_) => {}
                        Err(err) => tracing::error!(error = %err, "scheduler tick failed"),
                    }
                });
            }
            Some(joined) = ticks.join_next(), if !ticks.is_empty() => log_tick_join(joined),
        }
    }

    drain_ticks(&mut ticks, hub.config().shutdown_grace).await;
    Ok(())
}

async fn drain_ticks(ticks: &mut JoinSet<()>, grace: Duration) {
    if ticks.is_empty() {
        return;
    }
    tracing::info!(in_flight = ticks.len(), "waiting for scheduled syncs to finish");
    let finished = tokio::time::timeout(grace, async {
        while let Some(joined) = ticks.join_next().await {
            log_tick_join(joined);
        }
    })
    .await;
    if finished.is_err() {
        tracing::warn!(in_flight = ticks.len(), "cancelling scheduled syncs still running");
        ticks.abort_all();
        while let Some(joined) = ticks.join_next().await {
            log_tick_join(joined);
        }
    }
}

fn log_tick_join(joined: Result<(), tokio::task::JoinError>) {
    match joined {
        Ok(()) => {}
        Err(err) if err.is_cancelled() => {}
        Err(err) => tracing::error!(error = %err, "scheduler tick task failed"),
    }
}

async fn socket_server_task(
    home: PathBuf,
    hub: Arc<Orchestrator>,
    shutdown_tx: broadcast::Sender<()>,
    mut shutdown_rx: broadcast::Receiver<()>,
    started_at_unix: u64,
) -> Result<(), DaemonError> {
    let socket = socket_path(&home);
    prepare_socket_for_bind(&socket)?;

    let listener = UnixListener::bind(&socket).map_err(|e| io_err(&socket, e))?;
    set_socket_permissions(&socket)?;
    tracing::info!(socket = %socket.display(), "daemon listening");

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            accepted = listener.accept() => {
                let (stream, _) = accepted.map_err(|e| io_err(&socket, e))?;
                let home = home.clone();
                let hub = hub.clone();
                let shutdown_tx = shutdown_tx.clone();
                tokio::spawn(async move {
                    if let Err(err) = handle_socket_client(
                        stream,
                        home,
                        hub,
                        shutdown_tx,
                        started_at_unix,
                    ).await {
                        tracing::error!(error = %err, "socket client error");
                    }
                });
            }
        }
    }

    if socket.exists() {
        let _ = fs::remove_file(&socket);
    }
    Ok(())
}

async fn handle_socket_client(
    stream: UnixStream,
    home: PathBuf,
    hub: Arc<Orchestrator>,
    shutdown_tx: broadcast::Sender<()>,
    started_at_unix: u64,
) -> Result<(), DaemonError> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| io_err("daemon socket read", e))?
    {
        if line.trim().is_empty() {
            continue;
        }

        let request: DaemonRequest = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(err) => {
                write_response(
                    &mut writer,
                    &DaemonResponse::error(format!("invalid request JSON: {err}")),
                )
                .await?;
                continue;
            }
        };

        let stopping = request.cmd == "stop";
        let response = dispatch(&home, &hub, started_at_unix, request).await;
        write_response(&mut writer, &response).await?;
        if stopping {
            // Reply first: shutdown tears down the runtime this task lives on.
            let _ = shutdown_tx.send(());
            break;
        }
    }

    Ok(())
}

async fn dispatch(
    home: &Path,
    hub: &Orchestrator,
    started_at_unix: u64,
    request: DaemonRequest,
) -> DaemonResponse {
    let result = match request.cmd.as_str() {
        "status" => build_status_payload(home, hub, started_at_unix).await,
        "providers" => serde_json::to_value(hub.providers()).map_err(DaemonError::from),
        "sync" => match request.provider {
            Some(provider) => {
                let sync_request = SyncRequest {
                    full: request.full,
                    manual: request.manual.unwrap_or(true),
                };
                match hub
                    .request_sync(&ProviderId::from(provider), sync_request)
                    .await
                {
                    Ok(outcome) => serde_json::to_value(outcome).map_err(DaemonError::from),
                    Err(err) => Err(err.into()),
                }
            }
            None => Err(DaemonError::Protocol(
                "'sync' requires a provider; use 'sync_all' for every provider".to_string(),
            )),
        },
        "sync_all" => match hub.sync_all().await {
            Ok(outcomes) => serde_json::to_value(outcomes).map_err(DaemonError::from),
            Err(err) => Err(err.into()),
        },
        "reset" => hub
            .reset_stuck_syncs()
            .await
            .map(|reset| json!({ "reset": reset }))
            .map_err(DaemonError::from),
        "stop" => Ok(json!({ "stopping": true })),
        other => Err(DaemonError::Protocol(format!("unknown command '{other}'"))),
    };

    match result {
        Ok(data) => DaemonResponse::ok(data),
        Err(err) => DaemonResponse::error(err.to_string()),
    }
}

async fn build_status_payload(
    home: &Path,
    hub: &Orchestrator,
    started_at_unix: u64,
) -> Result<Value, DaemonError> {
    let providers = hub.statuses().await?;
    let syncing = providers.iter().filter(|p| p.status == SyncStatus::Syncing).count();
    Ok(json!({
        "running": true,
        "pid": std::process::id(),
        "started_at_unix": started_at_unix,
        "tick_secs": hub.config().tick_interval.as_secs(),
        "syncing": syncing,
        "providers": providers,
        "registered": hub.providers().len(),
        "socket": socket_path(home).display().to_string(),
        "root": synchub_root(home).display().to_string(),
    }))
}

fn prepare_socket_for_bind(socket: &Path) -> Result<(), DaemonError> {
    if !socket.exists() {
        return Ok(());
    }

    match StdUnixStream::connect(socket) {
        Ok(_) => {
            return Err(DaemonError::Protocol(format!(
                "daemon socket already in use: {}",
                socket.display()
            )));
        }
        Err(err) => {
            tracing::warn!(
                socket = %socket.display(),
                error = %err,
                "removing stale daemon socket before bind",
            );
        }
    }

    match fs::remove_file(socket) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(io_err(socket, err)),
    }
}

fn ensure_runtime_dirs(home: &Path) -> Result<(), DaemonError> {
    let root = synchub_root(home);
    if !root.exists() {
        fs::create_dir_all(&root).map_err(|e| io_err(&root, e))?;
        set_dir_permissions(&root)?;
    }
    Ok(())
}

async fn write_response(
    writer: &mut OwnedWriteHalf,
    response: &DaemonResponse,
) -> Result<(), DaemonError> {
    let payload = serde_json::to_string(response)?;
    writer
        .write_all(payload.as_bytes())
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .write_all(b"\n")
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .flush()
        .await
        .map_err(|e| io_err("daemon socket flush", e))?;
    Ok(())
}

fn handle_join(
    task: &str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Protocol(format!(
            "{task} task join failure: {err}"
        ))),
    }
}

fn unix_seconds_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs()
}

/// Log format selector; anything other than `json` means human-readable lines.
pub const LOG_FORMAT_ENV: &str = "SYNCHUB_LOG_FORMAT";

/// `RUST_LOG` wins; otherwise `info`.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var(LOG_FORMAT_ENV).is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    let _ = if json {
        fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(false)
            .try_init()
    } else {
        fmt().with_env_filter(filter).with_target(false).try_init()
    };
}

#[cfg(unix)]
fn set_socket_permissions(path: &Path) -> Result<(), DaemonError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
fn set_socket_permissions(_path: &Path) -> Result<(), DaemonError> {
    Ok(())
}

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), DaemonError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o700)).map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), DaemonError> {
    Ok(())
}
