//! `synchub sync`: ask the running daemon to sync now.

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;
use serde_json::Value;

use synchub_daemon::{request_sync, request_sync_all, DaemonError};

use super::home_dir;

/// Arguments for `synchub sync`.
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Provider to sync (omit when using `--all`).
    pub provider: Option<String>,

    /// Sync every enabled provider, one after another.
    #[arg(long, conflicts_with_all = ["provider", "full"])]
    pub all: bool,

    /// Forget the last run time so the provider re-reads everything.
    #[arg(long)]
    pub full: bool,
}

impl SyncArgs {
    pub fn run(self) -> Result<()> {
        let home = home_dir()?;

        if self.all {
            let outcomes = request_sync_all(&home).map_err(not_running_hint)?;
            let outcomes = outcomes.as_array().cloned().unwrap_or_default();
            if outcomes.is_empty() {
                println!("No syncs enabled");
            }
            for pair in outcomes {
                let provider = pair.get(0).and_then(Value::as_str).unwrap_or("?");
                print_outcome(provider, pair.get(1).unwrap_or(&Value::Null));
            }
            return Ok(());
        }

        let Some(provider) = self.provider else {
            bail!("provide a provider id or use --all");
        };
        let outcome = request_sync(&home, &provider, self.full)
            .map_err(not_running_hint)
            .with_context(|| format!("sync failed for '{provider}'"))?;
        print_outcome(&provider, &outcome);
        Ok(())
    }
}

fn not_running_hint(err: DaemonError) -> anyhow::Error {
    match err {
        DaemonError::DaemonNotRunning { .. } => {
            anyhow::Error::new(err).context("start it with `synchub daemon start`")
        }
        other => other.into(),
    }
}

fn print_outcome(provider: &str, outcome: &Value) {
    let report = &outcome["report"];
    match outcome["outcome"].as_str() {
        Some("succeeded") => {
            let summary = report["result"]["summary"].as_str().unwrap_or_default();
            let ms = report["duration_ms"].as_u64().unwrap_or_default();
            println!("{} '{provider}' {summary} ({ms}ms)", "✓".green().bold());
        }
        Some("failed") => {
            let error = report["error"].as_str().unwrap_or("unknown error");
            println!("{} '{provider}' {error}", "✗".red().bold());
        }
        Some("skipped") => {
            println!("{} '{provider}' already syncing elsewhere", "·".bright_black());
        }
        _ => println!("'{provider}': {outcome}"),
    }
}
