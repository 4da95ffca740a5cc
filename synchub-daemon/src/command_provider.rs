//! Providers implemented as external programs.
//!
//! The program receives its run parameters in the environment, may write
//! progress lines to stderr (each one becomes an activity entry) and must
//! print one `SyncResult` JSON document on stdout.

use std::collections::VecDeque;
use std::process::Stdio;
use std::sync::Arc;

use anyhow::{bail, Context};
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tracing::debug;

use synchub_core::SyncResult;
use synchub_sync::{ProviderDescriptor, SyncContext, SyncProvider};

use crate::config::CommandProviderConfig;

pub const ENV_PROVIDER_ID: &str = "SYNCHUB_PROVIDER_ID";
pub const ENV_LAST_RUN: &str = "SYNCHUB_LAST_RUN";
pub const ENV_FULL: &str = "SYNCHUB_FULL";

const STDERR_TAIL_LINES: usize = 5;

#[derive(Debug, Clone)]
pub struct CommandProvider {
    config: CommandProviderConfig,
}

impl CommandProvider {
    pub fn new(config: CommandProviderConfig) -> Self {
        Self { config }
    }

    pub fn descriptor(self) -> ProviderDescriptor {
        let config = self.config.clone();
        let mut descriptor = ProviderDescriptor::new(config.id.as_str(), config.name, Arc::new(self))
            .icon(config.icon)
            .interval(config.interval);
        if let Some(version) = config.version {
            descriptor = descriptor.version(version);
        }
        descriptor
    }
}

#[async_trait]
impl SyncProvider for CommandProvider {
    async fn sync(&self, ctx: SyncContext) -> anyhow::Result<SyncResult> {
        let program = &self.config.command;
        let last_run = ctx.last_run.map(|t| t.to_rfc3339()).unwrap_or_default();

        let mut child = Command::new(program)
            .args(&self.config.args)
            .envs(&self.config.env)
            .env(ENV_PROVIDER_ID, ctx.provider_id.as_str())
            .env(ENV_LAST_RUN, &last_run)
            .env(ENV_FULL, if ctx.full { "1" } else { "0" })
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("failed to start '{program}'"))?;
        debug!(provider = %ctx.provider_id, program = %program, "command provider started");

        let stderr = child.stderr.take().context("stderr not captured")?;
        let log_ctx = ctx.clone();
        let forward = tokio::spawn(async move {
            let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let line = line.trim_end().to_string();
                if line.is_empty() {
                    continue;
                }
                log_ctx.log(line.clone());
                if tail.len() == STDERR_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
            tail
        });

        let mut stdout = String::new();
        child
            .stdout
            .take()
            .context("stdout not captured")?
            .read_to_string(&mut stdout)
            .await
            .with_context(|| format!("failed to read output of '{program}'"))?;
        let status = child
            .wait()
            .await
            .with_context(|| format!("failed to wait for '{program}'"))?;
        let tail: Vec<String> = forward.await.map(Vec::from).unwrap_or_default();

        if !status.success() {
            if tail.is_empty() {
                bail!("'{program}' exited with {status}");
            }
            bail!("'{program}' exited with {status}: {}", tail.join(" | "));
        }

        serde_json::from_str(stdout.trim())
            .with_context(|| format!("'{program}' did not print a sync result"))
    }
}
