//! `~/.synchub/config.yaml`
//!
//! ```yaml
//! tick_secs: 30
//! timeout_secs: 300
//! shutdown_grace_secs: 10
//! providers:
//!   - id: github
//!     name: GitHub
//!     interval: 15m
//!     command: /usr/local/bin/github-sync
//!     args: ["--org", "acme"]
//!     env:
//!       GITHUB_TOKEN_FILE: /run/secrets/gh
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use synchub_sync::EngineConfig;

use crate::error::{io_err, DaemonError};
use crate::paths::config_path;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub tick_secs: Option<u64>,
    pub timeout_secs: Option<u64>,
    pub stale_lock_secs: Option<u64>,
    pub settle_ms: Option<u64>,
    pub settle_jitter_ms: Option<u64>,
    pub shutdown_grace_secs: Option<u64>,
    pub default_interval: Option<String>,
    pub providers: Vec<CommandProviderConfig>,
}

/// An external program that speaks the provider protocol on stdout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandProviderConfig {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub interval: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl DaemonConfig {
    /// Missing file means defaults and no providers.
    pub fn load_at(home: &Path) -> Result<Self, DaemonError> {
        let path = config_path(home);
        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(err) => return Err(io_err(&path, err)),
        };
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&contents).map_err(|source| DaemonError::Config { path, source })
    }

    pub fn engine(&self) -> EngineConfig {
        let mut engine = EngineConfig::default();
        if let Some(secs) = self.tick_secs.filter(|s| *s > 0) {
            engine.tick_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = self.timeout_secs.filter(|s| *s > 0) {
            engine.run_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = self.stale_lock_secs.filter(|s| *s > 0) {
            engine.stale_after = Duration::from_secs(secs);
        }
        if let Some(ms) = self.settle_ms {
            engine.settle_base = Duration::from_millis(ms);
        }
        if let Some(ms) = self.settle_jitter_ms {
            engine.settle_jitter = Duration::from_millis(ms);
        }
        if let Some(secs) = self.shutdown_grace_secs {
            engine.shutdown_grace = Duration::from_secs(secs);
        }
        if let Some(spec) = self.default_interval.as_ref().filter(|s| !s.trim().is_empty()) {
            engine.default_interval = spec.clone();
        }
        engine
    }
}
