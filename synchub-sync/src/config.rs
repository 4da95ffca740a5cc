//! Engine tunables.

use std::time::Duration;

use synchub_core::interval::DEFAULT_INTERVAL_SPEC;

/// Timing knobs for one orchestrator instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Period of the scheduler's due-check.
    pub tick_interval: Duration,
    /// How long the executor waits for a provider routine.
    pub run_timeout: Duration,
    /// Age after which another instance's lock token is presumed abandoned.
    pub stale_after: Duration,
    /// Fixed part of the post-write settle delay during lock acquisition.
    pub settle_base: Duration,
    /// Upper bound of the random part of the settle delay.
    pub settle_jitter: Duration,
    /// Interval given to records created for descriptors that declare none.
    pub default_interval: String,
    /// How long a host waits for in-flight runs when stopping before it
    /// cancels them.
    pub shutdown_grace: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(30),
            run_timeout: Duration::from_secs(5 * 60),
            stale_after: Duration::from_secs(5 * 60),
            settle_base: Duration::from_millis(250),
            settle_jitter: Duration::from_millis(250),
            default_interval: DEFAULT_INTERVAL_SPEC.to_string(),
            shutdown_grace: Duration::from_secs(10),
        }
    }
}

impl EngineConfig {
    /// Failure message recorded when a run exceeds [`Self::run_timeout`].
    pub fn timeout_message(&self) -> String {
        let secs = self.run_timeout.as_secs();
        if secs >= 60 && secs % 60 == 0 {
            format!("Sync timeout ({} min)", secs / 60)
        } else if secs > 0 {
            format!("Sync timeout ({secs}s)")
        } else {
            format!("Sync timeout ({}ms)", self.run_timeout.as_millis())
        }
    }

    pub(crate) fn stale_threshold(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.stale_after).unwrap_or_else(|_| chrono::Duration::minutes(5))
    }
}
