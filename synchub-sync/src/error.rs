//! Error types for synchub-sync.

use thiserror::Error;

use synchub_core::error::RecordError;

/// All errors that can arise from orchestration calls.
///
/// Provider failures are not in here: they end up in the record's
/// `last_error` and in the returned [`crate::RunOutcome`].
#[derive(Debug, Error)]
pub enum SyncError {
    /// An error from the durable record store.
    #[error("record store error: {0}")]
    Record(#[from] RecordError),

    /// No durable record exists for the requested provider.
    #[error("unknown provider '{0}'")]
    UnknownProvider(String),

    /// A record exists but no routine is registered in this instance.
    #[error("provider '{0}' has no registered sync routine")]
    NotRegistered(String),

    /// Disabled providers are never run, not even on request.
    #[error("provider '{0}' is disabled")]
    Disabled(String),

    /// A descriptor failed validation at registration time.
    #[error("invalid provider descriptor: {0}")]
    InvalidDescriptor(String),

    /// A background task stopped accepting work.
    #[error("channel closed: {0}")]
    ChannelClosed(&'static str),

    /// A blocking store task panicked or was cancelled.
    #[error("store task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
