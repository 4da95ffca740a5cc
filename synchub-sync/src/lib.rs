//! # synchub-sync
//!
//! Sync orchestration engine: registry, advisory lock, scheduler, executor
//! and activity ledger over a shared [`RecordStore`].
//!
//! Build one [`Orchestrator`] per client instance, register providers, then
//! call [`Orchestrator::tick`] periodically or [`Orchestrator::request_sync`]
//! on demand.

pub mod activity;
pub mod config;
pub mod error;
pub mod executor;
pub mod lock;
pub mod notify;
pub mod orchestrator;
pub mod provider;
pub mod registry;
pub mod scheduler;
pub mod store;

pub use activity::ActivityLog;
pub use config::EngineConfig;
pub use error::SyncError;
pub use executor::{Executor, RunOutcome, RunReport, SkipReason, SyncRequest};
pub use lock::LockManager;
pub use notify::{
    FileJournal, JournalSink, MemoryJournal, Notification, NotificationLevel, Notifier,
    RecordingNotifier, TracingNotifier,
};
pub use orchestrator::{reset_stuck_syncs, Orchestrator, ProviderStatus};
pub use provider::{provider_fn, SyncContext, SyncProvider, Workspace};
pub use registry::{ProviderDescriptor, ProviderInfo, Registry, HOST_VERSION};
pub use scheduler::{due_providers, is_due, Scheduler, TickReport};
pub use store::{FileStore, MemoryStore, RecordStore};
