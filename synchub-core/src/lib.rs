//! Sync Hub core library: domain types, record persistence, errors.
//!
//! - [`types`]: provider records, lock tokens, activity entries, sync results
//! - [`interval`]: `manual` / `<N>[s|m|h|d]` interval specs
//! - [`records`]: file-backed records and ledgers (`_at` pattern)
//! - [`time`]: relative ages and journal day keys
//! - [`error`]: [`RecordError`]

pub mod error;
pub mod interval;
pub mod records;
pub mod time;
pub mod types;

pub use error::RecordError;
pub use interval::{parse_interval_ms, Interval};
pub use types::{
    ActivityEntry, ActivityKind, Change, EntryLevel, JournalLevel, LockToken, LogLevel,
    ProviderId, ProviderRecord, RecordUpdate, SyncResult, SyncStatus, ToastLevel,
};
