//! Sync Hub daemon: periodic scheduler, command providers and the control socket.

pub mod command_provider;
pub mod config;
mod error;
pub mod paths;
pub mod protocol;
mod runtime;

pub use command_provider::CommandProvider;
pub use config::{CommandProviderConfig, DaemonConfig};
pub use error::DaemonError;
pub use protocol::{
    request_providers, request_reset, request_status, request_stop, request_sync,
    request_sync_all, send_request, DaemonRequest, DaemonResponse,
};
pub use runtime::{init_tracing, run, run_hub, start_blocking, LOG_FORMAT_ENV};
