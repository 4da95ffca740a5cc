use std::path::{Path, PathBuf};

pub use synchub_core::records::synchub_root;

pub const DAEMON_SOCKET: &str = "daemon.sock";
pub const CONFIG_FILE: &str = "config.yaml";

pub fn socket_path(home: &Path) -> PathBuf {
    synchub_root(home).join(DAEMON_SOCKET)
}

pub fn config_path(home: &Path) -> PathBuf {
    synchub_root(home).join(CONFIG_FILE)
}
