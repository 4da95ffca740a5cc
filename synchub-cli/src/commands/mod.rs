pub mod activity;
pub mod daemon;
pub mod providers;
pub mod reset;
pub mod status;
pub mod sync;

use std::path::PathBuf;

use anyhow::{Context, Result};

pub(crate) fn home_dir() -> Result<PathBuf> {
    synchub_core::records::home().context("could not determine home directory")
}
