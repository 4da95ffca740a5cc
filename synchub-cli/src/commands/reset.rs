//! `synchub reset`: clear records left in the syncing state.
//!
//! Works on the store directly so it still helps when the daemon is wedged or
//! not running at all.

use anyhow::{Context, Result};

use synchub_sync::{reset_stuck_syncs, FileStore};

use super::home_dir;

pub fn run() -> Result<()> {
    let home = home_dir()?;
    let store = FileStore::new(&home);
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start runtime")?;
    let reset = runtime
        .block_on(reset_stuck_syncs(&store))
        .context("failed to reset stuck syncs")?;

    if reset > 0 {
        println!("Reset {reset} stuck sync(s)");
    } else {
        println!("No stuck syncs found");
    }
    Ok(())
}
