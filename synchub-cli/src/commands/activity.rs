//! `synchub activity <provider>`: tail of the activity ledger.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use synchub_core::records::{load_activity_at, load_record_at};
use synchub_core::{ActivityEntry, ActivityKind, EntryLevel, ProviderId};

use super::home_dir;

#[derive(Args, Debug)]
pub struct ActivityArgs {
    /// Provider id.
    pub provider: String,

    /// Number of most recent entries to show.
    #[arg(long, default_value_t = 20)]
    pub limit: usize,
}

impl ActivityArgs {
    pub fn run(self) -> Result<()> {
        let home = home_dir()?;
        let id = ProviderId::from(self.provider.as_str());
        load_record_at(&home, &id)
            .with_context(|| format!("failed to read record for '{id}'"))?
            .with_context(|| format!("unknown provider '{id}'"))?;

        let entries = load_activity_at(&home, &id)
            .with_context(|| format!("failed to read activity for '{id}'"))?;
        if entries.is_empty() {
            println!("No activity recorded for '{id}'.");
            return Ok(());
        }

        let skip = entries.len().saturating_sub(self.limit);
        for entry in &entries[skip..] {
            println!("{}", render(entry));
        }
        Ok(())
    }
}

fn render(entry: &ActivityEntry) -> String {
    let line = entry.to_string();
    match &entry.kind {
        ActivityKind::Message {
            level: EntryLevel::Error,
            ..
        } => line.red().to_string(),
        ActivityKind::Message {
            level: EntryLevel::Debug,
            ..
        } => line.bright_black().to_string(),
        ActivityKind::Change { major: true, .. } => line.bold().to_string(),
        _ => line,
    }
}
