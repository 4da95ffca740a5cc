//! `synchub providers`: routines registered with the running daemon.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Deserialize;
use tabled::{settings::Style, Table, Tabled};

use synchub_daemon::request_providers;

use super::home_dir;

#[derive(Args, Debug)]
pub struct ProvidersArgs {
    /// Emit the daemon's JSON payload unchanged.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Deserialize)]
struct ProviderInfo {
    id: String,
    name: String,
    #[serde(default)]
    icon: String,
    default_interval: String,
    version: String,
    version_matches: bool,
}

#[derive(Tabled)]
struct ProviderTableRow {
    #[tabled(rename = "id")]
    id: String,
    #[tabled(rename = "name")]
    name: String,
    #[tabled(rename = "interval")]
    interval: String,
    #[tabled(rename = "version")]
    version: String,
}

impl ProvidersArgs {
    pub fn run(self) -> Result<()> {
        let home = home_dir()?;
        let payload = request_providers(&home).context("failed to list daemon providers")?;
        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&payload).context("failed to render providers JSON")?
            );
            return Ok(());
        }

        let providers: Vec<ProviderInfo> =
            serde_json::from_value(payload).context("unexpected providers payload")?;
        if providers.is_empty() {
            println!("No providers registered with the daemon.");
            return Ok(());
        }

        let rows: Vec<ProviderTableRow> = providers
            .into_iter()
            .map(|p| ProviderTableRow {
                name: if p.icon.is_empty() {
                    p.name
                } else {
                    format!("{} {}", p.icon, p.name)
                },
                id: p.id,
                interval: p.default_interval,
                version: if p.version_matches {
                    p.version
                } else {
                    format!("{} {}", p.version, "(mismatch)".yellow())
                },
            })
            .collect();
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");
        Ok(())
    }
}
