//! `synchub status`: provider records straight from the store.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use synchub_core::records::list_records_at;
use synchub_core::time::format_relative_time;
use synchub_core::{ProviderRecord, SyncStatus};

use super::home_dir;

/// Arguments for `synchub status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl StatusArgs {
    pub fn run(self) -> Result<()> {
        let home = home_dir()?;
        let rows = build_rows(&home)?;
        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&rows).context("failed to serialize status JSON")?
            );
        } else {
            print_table(rows);
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct ProviderRow {
    id: String,
    name: String,
    enabled: bool,
    status: SyncStatus,
    interval: String,
    last_run: Option<String>,
    last_run_age: String,
    last_error: Option<String>,
    locked: bool,
    locked_since: Option<String>,
}

#[derive(Tabled)]
struct StatusTableRow {
    #[tabled(rename = "provider")]
    provider: String,
    #[tabled(rename = "enabled")]
    enabled: String,
    #[tabled(rename = "status")]
    status: String,
    #[tabled(rename = "interval")]
    interval: String,
    #[tabled(rename = "last run")]
    last_run: String,
    #[tabled(rename = "last error")]
    last_error: String,
}

fn build_rows(home: &Path) -> Result<Vec<ProviderRow>> {
    let now = Utc::now();
    let records = list_records_at(home).context("failed to read provider records")?;
    Ok(records
        .into_iter()
        .map(|record| row_for(record, now))
        .collect())
}

fn row_for(record: ProviderRecord, now: chrono::DateTime<Utc>) -> ProviderRow {
    ProviderRow {
        id: record.plugin_id.to_string(),
        name: record.display_name().to_string(),
        enabled: record.enabled,
        status: record.status,
        last_run: record.last_run.map(|t| t.to_rfc3339()),
        last_run_age: format_relative_time(now, record.last_run),
        locked: record.sync_lock.is_some(),
        locked_since: record
            .sync_lock
            .as_ref()
            .and_then(|lock| lock.written_at())
            .map(|t| t.to_rfc3339()),
        interval: record.interval,
        last_error: record.last_error,
    }
}

fn print_table(rows: Vec<ProviderRow>) {
    let errors = rows.iter().filter(|r| r.status == SyncStatus::Error).count();
    let syncing = rows.iter().filter(|r| r.status == SyncStatus::Syncing).count();
    println!(
        "Sync Hub v{} | {} providers | {} syncing | {} errors",
        env!("CARGO_PKG_VERSION"),
        rows.len(),
        syncing,
        errors,
    );

    if rows.is_empty() {
        println!("No providers registered.");
        return;
    }

    let table_rows: Vec<StatusTableRow> = rows
        .into_iter()
        .map(|row| StatusTableRow {
            provider: if row.name == row.id {
                row.id
            } else {
                format!("{} ({})", row.name, row.id)
            },
            enabled: if row.enabled { "yes" } else { "no" }.to_string(),
            status: status_label(row.status, row.locked),
            interval: row.interval,
            last_run: row.last_run_age,
            last_error: row.last_error.unwrap_or_default(),
        })
        .collect();
    let mut table = Table::new(table_rows);
    table.with(Style::rounded());
    println!("{table}");

    if syncing > 0 {
        println!("Run 'synchub reset' if a sync is stuck.");
    }
}

fn status_label(status: SyncStatus, locked: bool) -> String {
    let label = match status {
        SyncStatus::Idle => "■ idle".green().bold(),
        SyncStatus::Syncing => "■ syncing".yellow().bold(),
        SyncStatus::Error => "■ error".red().bold(),
    };
    if locked && status != SyncStatus::Syncing {
        format!("{label} (locked)")
    } else {
        label.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use synchub_core::ProviderId;

    #[test]
    fn row_uses_relative_age_and_display_name() {
        let now = Utc::now();
        let mut record = ProviderRecord::new(ProviderId::from("github"), Some("GitHub".into()), "15m");
        record.last_run = Some(now - Duration::minutes(7));
        record.last_error = Some("boom".into());

        let row = row_for(record, now);
        assert_eq!(row.name, "GitHub");
        assert_eq!(row.last_run_age, "7m ago");
        assert_eq!(row.interval, "15m");
        assert!(!row.locked);
        assert!(row.locked_since.is_none());
    }

    #[test]
    fn never_run_record_reads_never() {
        let row = row_for(ProviderRecord::new(ProviderId::from("x"), None, "5m"), Utc::now());
        assert_eq!(row.last_run_age, "never");
        assert_eq!(row.name, "x");
        assert!(row.last_run.is_none());
    }
}
