//! `relay status`: bulk sync job and record store visibility.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use serde_json::Value;
use tabled::{settings::Style, Table, Tabled};

use relay_core::{FileStore, RecordStore, RelayConfig};
use relay_daemon::{request_status, DaemonError};
use relay_sync::{SyncJob, SyncStatus};

/// Arguments for `relay status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl StatusArgs {
    pub fn run(self) -> Result<()> {
        let home = super::home()?;
        let config = super::load_config(&home)?;

        let daemon = match request_status(&home) {
            Ok(status) => Some(DaemonInfo::from_status(&status)?),
            Err(DaemonError::DaemonNotRunning { .. }) => None,
            Err(err) => return Err(err).context("failed to query daemon status"),
        };
        let store = StoreCounts::load(&home, &config)?;

        let report = StatusReport {
            daemon_running: daemon.is_some(),
            pid: daemon.as_ref().map(|d| d.pid),
            bulk_sync_enabled: daemon
                .as_ref()
                .map(|d| d.enabled)
                .unwrap_or(config.bulk_sync.enabled),
            job: daemon.map(|d| d.job),
            store,
        };

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&report).context("failed to serialize status JSON")?
            );
            return Ok(());
        }
        print_report(&report);
        Ok(())
    }
}

#[derive(Debug)]
struct DaemonInfo {
    pid: u64,
    enabled: bool,
    job: SyncJob,
}

impl DaemonInfo {
    fn from_status(status: &Value) -> Result<Self> {
        Ok(Self {
            pid: status["pid"].as_u64().unwrap_or_default(),
            enabled: status["bulk_sync_enabled"].as_bool().unwrap_or(true),
            job: serde_json::from_value(status["job"].clone())
                .context("daemon returned an unreadable job snapshot")?,
        })
    }
}

#[derive(Debug, Serialize)]
struct StoreCounts {
    path: String,
    records: usize,
    unsynced: usize,
}

impl StoreCounts {
    fn load(home: &Path, config: &RelayConfig) -> Result<Self> {
        let store = FileStore::open(config.store_path(home), config.store.batch_size);
        let records = super::runtime()?
            .block_on(store.list())
            .with_context(|| format!("failed to read {}", store.path().display()))?;
        Ok(Self {
            path: store.path().display().to_string(),
            unsynced: records.iter().filter(|r| !r.synced).count(),
            records: records.len(),
        })
    }
}

#[derive(Debug, Serialize)]
struct StatusReport {
    daemon_running: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pid: Option<u64>,
    bulk_sync_enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    job: Option<SyncJob>,
    store: StoreCounts,
}

fn print_report(report: &StatusReport) {
    let daemon = if report.daemon_running {
        format!("daemon running (pid {})", report.pid.unwrap_or_default())
            .green()
            .to_string()
    } else {
        "daemon not running".bright_black().to_string()
    };
    println!(
        "Relay v{} | {} | {} records | {} unsynced",
        env!("CARGO_PKG_VERSION"),
        daemon,
        report.store.records,
        report.store.unsynced,
    );
    if !report.bulk_sync_enabled {
        println!("{}", "bulk sync is disabled in configuration".yellow());
    }
    match &report.job {
        Some(job) => print_job(job),
        None if report.store.unsynced > 0 => {
            println!("Run 'relay sync' to send unsynced records now.")
        }
        None => {}
    }
}

#[derive(Tabled)]
struct JobRow {
    #[tabled(rename = "status")]
    status: String,
    #[tabled(rename = "running")]
    running: bool,
    #[tabled(rename = "processed")]
    processed: String,
    #[tabled(rename = "message")]
    message: String,
}

/// Render one job snapshot as a single-row table.
pub(crate) fn print_job(job: &SyncJob) {
    let mut table = Table::new([JobRow {
        status: status_label(job.status),
        running: job.running,
        processed: format!("{}/{}", job.processed, job.total),
        message: job.message.clone(),
    }]);
    table.with(Style::rounded());
    println!("{table}");
}

fn status_label(status: SyncStatus) -> String {
    let name = status.to_string();
    match status {
        SyncStatus::Completed => name.green().bold().to_string(),
        SyncStatus::Running | SyncStatus::Stopping => name.cyan().bold().to_string(),
        SyncStatus::Failed => name.red().bold().to_string(),
        SyncStatus::Stopped | SyncStatus::Disabled => name.yellow().bold().to_string(),
        SyncStatus::NotStarted | SyncStatus::NoData => name.bright_black().bold().to_string(),
    }
}
