//! `relay sync`: start or stop a bulk synchronization run.
//!
//! With the daemon up the run is started (or stopped) there, so the
//! single-flight guard of the long-lived engine applies. Without it the
//! drain runs in this process and the final job snapshot is printed.

use anyhow::{bail, Context, Result};
use clap::Args;

use relay_daemon::{request_stop_sync, request_sync, DaemonError};
use relay_sync::{pipeline, SyncJob, TriggerError};

/// Arguments for `relay sync`.
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Ask the daemon's running bulk sync to stop.
    #[arg(long)]
    pub stop: bool,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl SyncArgs {
    pub fn run(self) -> Result<()> {
        let home = super::home()?;

        if self.stop {
            return match request_stop_sync(&home) {
                Ok(data) => {
                    if self.json {
                        print_json(&data)?;
                    } else if data["stopping"].as_bool().unwrap_or(false) {
                        println!("✓ Stop requested; the run ends after the current record");
                    } else {
                        println!("No bulk sync is running");
                    }
                    Ok(())
                }
                Err(DaemonError::DaemonNotRunning { .. }) => {
                    println!("daemon is not running; nothing to stop");
                    Ok(())
                }
                Err(err) => Err(err).context("failed to stop bulk sync"),
            };
        }

        match request_sync(&home) {
            Ok(data) => {
                if self.json {
                    print_json(&data)?;
                } else {
                    println!("✓ Bulk sync started in the daemon");
                    println!("  Follow it with 'relay status'.");
                }
                return Ok(());
            }
            Err(DaemonError::DaemonNotRunning { .. }) => {}
            Err(DaemonError::Protocol(message)) => bail!("bulk sync refused: {message}"),
            Err(err) => return Err(err).context("failed to reach daemon"),
        }

        let config = super::load_config(&home)?;
        let job = super::runtime()?
            .block_on(pipeline::run_once(&home, &config))
            .map_err(|err| match err {
                TriggerError::Disabled => anyhow::anyhow!("bulk sync refused: {err}"),
                other => anyhow::Error::new(other).context("bulk sync could not start"),
            })?;
        print_result(&job, self.json)
    }
}

fn print_result(job: &SyncJob, json: bool) -> Result<()> {
    if json {
        let data = serde_json::to_value(job).context("failed to serialize job JSON")?;
        print_json(&data)?;
    } else {
        super::status::print_job(job);
    }
    if job.status == relay_sync::SyncStatus::Failed {
        bail!("bulk sync failed: {}", job.message);
    }
    Ok(())
}

fn print_json(data: &serde_json::Value) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(data).context("failed to render JSON")?
    );
    Ok(())
}
