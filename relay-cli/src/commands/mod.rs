pub mod daemon;
pub mod init;
pub mod records;
pub mod status;
pub mod sync;

use std::path::PathBuf;

use anyhow::{Context, Result};

use relay_core::{config, RelayConfig};

pub(crate) fn home() -> Result<PathBuf> {
    dirs::home_dir().context("could not determine home directory")
}

pub(crate) fn load_config(home: &std::path::Path) -> Result<RelayConfig> {
    config::load_at(home).with_context(|| {
        format!(
            "failed to load {}",
            config::config_path_at(home).display()
        )
    })
}

/// Single-threaded runtime for commands that touch the store or broker.
pub(crate) fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")
}
