//! `relay init [--force]`

use anyhow::{Context, Result};
use clap::Args;

use relay_core::{config, RelayConfig};

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Overwrite an existing config.yaml with defaults.
    #[arg(long)]
    pub force: bool,
}

impl InitArgs {
    pub fn run(self) -> Result<()> {
        let home = super::home()?;
        let path = config::config_path_at(&home);
        if path.exists() && !self.force {
            println!("✓ Config already present: {}", path.display());
            println!("  Use --force to reset it to defaults.");
            return Ok(());
        }

        let defaults = RelayConfig::default();
        let path = config::save_at(&home, &defaults)
            .with_context(|| format!("failed to write {}", path.display()))?;

        println!("✓ Wrote default config: {}", path.display());
        println!("  Record store: {}", defaults.store_path(&home).display());
        println!("  Broker spool: {}", defaults.spool_dir(&home).display());
        Ok(())
    }
}
