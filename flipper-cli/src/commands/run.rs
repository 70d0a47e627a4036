//! `flipper run` — the long-running controller.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use flipper_daemon::{resolve_inventory_path, start_blocking};

use super::{ConfigArgs, TransportArgs};

#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Inventory file with policies and workloads; watched for changes.
    #[arg(long)]
    pub inventory: Option<PathBuf>,

    #[command(flatten)]
    pub transport: TransportArgs,

    /// Emit logs as JSON lines.
    #[arg(long)]
    pub log_json: bool,
}

impl RunArgs {
    pub fn run(self) -> Result<()> {
        let config = self.config.load()?;
        let inventory = resolve_inventory_path(self.inventory);
        start_blocking(config, inventory, self.transport.transport(), self.log_json)
            .context("controller exited with error")
    }
}
