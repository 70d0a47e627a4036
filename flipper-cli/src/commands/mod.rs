pub mod check_config;
pub mod matches;
pub mod once;
pub mod run;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;

use flipper_core::config::DEFAULT_CONFIG_PATH;
use flipper_core::ControllerConfig;
use flipper_patch::{DryRunTransport, KubectlTransport, PatchTransport};

/// `--config`, shared by every subcommand.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Controller config file.
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,
}

impl ConfigArgs {
    pub fn load(&self) -> Result<ControllerConfig> {
        ControllerConfig::load_at(&self.config)
            .with_context(|| format!("failed to load config from {}", self.config.display()))
    }
}

/// How patches leave the process.
#[derive(Args, Debug)]
pub struct TransportArgs {
    /// Log and record patches instead of sending them.
    #[arg(long)]
    pub dry_run: bool,

    /// kubectl binary used to send patches.
    #[arg(long, default_value = "kubectl")]
    pub kubectl: String,

    /// kubectl context to patch against.
    #[arg(long)]
    pub context: Option<String>,
}

impl TransportArgs {
    pub fn transport(&self) -> Arc<dyn PatchTransport> {
        if self.dry_run {
            return Arc::new(DryRunTransport::new());
        }
        let mut transport = KubectlTransport::new(&self.kubectl);
        if let Some(context) = &self.context {
            transport = transport.with_args(["--context".to_string(), context.clone()]);
        }
        Arc::new(transport)
    }
}

pub fn current_thread_runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")
}
