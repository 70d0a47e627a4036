//! `flipper once` — one match-and-patch pass.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;

use flipper_daemon::{init_tracing, load_inventory, resolve_inventory_path, run_once, TickReport};

use super::{current_thread_runtime, ConfigArgs, TransportArgs};

#[derive(Args, Debug)]
pub struct OnceArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Inventory file with policies and workloads.
    #[arg(long)]
    pub inventory: Option<PathBuf>,

    #[command(flatten)]
    pub transport: TransportArgs,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct TickReportJson {
    due_policies: Vec<String>,
    matched: Vec<String>,
    patched: usize,
    failed: usize,
    errors: Vec<String>,
}

impl From<&TickReport> for TickReportJson {
    fn from(report: &TickReport) -> Self {
        Self {
            due_policies: report.due_policies.iter().map(ToString::to_string).collect(),
            matched: report.matched.iter().map(ToString::to_string).collect(),
            patched: report.patched,
            failed: report.failed(),
            errors: report
                .errors
                .as_ref()
                .map(|errors| errors.fragments())
                .unwrap_or_default(),
        }
    }
}

impl OnceArgs {
    pub fn run(self) -> Result<()> {
        init_tracing(false);
        let config = self.config.load()?;
        let inventory_path = resolve_inventory_path(self.inventory);
        let inventory = load_inventory(inventory_path.as_deref()).with_context(|| {
            match &inventory_path {
                Some(path) => format!("failed to load inventory from {}", path.display()),
                None => "failed to load inventory".to_string(),
            }
        })?;

        let transport = self.transport.transport();
        let report = current_thread_runtime()?.block_on(run_once(&config, &inventory, transport));

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&TickReportJson::from(&report))
                    .context("failed to serialize tick report")?
            );
        } else {
            print_report(&report);
        }

        if let Some(errors) = &report.errors {
            bail!("{} of {} restart patches failed", errors.len(), report.matched.len());
        }
        Ok(())
    }
}

fn print_report(report: &TickReport) {
    let due: Vec<String> = report.due_policies.iter().map(ToString::to_string).collect();
    println!("due policies: {}", if due.is_empty() { "-".to_string() } else { due.join(", ") });
    println!("matched:      {}", report.matched.len());
    for key in &report.matched {
        println!("  {key}");
    }
    println!("patched:      {}", report.patched.to_string().green());

    match &report.errors {
        None => println!("failed:       0"),
        Some(errors) => {
            println!("failed:       {}", errors.len().to_string().red().bold());
            for line in errors.render().lines() {
                eprintln!("{} {line}", "error:".red());
            }
        }
    }
}
