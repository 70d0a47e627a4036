//! `flipper matches` — the current match set, per policy.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use flipper_core::{format_interval, match_set};
use flipper_daemon::{Inventory, Stores};

use super::{current_thread_runtime, ConfigArgs};

#[derive(Args, Debug)]
pub struct MatchesArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Inventory file with policies and workloads.
    #[arg(long)]
    pub inventory: PathBuf,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Clone, Serialize, Tabled)]
struct MatchRow {
    #[tabled(rename = "policy")]
    policy: String,
    #[tabled(rename = "key")]
    key: String,
    #[tabled(rename = "interval")]
    interval: String,
    #[tabled(rename = "workload")]
    workload: String,
}

impl MatchesArgs {
    pub fn run(self) -> Result<()> {
        let config = self.config.load()?;
        let inventory = Inventory::load_at(&self.inventory).with_context(|| {
            format!("failed to load inventory from {}", self.inventory.display())
        })?;

        let stores = Stores::seed(&config, &inventory);
        let (policies, workloads) = current_thread_runtime()?.block_on(async {
            (stores.policies.snapshot().await, stores.workloads.snapshot().await)
        });

        let mut rows = Vec::new();
        let mut idle = Vec::new();
        for policy in &policies {
            let matched = match_set(policy, &workloads);
            if matched.is_empty() {
                idle.push(policy.name.to_string());
            }
            rows.extend(matched.into_iter().map(|workload| MatchRow {
                policy: policy.name.to_string(),
                key: policy.canonical_key().to_string(),
                interval: format_interval(policy.interval),
                workload: workload.key().to_string(),
            }));
        }

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&rows).context("failed to serialize match set")?
            );
            return Ok(());
        }

        println!(
            "{} policies | {} workloads | {} matches",
            policies.len(),
            workloads.len(),
            rows.len()
        );
        if !rows.is_empty() {
            let mut table = Table::new(rows);
            table.with(Style::rounded());
            println!("{table}");
        }
        for name in idle {
            println!("{} policy '{name}' matches no workloads", "note:".yellow());
        }
        Ok(())
    }
}
