//! `flipper check-config` — validate the config file.

use anyhow::Result;
use clap::Args;
use colored::Colorize;

use flipper_core::format_interval;

use super::ConfigArgs;

#[derive(Args, Debug)]
pub struct CheckConfigArgs {
    #[command(flatten)]
    pub config: ConfigArgs,
}

impl CheckConfigArgs {
    pub fn run(self) -> Result<()> {
        let config = self.config.load()?;
        let policy = config.policy();

        println!("{} {}", "config OK:".green().bold(), self.config.config.display());
        println!("policy:        {}", policy.name);
        println!("canonical key: {}", policy.canonical_key());
        println!("interval:      {}", format_interval(policy.interval));
        println!("trigger:       {}", config.trigger);
        println!("max in flight: {}", config.max_concurrent_patches);
        if let Some(ns) = &config.kube_namespace {
            println!("policy ns:     {ns}");
        }
        Ok(())
    }
}
