//! Flipper — policy-driven rollout trigger.
//!
//! # Usage
//!
//! ```text
//! flipper run [--config <path>] [--inventory <path>] [--dry-run] [--log-json]
//! flipper once [--config <path>] [--inventory <path>] [--dry-run] [--json]
//! flipper matches [--config <path>] --inventory <path> [--json]
//! flipper check-config [--config <path>]
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    check_config::CheckConfigArgs, matches::MatchesArgs, once::OnceArgs, run::RunArgs,
};

#[derive(Parser, Debug)]
#[command(
    name = "flipper",
    version,
    about = "Periodically restart the workloads matched by rollout policies",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the controller until interrupted.
    Run(RunArgs),

    /// Run a single match-and-patch pass and print its report.
    Once(OnceArgs),

    /// Show which workloads each policy currently matches.
    Matches(MatchesArgs),

    /// Validate the config file and show the policy it seeds.
    CheckConfig(CheckConfigArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Run(args) => args.run(),
        Commands::Once(args) => args.run(),
        Commands::Matches(args) => args.run(),
        Commands::CheckConfig(args) => args.run(),
    }
}
