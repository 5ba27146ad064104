//! Command-line interface for the Meridian engine.

pub mod commands;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "meridian",
    version,
    about = "Automation rule engine for a multi-tenant messaging platform"
)]
pub struct Cli {
    /// Emit machine-readable JSON output
    #[arg(long, global = true)]
    pub json: bool,

    /// Path to a config file (defaults to .meridian/config.yaml hierarchy)
    #[arg(long, global = true)]
    pub config: Option<std::path::PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the engine against the configured database and event source
    Run(commands::run::RunArgs),
    /// Inspect and toggle automation rules
    Rules(commands::rules::RulesArgs),
    /// Evaluate an event against all candidate rules without executing
    Simulate(commands::simulate::SimulateArgs),
    /// Dry-run a single rule against an event
    TestRule(commands::test_rule::TestRuleArgs),
    /// Inspect execution history
    Executions(commands::executions::ExecutionsArgs),
}

/// Print a CLI error and exit non-zero.
pub fn handle_error(err: anyhow::Error, json: bool) -> ! {
    if json {
        let payload = serde_json::json!({ "error": err.to_string() });
        eprintln!("{payload}");
    } else {
        eprintln!("error: {err:#}");
    }
    std::process::exit(1);
}
