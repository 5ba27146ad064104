//! `meridian simulate`: evaluate an event without executing anything.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use crate::cli::commands::{build_runtime, print_json, read_event};

#[derive(Args)]
pub struct SimulateArgs {
    /// Event JSON file (`-` for stdin)
    #[arg(long)]
    pub file: PathBuf,
}

pub async fn execute(args: SimulateArgs, config_path: Option<PathBuf>, json: bool) -> Result<()> {
    let runtime = build_runtime(config_path.as_deref()).await?;
    let event = read_event(&args.file)?;

    let report = runtime.engine.simulate_event(event).await;
    if json {
        print_json(&report)?;
    } else {
        println!("{} rule(s) would execute", report.matched_rule_count);
        for rule in &report.rules {
            match &rule.skip_reason {
                None => println!("  {}  {}  -> would execute", rule.rule_id, rule.rule_name),
                Some(reason) => println!(
                    "  {}  {}  -> skipped: {}{}",
                    rule.rule_id,
                    rule.rule_name,
                    reason.as_str(),
                    rule.detail
                        .as_deref()
                        .map(|d| format!(" ({d})"))
                        .unwrap_or_default(),
                ),
            }
        }
    }
    Ok(())
}
