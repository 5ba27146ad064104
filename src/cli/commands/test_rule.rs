//! `meridian test-rule`: dry-run one rule against an event.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use uuid::Uuid;

use crate::cli::commands::{build_runtime, print_json, read_event};

#[derive(Args)]
pub struct TestRuleArgs {
    /// Rule to test
    pub id: Uuid,

    /// Event JSON file (`-` for stdin)
    #[arg(long)]
    pub file: PathBuf,
}

pub async fn execute(args: TestRuleArgs, config_path: Option<PathBuf>, json: bool) -> Result<()> {
    let runtime = build_runtime(config_path.as_deref()).await?;
    let event = read_event(&args.file)?;

    let outcome = runtime.engine.test_rule(args.id, event).await?;
    if json {
        print_json(&outcome)?;
    } else {
        println!(
            "Rule {} {}",
            args.id,
            if outcome.would_execute {
                "WOULD EXECUTE"
            } else {
                "would not execute"
            }
        );
        if let Some(reason) = outcome.execution.skip_reason {
            println!("  recorded as: skipped/{}", reason.as_str());
        }
        for action in &outcome.validated_actions {
            println!(
                "  action[{}] {} -> {:?}{}",
                action.index,
                action.action_type,
                action.status,
                action
                    .error
                    .as_deref()
                    .map(|e| format!(" ({e})"))
                    .unwrap_or_default(),
            );
        }
    }
    Ok(())
}
