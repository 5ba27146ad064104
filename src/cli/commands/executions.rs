//! `meridian executions`: inspect the execution audit trail.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Subcommand};
use uuid::Uuid;

use crate::cli::commands::{build_runtime, print_json};

#[derive(Args)]
pub struct ExecutionsArgs {
    #[command(subcommand)]
    pub command: ExecutionsCommand,
}

#[derive(Subcommand)]
pub enum ExecutionsCommand {
    /// Recent executions of a rule, newest first
    List {
        #[arg(long)]
        rule: Uuid,
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
    /// Show one execution in full
    Show { id: Uuid },
}

pub async fn execute(args: ExecutionsArgs, config_path: Option<PathBuf>, json: bool) -> Result<()> {
    let runtime = build_runtime(config_path.as_deref()).await?;

    match args.command {
        ExecutionsCommand::List { rule, limit } => {
            let executions = runtime.executions.list_for_rule(rule, limit).await?;
            if json {
                print_json(&executions)?;
            } else if executions.is_empty() {
                println!("No executions for rule {rule}");
            } else {
                for execution in executions {
                    let outcome = execution
                        .skip_reason
                        .map(|r| format!("skipped/{}", r.as_str()))
                        .or_else(|| {
                            execution
                                .failure_reason
                                .map(|r| format!("{}/{}", execution.status.as_str(), r.as_str()))
                        })
                        .unwrap_or_else(|| execution.status.as_str().to_string());
                    println!(
                        "{}  {}  {}  {}ms  {} action(s)",
                        execution.id,
                        execution.started_at.format("%Y-%m-%d %H:%M:%S"),
                        outcome,
                        execution.duration_ms.unwrap_or(0),
                        execution.action_results.len(),
                    );
                }
            }
        }
        ExecutionsCommand::Show { id } => {
            let execution = runtime
                .executions
                .get(id)
                .await?
                .ok_or_else(|| anyhow::anyhow!("execution {id} not found"))?;
            print_json(&execution)?;
        }
    }
    Ok(())
}
