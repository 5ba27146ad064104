//! `meridian rules`: inspect and toggle automation rules.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use uuid::Uuid;

use crate::cli::commands::{build_runtime, print_json};

#[derive(Args)]
pub struct RulesArgs {
    #[command(subcommand)]
    pub command: RulesCommand,
}

#[derive(Subcommand)]
pub enum RulesCommand {
    /// List a tenant's rules
    List {
        #[arg(long)]
        tenant: String,
    },
    /// Enable a rule
    Enable { id: Uuid },
    /// Disable a rule
    Disable { id: Uuid },
    /// Soft-delete a rule
    Delete { id: Uuid },
}

pub async fn execute(args: RulesArgs, config_path: Option<PathBuf>, json: bool) -> Result<()> {
    let runtime = build_runtime(config_path.as_deref()).await?;

    match args.command {
        RulesCommand::List { tenant } => {
            let rules = runtime.rules.list(&tenant).await?;
            if json {
                print_json(&rules)?;
            } else if rules.is_empty() {
                println!("No rules for tenant {tenant}");
            } else {
                for rule in rules {
                    println!(
                        "{}  [{}] p{} {} -> {} actions ({} ok / {} failed / {} skipped)",
                        rule.id,
                        if rule.enabled { "on " } else { "off" },
                        rule.priority,
                        rule.trigger,
                        rule.actions.len(),
                        rule.stats.total_succeeded,
                        rule.stats.total_failed,
                        rule.stats.total_skipped,
                    );
                }
            }
        }
        RulesCommand::Enable { id } => {
            let changed = runtime.rules.set_enabled(id, true).await?;
            anyhow::ensure!(changed, "rule {id} not found");
            println!("Rule {id} enabled");
        }
        RulesCommand::Disable { id } => {
            let changed = runtime.rules.set_enabled(id, false).await?;
            anyhow::ensure!(changed, "rule {id} not found");
            println!("Rule {id} disabled");
        }
        RulesCommand::Delete { id } => {
            runtime
                .rules
                .soft_delete(id)
                .await
                .context("Failed to delete rule")?;
            println!("Rule {id} deleted");
        }
    }
    Ok(())
}
