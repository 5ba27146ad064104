//! `meridian run`: start the engine and serve until interrupted.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use crate::cli::commands::build_runtime;
use crate::infrastructure::logging::Logger;

#[derive(Args)]
pub struct RunArgs {
    /// Engage the global kill switch at startup (observe-only mode)
    #[arg(long)]
    pub kill_switch: bool,
}

pub async fn execute(args: RunArgs, config_path: Option<PathBuf>, _json: bool) -> Result<()> {
    let runtime = build_runtime(config_path.as_deref()).await?;
    let _logger = Logger::init(&runtime.config.logging)?;

    if args.kill_switch {
        runtime.engine.set_global_kill_switch(true);
    }

    runtime.engine.start().await?;
    tracing::info!("Engine running; press Ctrl-C to stop");

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown requested, draining in-flight work");
    runtime.engine.stop().await;

    let status = runtime.engine.status().await;
    tracing::info!(
        events_processed = status.events_processed,
        executions_recorded = status.executions_recorded,
        "Engine stopped"
    );
    Ok(())
}
