//! Meridian CLI entry point.

use clap::Parser;

use meridian::cli::{Cli, Commands};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run(args) => meridian::cli::commands::run::execute(args, cli.config, cli.json).await,
        Commands::Rules(args) => {
            meridian::cli::commands::rules::execute(args, cli.config, cli.json).await
        }
        Commands::Simulate(args) => {
            meridian::cli::commands::simulate::execute(args, cli.config, cli.json).await
        }
        Commands::TestRule(args) => {
            meridian::cli::commands::test_rule::execute(args, cli.config, cli.json).await
        }
        Commands::Executions(args) => {
            meridian::cli::commands::executions::execute(args, cli.config, cli.json).await
        }
    };

    if let Err(err) = result {
        meridian::cli::handle_error(err, cli.json);
    }
}
