//! Trading engine CLI application.

mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use trading_config::load_config;
use trading_monitor::setup_logging;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let loaded = load_config(&cli.config);

    // Setup logging; the command line wins over the file
    let logging = loaded.as_ref().map(|c| c.logging.clone()).unwrap_or_default();
    let level = cli.log_level.map_or(logging.level.as_str(), |l| l.as_str());
    let json = cli.json_logs || logging.is_json();
    let _guard = setup_logging(level, json, logging.file.as_deref());

    // Execute command
    match cli.command {
        Commands::Strategies => cli::commands::strategies::run(),
        Commands::ValidateConfig => cli::commands::validate::run(&cli.config, loaded),
        Commands::PrintConfig => {
            let config = loaded.with_context(|| format!("Failed to load {}", cli.config.display()))?;
            cli::commands::print_config::run(&config)
        }
        Commands::Run(args) => {
            let config = loaded.with_context(|| format!("Failed to load {}", cli.config.display()))?;
            cli::commands::run::run(args, config).await
        }
    }
}
