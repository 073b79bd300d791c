//! Validate configuration command.

use anyhow::Result;
use std::path::Path;
use trading_config::{AppConfig, ConfigError};
use trading_strategies::StrategyRegistry;

pub fn run(config_path: &Path, loaded: Result<AppConfig, ConfigError>) -> Result<()> {
    println!("Validating configuration: {:?}", config_path);

    let mut config = match loaded {
        Ok(config) => config,
        Err(e) => {
            println!("Configuration error: {}", e);
            return Err(e.into());
        }
    };

    let fixes = match config.prepare_users() {
        Ok(fixes) => fixes,
        Err(e) => {
            println!("Parameter error: {}", e);
            return Err(e.into());
        }
    };

    // Build every engine's strategy the way `run` would
    let registry = StrategyRegistry::new();
    for user in &config.users {
        let spec = user.engine_spec(&config)?;
        registry.create(spec.strategy, spec.config, spec.conditions)?;
    }

    println!("Configuration is valid!");
    println!();
    println!("App: {}", config.app.name);
    println!("Environment: {}", config.app.environment);
    println!("Log level: {}", config.logging.level);
    println!("Settlement: {:?}", config.paper.settlement);
    println!("Max restarts: {}", config.engine.max_restarts);
    println!();
    println!("Users: {}", config.users.len());
    for user in &config.users {
        println!(
            "  {} [{}] {} {} {}",
            user.user_id, user.mode, user.params.strategy, user.params.ticker, user.params.interval
        );
    }
    if !fixes.is_empty() {
        println!();
        println!("Corrected to defaults:");
        for (user_id, fix) in &fixes {
            println!("  {}: {}", user_id, fix);
        }
    }

    Ok(())
}
