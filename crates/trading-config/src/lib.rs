//! Configuration management.
//!
//! Settings come from a TOML file overlaid by `TRADEBOT__SECTION__KEY`
//! environment variables. Per-user strategy parameters are sanitized and
//! validated before any engine starts.

pub mod conditions;
mod error;
mod params;
mod settings;

pub use error::{ConfigError, ValidationError};
pub use params::{normalize_ticker, StrategyParams};
pub use settings::{AppConfig, AppSettings, EngineSection, LoggingConfig, UserConfig};

use config::{Config, Environment, File};
use std::path::Path;

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "TRADEBOT";

/// Load configuration from file and environment.
///
/// Relative paths in the result are resolved against the file's directory.
pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    let config = Config::builder()
        .add_source(File::from(path).required(true))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    let mut app: AppConfig = config.try_deserialize()?;
    app.resolve_paths(path.parent().unwrap_or(Path::new("")));
    Ok(app)
}
