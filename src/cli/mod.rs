//! CLI definitions.

pub mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "tradebot")]
#[command(author, version, about = "Per-user incremental crypto trading engines")]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config/default.toml", env = "TRADEBOT_CONFIG")]
    pub config: PathBuf,

    /// Log level; defaults to the configured level
    #[arg(short, long)]
    pub log_level: Option<LogLevel>,

    /// Enable JSON log format
    #[arg(long)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the configured engines until Ctrl-C
    Run(RunArgs),
    /// Validate configuration, parameters and condition files
    ValidateConfig,
    /// List available strategies with their defaults
    Strategies,
    /// Print the effective configuration as TOML
    PrintConfig,
}

#[derive(clap::Args)]
pub struct RunArgs {
    /// Only start these users (comma-separated)
    #[arg(short, long, value_delimiter = ',')]
    pub users: Vec<String>,

    /// Directory of `<TICKER>.csv` files to replay instead of synthetic bars
    #[arg(long)]
    pub data: Option<PathBuf>,

    /// Bars visible to the first fetch of a replay
    #[arg(long, default_value = "200")]
    pub warmup_bars: usize,

    /// Print engine status every N seconds (0 disables)
    #[arg(long, default_value = "60")]
    pub status_every: u64,
}
