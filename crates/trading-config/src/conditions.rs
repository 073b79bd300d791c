//! Per-user rule toggle files.
//!
//! A condition file is `{ "buy": {...}, "sell": {...} }`. Missing keys keep
//! their defaults.

use std::path::{Path, PathBuf};
use tracing::{debug, info};
use trading_strategies::{EmaConditions, MacdConditions, StrategyKind};

use crate::error::ConfigError;

/// Candidate file names for a user, most specific first.
pub fn condition_file_candidates(dir: &Path, user_id: &str, strategy: StrategyKind) -> [PathBuf; 2] {
    [
        dir.join(format!("{user_id}_{strategy}_buy_sell_conditions.json")),
        dir.join(format!("{user_id}_buy_sell_conditions.json")),
    ]
}

/// First existing condition file for a user, if any.
pub fn find_condition_file(dir: &Path, user_id: &str, strategy: StrategyKind) -> Option<PathBuf> {
    condition_file_candidates(dir, user_id, strategy)
        .into_iter()
        .find(|p| p.is_file())
}

/// Read and check a condition file against the strategy's toggle set.
pub fn read_condition_file(path: &Path, strategy: StrategyKind) -> Result<serde_json::Value, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let malformed = |source| ConfigError::Conditions {
        path: path.to_path_buf(),
        source,
    };
    let doc: serde_json::Value = serde_json::from_str(&text).map_err(malformed)?;
    match strategy {
        StrategyKind::Macd => serde_json::from_value::<MacdConditions>(doc.clone()).map(drop),
        StrategyKind::Ema => serde_json::from_value::<EmaConditions>(doc.clone()).map(drop),
    }
    .map_err(malformed)?;
    Ok(doc)
}

/// Resolve a user's conditions.
///
/// An explicit `file` must exist. Otherwise the lookup order in `dir` is
/// `{user}_{STRATEGY}_buy_sell_conditions.json`, then
/// `{user}_buy_sell_conditions.json`; with neither, `null` selects defaults.
pub fn load_conditions(
    dir: &Path,
    user_id: &str,
    strategy: StrategyKind,
    file: Option<&Path>,
) -> Result<serde_json::Value, ConfigError> {
    let path = match file {
        Some(file) => Some(file.to_path_buf()),
        None => find_condition_file(dir, user_id, strategy),
    };
    match path {
        Some(path) => {
            info!(user_id, path = %path.display(), "Loading buy/sell conditions");
            read_condition_file(&path, strategy)
        }
        None => {
            debug!(user_id, dir = %dir.display(), "No condition file; using defaults");
            Ok(serde_json::Value::Null)
        }
    }
}
