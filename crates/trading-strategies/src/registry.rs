//! Strategy registry for building decision cores from configuration.

use crate::{EmaConditions, EmaCrossConfig, EmaCrossStrategy, MacdConditions, MacdCrossConfig, MacdCrossStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use trading_core::{error::StrategyError, traits::StrategyConfig, traits::StrategyDecisionCore};
use trading_indicators::IndicatorConfig;

/// Strategy variants an engine can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StrategyKind {
    Macd,
    Ema,
}

impl StrategyKind {
    pub fn all() -> &'static [StrategyKind] {
        &[StrategyKind::Macd, StrategyKind::Ema]
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrategyKind::Macd => write!(f, "MACD"),
            StrategyKind::Ema => write!(f, "EMA"),
        }
    }
}

impl FromStr for StrategyKind {
    type Err = StrategyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "MACD" => Ok(StrategyKind::Macd),
            "EMA" => Ok(StrategyKind::Ema),
            _ => Err(StrategyError::NotFound(s.to_string())),
        }
    }
}

/// Information about a registered strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyInfo {
    pub kind: StrategyKind,
    pub description: String,
    /// Default configuration as JSON
    pub default_config: serde_json::Value,
    /// Default condition set as JSON
    pub default_conditions: serde_json::Value,
}

/// A decision core plus the indicator periods it needs.
pub struct BuiltStrategy {
    pub core: Box<dyn StrategyDecisionCore>,
    pub indicators: IndicatorConfig,
}

/// Registry for available trading strategies.
pub struct StrategyRegistry {
    strategies: Vec<StrategyInfo>,
}

impl StrategyRegistry {
    /// Create a new strategy registry with all built-in strategies.
    pub fn new() -> Self {
        let strategies = vec![
            StrategyInfo {
                kind: StrategyKind::Macd,
                description: "MACD golden cross entries with SL/TP/trailing/dead-cross exits".to_string(),
                default_config: to_json(&MacdCrossConfig::default()),
                default_conditions: to_json(&MacdConditions::default()),
            },
            StrategyInfo {
                kind: StrategyKind::Ema,
                description: "EMA cross or base EMA pullback entries with stale-position exits".to_string(),
                default_config: to_json(&EmaCrossConfig::default()),
                default_conditions: to_json(&EmaConditions::default()),
            },
        ];
        Self { strategies }
    }

    /// List all available strategies.
    pub fn list(&self) -> &[StrategyInfo] {
        &self.strategies
    }

    pub fn get(&self, kind: StrategyKind) -> Option<&StrategyInfo> {
        self.strategies.iter().find(|s| s.kind == kind)
    }

    /// Build a decision core from JSON configuration and conditions.
    ///
    /// Missing keys in either document fall back to their defaults.
    pub fn create(
        &self,
        kind: StrategyKind,
        config: serde_json::Value,
        conditions: serde_json::Value,
    ) -> Result<BuiltStrategy, StrategyError> {
        match kind {
            StrategyKind::Macd => {
                let config: MacdCrossConfig = from_json(config)?;
                let conditions: MacdConditions = from_json(conditions)?;
                config.validate()?;
                let indicators = config.indicator_config();
                Ok(BuiltStrategy {
                    core: Box::new(MacdCrossStrategy::new(config, conditions)),
                    indicators,
                })
            }
            StrategyKind::Ema => {
                let config: EmaCrossConfig = from_json(config)?;
                let conditions: EmaConditions = from_json(conditions)?;
                config.validate()?;
                let indicators = config.indicator_config();
                Ok(BuiltStrategy {
                    core: Box::new(EmaCrossStrategy::new(config, conditions)),
                    indicators,
                })
            }
        }
    }

    /// Create a strategy with default configuration and conditions.
    pub fn create_default(&self, kind: StrategyKind) -> Result<BuiltStrategy, StrategyError> {
        self.create(kind, serde_json::Value::Null, serde_json::Value::Null)
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn to_json<T: Serialize>(value: &T) -> serde_json::Value {
    serde_json::to_value(value).unwrap_or(serde_json::Value::Null)
}

fn from_json<T: serde::de::DeserializeOwned + Default>(value: serde_json::Value) -> Result<T, StrategyError> {
    if value.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(value).map_err(|e| StrategyError::InvalidConfig(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_list() {
        let registry = StrategyRegistry::new();
        assert_eq!(registry.list().len(), 2);
        assert!(registry.get(StrategyKind::Ema).is_some());
    }

    #[test]
    fn test_kind_parsing() {
        assert_eq!("macd".parse::<StrategyKind>().unwrap(), StrategyKind::Macd);
        assert_eq!("EMA".parse::<StrategyKind>().unwrap(), StrategyKind::Ema);
        assert!("rsi".parse::<StrategyKind>().is_err());
        assert_eq!(StrategyKind::Macd.to_string(), "MACD");
    }

    #[test]
    fn test_create_default() {
        let registry = StrategyRegistry::new();
        let built = registry.create_default(StrategyKind::Macd).unwrap();
        assert_eq!(built.core.name(), "MACD");
        assert_eq!(built.indicators.slow_period, 26);

        let built = registry.create_default(StrategyKind::Ema).unwrap();
        assert_eq!(built.core.name(), "EMA");
        assert_eq!(built.indicators.base_period, Some(200));
    }

    #[test]
    fn test_create_with_partial_config() {
        let registry = StrategyRegistry::new();
        let config = serde_json::json!({ "fast_period": 5, "slow_period": 10 });
        let conditions = serde_json::json!({ "buy": { "above_ma60": false } });
        let built = registry.create(StrategyKind::Macd, config, conditions).unwrap();
        assert_eq!(built.indicators.fast_period, 5);
        assert_eq!(built.indicators.signal_period, 9);
    }

    #[test]
    fn test_create_rejects_invalid_config() {
        let registry = StrategyRegistry::new();
        let config = serde_json::json!({ "fast_period": 30, "slow_period": 10 });
        assert!(matches!(
            registry.create(StrategyKind::Ema, config, serde_json::Value::Null),
            Err(StrategyError::InvalidConfig(_))
        ));

        let config = serde_json::json!({ "fast_period": "twelve" });
        assert!(registry.create(StrategyKind::Macd, config, serde_json::Value::Null).is_err());
    }
}
