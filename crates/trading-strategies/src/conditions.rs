//! Per-rule enable flags for each strategy variant.
//!
//! Condition files are JSON objects `{ "buy": {...}, "sell": {...} }`. Any
//! missing key falls back to its default: enabled, except the surge filter
//! and the stale-position check which are opt-in.

use serde::{Deserialize, Serialize};

fn enabled() -> bool {
    true
}

/// Entry rules of the MACD variant, in evaluation order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MacdBuyConditions {
    #[serde(default = "enabled")]
    pub golden_cross: bool,
    #[serde(default = "enabled")]
    pub macd_positive: bool,
    #[serde(default = "enabled")]
    pub signal_positive: bool,
    #[serde(default = "enabled")]
    pub bullish_candle: bool,
    #[serde(default = "enabled")]
    pub macd_trending_up: bool,
    #[serde(default = "enabled")]
    pub above_ma20: bool,
    #[serde(default = "enabled")]
    pub above_ma60: bool,
}

impl Default for MacdBuyConditions {
    fn default() -> Self {
        Self {
            golden_cross: true,
            macd_positive: true,
            signal_positive: true,
            bullish_candle: true,
            macd_trending_up: true,
            above_ma20: true,
            above_ma60: true,
        }
    }
}

/// Exit rules of the MACD variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MacdSellConditions {
    #[serde(default = "enabled")]
    pub stop_loss: bool,
    #[serde(default = "enabled")]
    pub take_profit: bool,
    #[serde(default = "enabled")]
    pub trailing_stop: bool,
    #[serde(default = "enabled")]
    pub dead_cross: bool,
}

impl Default for MacdSellConditions {
    fn default() -> Self {
        Self {
            stop_loss: true,
            take_profit: true,
            trailing_stop: true,
            dead_cross: true,
        }
    }
}

fn default_surge_threshold() -> f64 {
    0.01
}

fn default_stale_hours() -> f64 {
    1.0
}

fn default_stale_threshold() -> f64 {
    0.01
}

/// Entry rules of the EMA variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmaBuyConditions {
    #[serde(default = "enabled")]
    pub ema_gc: bool,
    #[serde(default = "enabled")]
    pub above_base_ema: bool,
    #[serde(default = "enabled")]
    pub bullish_candle: bool,
    #[serde(default)]
    pub surge_filter_enabled: bool,
    #[serde(default = "default_surge_threshold")]
    pub surge_threshold_pct: f64,
}

impl Default for EmaBuyConditions {
    fn default() -> Self {
        Self {
            ema_gc: true,
            above_base_ema: true,
            bullish_candle: true,
            surge_filter_enabled: false,
            surge_threshold_pct: default_surge_threshold(),
        }
    }
}

/// Exit rules of the EMA variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmaSellConditions {
    #[serde(default = "enabled")]
    pub stop_loss: bool,
    #[serde(default = "enabled")]
    pub take_profit: bool,
    #[serde(default = "enabled")]
    pub trailing_stop: bool,
    #[serde(default = "enabled")]
    pub ema_dc: bool,
    #[serde(default)]
    pub stale_position_check: bool,
    #[serde(default = "default_stale_hours")]
    pub stale_hours: f64,
    #[serde(default = "default_stale_threshold")]
    pub stale_threshold_pct: f64,
}

impl Default for EmaSellConditions {
    fn default() -> Self {
        Self {
            stop_loss: true,
            take_profit: true,
            trailing_stop: true,
            ema_dc: true,
            stale_position_check: false,
            stale_hours: default_stale_hours(),
            stale_threshold_pct: default_stale_threshold(),
        }
    }
}

/// A buy/sell pair of condition sets.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Conditions<B, S> {
    #[serde(default)]
    pub buy: B,
    #[serde(default)]
    pub sell: S,
}

pub type MacdConditions = Conditions<MacdBuyConditions, MacdSellConditions>;
pub type EmaConditions = Conditions<EmaBuyConditions, EmaSellConditions>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_keys_default_enabled() {
        let c: MacdConditions =
            serde_json::from_str(r#"{ "buy": { "macd_positive": false }, "sell": {} }"#).unwrap();
        assert!(!c.buy.macd_positive);
        assert!(c.buy.golden_cross);
        assert!(c.buy.above_ma60);
        assert!(c.sell.dead_cross);
    }

    #[test]
    fn test_opt_in_rules_default_disabled() {
        let c: EmaConditions = serde_json::from_str("{}").unwrap();
        assert!(!c.buy.surge_filter_enabled);
        assert!(!c.sell.stale_position_check);
        assert!(c.sell.ema_dc);
        assert_eq!(c.sell.stale_hours, 1.0);
        assert_eq!(c.buy.surge_threshold_pct, 0.01);
    }
}
