//! Per-user strategy parameters.

use serde::{Deserialize, Serialize};
use trading_core::types::Interval;
use trading_indicators::SeparateEmaPeriods;
use trading_strategies::{EmaCrossConfig, HoldingPolicy, MacdCrossConfig, StrategyKind};

use crate::error::ValidationError;

const DEFAULT_ORDER_RATIO: f64 = 1.0;
const MIN_ORDER_RATIO: f64 = 0.01;
const DEFAULT_TAKE_PROFIT: f64 = 0.03;
const DEFAULT_STOP_LOSS: f64 = 0.01;
const DEFAULT_SIGNAL_PERIOD: usize = 9;
const MAX_SIGNAL_PERIOD: usize = 20;
const DEFAULT_BASE_EMA_PERIOD: usize = 200;
const DEFAULT_GAP_DIFF: f64 = -0.005;
const DEFAULT_SURGE_THRESHOLD: f64 = 0.01;

/// Normalize a ticker to `KRW-XXX`.
///
/// Accepts `KRW-XXX` or a bare alphabetic symbol in any case.
pub fn normalize_ticker(raw: &str) -> Result<String, ValidationError> {
    let ticker = raw.trim().to_ascii_uppercase();
    let symbol = match ticker.split_once('-') {
        Some(("KRW", symbol)) => symbol,
        Some(_) => return Err(ValidationError::InvalidTicker(raw.to_string())),
        None => ticker.as_str(),
    };
    if symbol.is_empty() || !symbol.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(ValidationError::InvalidTicker(raw.to_string()));
    }
    Ok(format!("KRW-{symbol}"))
}

/// Strategy parameters for one user.
///
/// `fast_period`/`slow_period` default per strategy when unset (MACD 12/26,
/// EMA 20/60).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyParams {
    pub ticker: String,
    pub interval: Interval,
    pub strategy: StrategyKind,
    pub fast_period: Option<usize>,
    pub slow_period: Option<usize>,
    pub signal_period: usize,
    pub base_ema_period: usize,
    pub macd_threshold: f64,
    pub take_profit: f64,
    pub stop_loss: f64,
    pub trailing_stop_pct: Option<f64>,
    pub min_holding_period: u64,
    pub holding_period_applies_to: HoldingPolicy,
    /// Share of the quote balance spent per BUY
    pub order_ratio: f64,
    pub use_separate_ema: bool,
    pub fast_buy: Option<usize>,
    pub slow_buy: Option<usize>,
    pub fast_sell: Option<usize>,
    pub slow_sell: Option<usize>,
    pub base_ema_gap_enabled: bool,
    pub base_ema_gap_diff: f64,
    /// Overrides the condition file's `buy.surge_filter_enabled`
    pub surge_filter_enabled: Option<bool>,
    /// Overrides the condition file's `buy.surge_threshold_pct`
    pub surge_threshold_pct: Option<f64>,
}

impl Default for StrategyParams {
    fn default() -> Self {
        Self {
            ticker: "KRW-BTC".to_string(),
            interval: Interval::default(),
            strategy: StrategyKind::Macd,
            fast_period: None,
            slow_period: None,
            signal_period: DEFAULT_SIGNAL_PERIOD,
            base_ema_period: DEFAULT_BASE_EMA_PERIOD,
            macd_threshold: 0.0,
            take_profit: DEFAULT_TAKE_PROFIT,
            stop_loss: DEFAULT_STOP_LOSS,
            trailing_stop_pct: None,
            min_holding_period: 0,
            holding_period_applies_to: HoldingPolicy::All,
            order_ratio: DEFAULT_ORDER_RATIO,
            use_separate_ema: false,
            fast_buy: None,
            slow_buy: None,
            fast_sell: None,
            slow_sell: None,
            base_ema_gap_enabled: false,
            base_ema_gap_diff: DEFAULT_GAP_DIFF,
            surge_filter_enabled: None,
            surge_threshold_pct: None,
        }
    }
}

impl StrategyParams {
    /// Fast and slow periods after applying the strategy defaults.
    pub fn periods(&self) -> (usize, usize) {
        let (fast, slow) = match self.strategy {
            StrategyKind::Macd => {
                let d = MacdCrossConfig::default();
                (d.fast_period, d.slow_period)
            }
            StrategyKind::Ema => {
                let d = EmaCrossConfig::default();
                (d.fast_period, d.slow_period)
            }
        };
        (self.fast_period.unwrap_or(fast), self.slow_period.unwrap_or(slow))
    }

    /// Correct out-of-range values to their defaults.
    ///
    /// Returns one message per correction. Structural problems are left for
    /// [`validate`](Self::validate).
    pub fn sanitize(&mut self) -> Vec<String> {
        let mut fixes = Vec::new();

        if let Ok(ticker) = normalize_ticker(&self.ticker) {
            if ticker != self.ticker {
                fixes.push(format!("ticker {:?} normalized to {ticker}", self.ticker));
                self.ticker = ticker;
            }
        }
        if !(MIN_ORDER_RATIO..=1.0).contains(&self.order_ratio) {
            fixes.push(format!(
                "order_ratio {} outside {MIN_ORDER_RATIO}..=1.0, using {DEFAULT_ORDER_RATIO}",
                self.order_ratio
            ));
            self.order_ratio = DEFAULT_ORDER_RATIO;
        }
        if !is_ratio(self.take_profit) {
            fixes.push(format!("take_profit {} invalid, using {DEFAULT_TAKE_PROFIT}", self.take_profit));
            self.take_profit = DEFAULT_TAKE_PROFIT;
        }
        if !is_ratio(self.stop_loss) {
            fixes.push(format!("stop_loss {} invalid, using {DEFAULT_STOP_LOSS}", self.stop_loss));
            self.stop_loss = DEFAULT_STOP_LOSS;
        }
        if let Some(pct) = self.trailing_stop_pct {
            if !is_ratio(pct) {
                fixes.push(format!("trailing_stop_pct {pct} invalid, trailing stop disabled"));
                self.trailing_stop_pct = None;
            }
        }
        if self.signal_period == 0 || self.signal_period > MAX_SIGNAL_PERIOD {
            fixes.push(format!(
                "signal_period {} outside 1..={MAX_SIGNAL_PERIOD}, using {DEFAULT_SIGNAL_PERIOD}",
                self.signal_period
            ));
            self.signal_period = DEFAULT_SIGNAL_PERIOD;
        }
        if !self.macd_threshold.is_finite() || self.macd_threshold.abs() > 1.0 {
            fixes.push(format!("macd_threshold {} outside -1..=1, using 0", self.macd_threshold));
            self.macd_threshold = 0.0;
        }
        if !self.base_ema_gap_diff.is_finite() || self.base_ema_gap_diff >= 0.0 {
            fixes.push(format!(
                "base_ema_gap_diff {} must be negative, using {DEFAULT_GAP_DIFF}",
                self.base_ema_gap_diff
            ));
            self.base_ema_gap_diff = DEFAULT_GAP_DIFF;
        }
        if let Some(pct) = self.surge_threshold_pct {
            if !pct.is_finite() || pct <= 0.0 {
                fixes.push(format!("surge_threshold_pct {pct} invalid, using {DEFAULT_SURGE_THRESHOLD}"));
                self.surge_threshold_pct = Some(DEFAULT_SURGE_THRESHOLD);
            }
        }
        if self.use_separate_ema && self.strategy != StrategyKind::Ema {
            fixes.push("use_separate_ema only applies to EMA, ignored".to_string());
            self.use_separate_ema = false;
        }
        fixes
    }

    /// Hard checks that no default can repair.
    pub fn validate(&self) -> Result<(), ValidationError> {
        normalize_ticker(&self.ticker)?;

        let (fast, slow) = self.periods();
        non_zero("fast_period", fast)?;
        non_zero("slow_period", slow)?;
        ordered("fast_period", fast, "slow_period", slow)?;

        match self.strategy {
            StrategyKind::Macd => non_zero("signal_period", self.signal_period)?,
            StrategyKind::Ema => {
                non_zero("base_ema_period", self.base_ema_period)?;
                if let Some(p) = self.separate_periods() {
                    non_zero("fast_buy", p.fast_buy)?;
                    non_zero("fast_sell", p.fast_sell)?;
                    ordered("fast_buy", p.fast_buy, "slow_buy", p.slow_buy)?;
                    ordered("fast_sell", p.fast_sell, "slow_sell", p.slow_sell)?;
                }
            }
        }
        Ok(())
    }

    /// Separate entry/exit EMA pairs; unset periods fall back to the main pair.
    pub fn separate_periods(&self) -> Option<SeparateEmaPeriods> {
        if !self.use_separate_ema {
            return None;
        }
        let (fast, slow) = self.periods();
        Some(SeparateEmaPeriods {
            fast_buy: self.fast_buy.unwrap_or(fast),
            slow_buy: self.slow_buy.unwrap_or(slow),
            fast_sell: self.fast_sell.unwrap_or(fast),
            slow_sell: self.slow_sell.unwrap_or(slow),
        })
    }

    /// Strategy configuration document for the registry.
    pub fn strategy_config(&self) -> serde_json::Value {
        let (fast_period, slow_period) = self.periods();
        let doc = match self.strategy {
            StrategyKind::Macd => serde_json::to_value(MacdCrossConfig {
                fast_period,
                slow_period,
                signal_period: self.signal_period,
                macd_threshold: self.macd_threshold,
                take_profit: self.take_profit,
                stop_loss: self.stop_loss,
                trailing_stop_pct: self.trailing_stop_pct,
                min_holding_period: self.min_holding_period,
                holding_period_applies_to: self.holding_period_applies_to,
            }),
            StrategyKind::Ema => serde_json::to_value(EmaCrossConfig {
                fast_period,
                slow_period,
                base_ema_period: self.base_ema_period,
                separate: self.separate_periods(),
                base_ema_gap_enabled: self.base_ema_gap_enabled,
                base_ema_gap_diff: self.base_ema_gap_diff,
                take_profit: self.take_profit,
                stop_loss: self.stop_loss,
                trailing_stop_pct: self.trailing_stop_pct,
                min_holding_period: self.min_holding_period,
                holding_period_applies_to: self.holding_period_applies_to,
            }),
        };
        doc.unwrap_or(serde_json::Value::Null)
    }

    /// Apply the surge filter overrides to a condition document.
    pub fn overlay_conditions(&self, mut conditions: serde_json::Value) -> serde_json::Value {
        if self.strategy != StrategyKind::Ema
            || (self.surge_filter_enabled.is_none() && self.surge_threshold_pct.is_none())
        {
            return conditions;
        }
        if !conditions.is_object() {
            conditions = serde_json::json!({});
        }
        let Some(root) = conditions.as_object_mut() else {
            return conditions;
        };
        let buy = root
            .entry("buy")
            .or_insert_with(|| serde_json::json!({}));
        if let Some(buy) = buy.as_object_mut() {
            if let Some(enabled) = self.surge_filter_enabled {
                buy.insert("surge_filter_enabled".to_string(), enabled.into());
            }
            if let Some(pct) = self.surge_threshold_pct {
                buy.insert("surge_threshold_pct".to_string(), pct.into());
            }
        }
        conditions
    }
}

fn is_ratio(value: f64) -> bool {
    value.is_finite() && value > 0.0 && value < 1.0
}

fn non_zero(name: &'static str, value: usize) -> Result<(), ValidationError> {
    if value == 0 {
        return Err(ValidationError::ZeroPeriod { name });
    }
    Ok(())
}

fn ordered(fast_name: &'static str, fast: usize, slow_name: &'static str, slow: usize) -> Result<(), ValidationError> {
    if fast >= slow {
        return Err(ValidationError::PeriodOrder {
            fast_name,
            fast,
            slow_name,
            slow,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use trading_strategies::StrategyRegistry;

    #[test]
    fn test_normalize_ticker() {
        assert_eq!(normalize_ticker(" btc ").unwrap(), "KRW-BTC");
        assert_eq!(normalize_ticker("krw-eth").unwrap(), "KRW-ETH");
        assert!(normalize_ticker("USDT-BTC").is_err());
        assert!(normalize_ticker("KRW-BTC1").is_err());
        assert!(normalize_ticker("KRW-").is_err());
        assert!(normalize_ticker("").is_err());
    }

    #[test]
    fn test_sanitize_corrects_soft_values() {
        let mut params = StrategyParams {
            ticker: "xrp".to_string(),
            order_ratio: 1.5,
            take_profit: -0.1,
            trailing_stop_pct: Some(2.0),
            signal_period: 0,
            base_ema_gap_diff: 0.01,
            ..Default::default()
        };
        let fixes = params.sanitize();

        assert_eq!(fixes.len(), 6);
        assert_eq!(params.ticker, "KRW-XRP");
        assert_eq!(params.order_ratio, 1.0);
        assert_eq!(params.take_profit, 0.03);
        assert_eq!(params.trailing_stop_pct, None);
        assert_eq!(params.signal_period, 9);
        assert_eq!(params.base_ema_gap_diff, -0.005);
        assert!(params.validate().is_ok());

        // Already clean: nothing to report
        assert!(params.sanitize().is_empty());
    }

    #[test]
    fn test_validate_rejects_structural_errors() {
        let params = StrategyParams {
            fast_period: Some(30),
            slow_period: Some(10),
            ..Default::default()
        };
        assert!(matches!(params.validate(), Err(ValidationError::PeriodOrder { .. })));

        let params = StrategyParams {
            fast_period: Some(0),
            ..Default::default()
        };
        assert_eq!(
            params.validate(),
            Err(ValidationError::ZeroPeriod { name: "fast_period" })
        );

        let params = StrategyParams {
            ticker: "BTC-ETH".to_string(),
            ..Default::default()
        };
        assert!(matches!(params.validate(), Err(ValidationError::InvalidTicker(_))));

        let params = StrategyParams {
            strategy: StrategyKind::Ema,
            use_separate_ema: true,
            fast_sell: Some(80),
            ..Default::default()
        };
        assert!(matches!(
            params.validate(),
            Err(ValidationError::PeriodOrder { fast_name: "fast_sell", .. })
        ));
    }

    #[test]
    fn test_periods_default_per_strategy() {
        assert_eq!(StrategyParams::default().periods(), (12, 26));
        let ema = StrategyParams {
            strategy: StrategyKind::Ema,
            fast_period: Some(10),
            ..Default::default()
        };
        assert_eq!(ema.periods(), (10, 60));
    }

    #[test]
    fn test_strategy_config_builds_in_registry() {
        let registry = StrategyRegistry::new();

        let macd = StrategyParams {
            trailing_stop_pct: Some(0.02),
            ..Default::default()
        };
        let built = registry
            .create(StrategyKind::Macd, macd.strategy_config(), serde_json::Value::Null)
            .unwrap();
        assert_eq!(built.indicators.slow_period, 26);

        let ema = StrategyParams {
            strategy: StrategyKind::Ema,
            use_separate_ema: true,
            fast_buy: Some(5),
            slow_buy: Some(15),
            ..Default::default()
        };
        let config = ema.strategy_config();
        assert_eq!(config["separate"]["fast_buy"], 5);
        assert_eq!(config["separate"]["slow_sell"], 60);
        assert!(registry.create(StrategyKind::Ema, config, serde_json::Value::Null).is_ok());
    }

    #[test]
    fn test_overlay_conditions_sets_surge_keys() {
        let params = StrategyParams {
            strategy: StrategyKind::Ema,
            surge_filter_enabled: Some(true),
            surge_threshold_pct: Some(0.02),
            ..Default::default()
        };
        let doc = params.overlay_conditions(serde_json::json!({ "sell": { "ema_dc": false } }));
        assert_eq!(doc["buy"]["surge_filter_enabled"], true);
        assert_eq!(doc["buy"]["surge_threshold_pct"], 0.02);
        assert_eq!(doc["sell"]["ema_dc"], false);

        let doc = params.overlay_conditions(serde_json::Value::Null);
        assert_eq!(doc["buy"]["surge_filter_enabled"], true);

        let macd = StrategyParams {
            surge_filter_enabled: Some(true),
            ..Default::default()
        };
        assert!(macd.overlay_conditions(serde_json::Value::Null).is_null());
    }
}
