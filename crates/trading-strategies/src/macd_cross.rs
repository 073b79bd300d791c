//! MACD Cross Strategy.
//!
//! Buys on a MACD golden cross confirmed by sign, candle, trend and moving
//! average checks; exits on stop-loss, take-profit, trailing stop or a MACD
//! dead cross once the minimum holding period has passed.

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};
use trading_core::{
    error::StrategyError,
    traits::{BarContext, StrategyConfig, StrategyDecisionCore},
    types::{Action, Decision, PositionState, RuleCheck},
};
use trading_indicators::IndicatorConfig;
use trading_risk::{DeadCrossFilter, FilterChain, StopLossFilter, TakeProfitFilter, TrailingStopFilter};

use crate::conditions::MacdConditions;
use crate::holding::{ExitPath, HoldingPolicy};

/// Configuration for the MACD Cross strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MacdCrossConfig {
    pub fast_period: usize,
    pub slow_period: usize,
    pub signal_period: usize,
    /// Minimum MACD value for a golden cross to count
    pub macd_threshold: f64,
    /// Take-profit ratio (0.03 = +3%)
    pub take_profit: f64,
    /// Stop-loss ratio (0.01 = -1%)
    pub stop_loss: f64,
    /// Trailing stop ratio; trailing stop is off when unset
    pub trailing_stop_pct: Option<f64>,
    pub min_holding_period: u64,
    pub holding_period_applies_to: HoldingPolicy,
}

impl Default for MacdCrossConfig {
    fn default() -> Self {
        Self {
            fast_period: 12,
            slow_period: 26,
            signal_period: 9,
            macd_threshold: 0.0,
            take_profit: 0.03,
            stop_loss: 0.01,
            trailing_stop_pct: None,
            min_holding_period: 0,
            holding_period_applies_to: HoldingPolicy::All,
        }
    }
}

impl MacdCrossConfig {
    /// Indicator periods this strategy reads.
    pub fn indicator_config(&self) -> IndicatorConfig {
        IndicatorConfig::new(self.fast_period, self.slow_period, self.signal_period)
    }
}

impl StrategyConfig for MacdCrossConfig {
    fn validate(&self) -> Result<(), StrategyError> {
        if self.fast_period == 0 || self.slow_period == 0 || self.signal_period == 0 {
            return Err(StrategyError::InvalidConfig(
                "Periods must be greater than 0".into(),
            ));
        }
        if self.fast_period >= self.slow_period {
            return Err(StrategyError::InvalidConfig(
                "Fast period must be less than slow period".into(),
            ));
        }
        if self.take_profit <= 0.0 || self.stop_loss <= 0.0 {
            return Err(StrategyError::InvalidConfig(
                "Take-profit and stop-loss must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// MACD Cross decision core.
pub struct MacdCrossStrategy {
    config: MacdCrossConfig,
    conditions: MacdConditions,
    exit: ExitPath,
}

impl MacdCrossStrategy {
    /// Create a new MACD Cross strategy.
    pub fn new(config: MacdCrossConfig, conditions: MacdConditions) -> Self {
        let sell = &conditions.sell;
        let chain = FilterChain::exit()
            .with(StopLossFilter::new(config.stop_loss), sell.stop_loss)
            .with(TakeProfitFilter::new(config.take_profit), sell.take_profit)
            .with(
                TrailingStopFilter::new(config.trailing_stop_pct),
                sell.trailing_stop && config.trailing_stop_pct.is_some(),
            )
            .with(DeadCrossFilter::macd(), sell.dead_cross);

        let exit = ExitPath {
            min_holding_period: config.min_holding_period,
            policy: config.holding_period_applies_to,
            emergency_stop: sell.stop_loss.then(|| StopLossFilter::new(config.stop_loss)),
            chain,
        };

        Self {
            config,
            conditions,
            exit,
        }
    }

    pub fn config(&self) -> &MacdCrossConfig {
        &self.config
    }

    fn decide_entry(&self, ctx: &BarContext<'_>) -> Decision {
        let snap = ctx.entry;
        let bar = ctx.bar;
        let buy = &self.conditions.buy;
        let (Some(macd), Some(signal)) = (snap.macd, snap.signal) else {
            return Decision::hold().with_reason("NO_DATA");
        };

        let mut checks = Vec::new();
        let mut active = Vec::new();

        macro_rules! gate {
            ($key:literal, $enabled:expr, $check:expr) => {
                if $enabled {
                    match $check {
                        Some(true) => {
                            checks.push(RuleCheck::passed($key));
                            active.push($key);
                        }
                        Some(false) => {
                            debug!(rule = $key, macd, signal, close = bar.close, "Entry check failed");
                            checks.push(RuleCheck::failed($key));
                            return Decision::hold()
                                .with_reason(format!("{}_FAILED", $key.to_uppercase()))
                                .with_checks(checks);
                        }
                        None => {
                            checks.push(RuleCheck::skipped($key, true).with_detail("input unavailable"));
                            active.push($key);
                        }
                    }
                } else {
                    checks.push(RuleCheck::skipped($key, false));
                }
            };
        }

        gate!(
            "golden_cross",
            buy.golden_cross,
            Some(snap.macd_golden_cross() && macd >= self.config.macd_threshold)
        );
        gate!("macd_positive", buy.macd_positive, Some(macd > 0.0));
        gate!("signal_positive", buy.signal_positive, Some(signal > 0.0));
        gate!("bullish_candle", buy.bullish_candle, Some(bar.is_bullish()));
        gate!("macd_trending_up", buy.macd_trending_up, snap.prev_macd.map(|p| macd > p));
        gate!("above_ma20", buy.above_ma20, snap.ma20.map(|ma| bar.close > ma));
        gate!("above_ma60", buy.above_ma60, snap.ma60.map(|ma| bar.close > ma));

        let reason = if active.is_empty() {
            "GOLDEN_CROSS".to_string()
        } else {
            active.join("+").to_uppercase()
        };
        info!(%reason, macd, signal, threshold = self.config.macd_threshold, "MACD buy signal");
        Decision::new(Action::Buy)
            .with_reason(reason)
            .with_checks(checks)
            .with_metadata(json!({ "macd": macd, "signal": signal }))
    }
}

impl StrategyDecisionCore for MacdCrossStrategy {
    fn name(&self) -> &str {
        "MACD"
    }

    fn decide(&mut self, ctx: &BarContext<'_>, position: &mut PositionState) -> Decision {
        if position.has_position {
            self.exit.evaluate(ctx, position)
        } else {
            self.decide_entry(ctx)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conditions::{MacdBuyConditions, MacdSellConditions};
    use trading_core::{Bar, IndicatorSnapshot, Interval};

    fn golden_snapshot() -> IndicatorSnapshot {
        IndicatorSnapshot {
            macd: Some(0.5),
            signal: Some(0.3),
            prev_macd: Some(0.2),
            prev_signal: Some(0.25),
            ma20: Some(99.0),
            ma60: Some(98.0),
            ..Default::default()
        }
    }

    fn strategy(conditions: MacdConditions) -> MacdCrossStrategy {
        MacdCrossStrategy::new(MacdCrossConfig::default(), conditions)
    }

    #[test]
    fn test_config_validation() {
        assert!(MacdCrossConfig::default().validate().is_ok());
        let bad = MacdCrossConfig {
            fast_period: 26,
            slow_period: 12,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_buy_when_all_checks_pass() {
        let mut s = strategy(MacdConditions::default());
        let bar = Bar::new(0, 99.5, 101.0, 99.0, 100.5, 10.0);
        let snap = golden_snapshot();
        let ctx = BarContext::new(&bar, &snap, 50, Interval::Minute5);
        let mut pos = PositionState::new();

        let d = s.decide(&ctx, &mut pos);
        assert_eq!(d.action, Action::Buy);
        assert_eq!(
            d.reason.as_deref(),
            Some("GOLDEN_CROSS+MACD_POSITIVE+SIGNAL_POSITIVE+BULLISH_CANDLE+MACD_TRENDING_UP+ABOVE_MA20+ABOVE_MA60")
        );
        assert_eq!(d.checks.len(), 7);
    }

    #[test]
    fn test_disabled_check_is_skipped_not_failed() {
        let conditions = MacdConditions {
            buy: MacdBuyConditions {
                bullish_candle: false,
                above_ma20: false,
                above_ma60: false,
                ..Default::default()
            },
            sell: MacdSellConditions::default(),
        };
        let mut s = strategy(conditions);
        // Bearish candle below both MAs
        let bar = Bar::new(0, 101.0, 101.0, 90.0, 91.0, 10.0);
        let snap = golden_snapshot();
        let ctx = BarContext::new(&bar, &snap, 50, Interval::Minute5);

        let d = s.decide(&ctx, &mut PositionState::new());
        assert_eq!(d.action, Action::Buy);
        assert_eq!(
            d.reason.as_deref(),
            Some("GOLDEN_CROSS+MACD_POSITIVE+SIGNAL_POSITIVE+MACD_TRENDING_UP")
        );
    }

    #[test]
    fn test_no_golden_cross_holds() {
        let mut s = strategy(MacdConditions::default());
        let bar = Bar::new(0, 99.5, 101.0, 99.0, 100.5, 10.0);
        let snap = IndicatorSnapshot {
            prev_macd: Some(0.4),
            prev_signal: Some(0.3),
            ..golden_snapshot()
        };
        let ctx = BarContext::new(&bar, &snap, 50, Interval::Minute5);
        let d = s.decide(&ctx, &mut PositionState::new());
        assert_eq!(d.action, Action::Hold);
        assert_eq!(d.reason.as_deref(), Some("GOLDEN_CROSS_FAILED"));
    }

    #[test]
    fn test_macd_threshold() {
        let config = MacdCrossConfig {
            macd_threshold: 1.0,
            ..Default::default()
        };
        let mut s = MacdCrossStrategy::new(config, MacdConditions::default());
        let bar = Bar::new(0, 99.5, 101.0, 99.0, 100.5, 10.0);
        let snap = golden_snapshot();
        let ctx = BarContext::new(&bar, &snap, 50, Interval::Minute5);
        assert_eq!(s.decide(&ctx, &mut PositionState::new()).action, Action::Hold);
    }

    #[test]
    fn test_take_profit_beats_dead_cross() {
        let mut s = strategy(MacdConditions::default());
        let bar = Bar::flat(0, 103.0);
        // Dead cross on this bar as well
        let snap = IndicatorSnapshot {
            macd: Some(0.1),
            signal: Some(0.2),
            prev_macd: Some(0.3),
            prev_signal: Some(0.2),
            ..Default::default()
        };
        let ctx = BarContext::new(&bar, &snap, 20, Interval::Minute5);
        let mut pos = PositionState::new();
        pos.open_position(1.0, 100.0, 10, 0);

        let d = s.decide(&ctx, &mut pos);
        assert_eq!(d.action, Action::Sell);
        assert_eq!(d.reason.as_deref(), Some("TAKE_PROFIT"));
    }

    #[test]
    fn test_dead_cross_exit() {
        let mut s = strategy(MacdConditions::default());
        let bar = Bar::flat(0, 100.5);
        let snap = IndicatorSnapshot {
            macd: Some(0.1),
            signal: Some(0.2),
            prev_macd: Some(0.3),
            prev_signal: Some(0.2),
            ..Default::default()
        };
        let ctx = BarContext::new(&bar, &snap, 20, Interval::Minute5);
        let mut pos = PositionState::new();
        pos.open_position(1.0, 100.0, 10, 0);
        let d = s.decide(&ctx, &mut pos);
        assert_eq!(d.reason.as_deref(), Some("DEAD_CROSS"));
        assert_eq!(pos.highest_price_since_entry, Some(100.5));
    }

    #[test]
    fn test_min_holding_period_suppresses_exits() {
        let config = MacdCrossConfig {
            min_holding_period: 5,
            ..Default::default()
        };
        let mut s = MacdCrossStrategy::new(config, MacdConditions::default());
        let snap = IndicatorSnapshot::default();
        let mut pos = PositionState::new();
        pos.open_position(1.0, 100.0, 10, 0);

        // Both take-profit and stop-loss are numerically met
        for price in [110.0, 90.0] {
            let bar = Bar::flat(0, price);
            let ctx = BarContext::new(&bar, &snap, 12, Interval::Minute5);
            let d = s.decide(&ctx, &mut pos);
            assert_eq!(d.action, Action::Hold);
            assert_eq!(d.reason.as_deref(), Some("MIN_HOLDING"));
        }

        let bar = Bar::flat(0, 110.0);
        let ctx = BarContext::new(&bar, &snap, 15, Interval::Minute5);
        assert_eq!(s.decide(&ctx, &mut pos).action, Action::Sell);
    }

    #[test]
    fn test_non_emergency_policy_lets_stop_loss_through() {
        let config = MacdCrossConfig {
            min_holding_period: 5,
            holding_period_applies_to: HoldingPolicy::NonEmergency,
            ..Default::default()
        };
        let mut s = MacdCrossStrategy::new(config, MacdConditions::default());
        let snap = IndicatorSnapshot::default();
        let mut pos = PositionState::new();
        pos.open_position(1.0, 100.0, 10, 0);

        let bar = Bar::flat(0, 110.0);
        let ctx = BarContext::new(&bar, &snap, 12, Interval::Minute5);
        assert_eq!(s.decide(&ctx, &mut pos).action, Action::Hold);

        let bar = Bar::flat(0, 98.0);
        let ctx = BarContext::new(&bar, &snap, 12, Interval::Minute5);
        let d = s.decide(&ctx, &mut pos);
        assert_eq!(d.action, Action::Sell);
        assert_eq!(d.reason.as_deref(), Some("STOP_LOSS"));
    }

    #[test]
    fn test_recovered_bars_held_used_when_entry_index_stale() {
        let config = MacdCrossConfig {
            min_holding_period: 3,
            ..Default::default()
        };
        let mut s = MacdCrossStrategy::new(config, MacdConditions::default());
        let snap = IndicatorSnapshot::default();
        let mut pos = PositionState::new();
        // Entry index ahead of the restarted bar counter
        pos.open_position(1.0, 100.0, 40, 0);

        let bar = Bar::flat(0, 104.0);
        let mut ctx = BarContext::new(&bar, &snap, 5, Interval::Minute5);
        assert_eq!(s.decide(&ctx, &mut pos).action, Action::Hold);

        ctx.recovered_bars_held = Some(8);
        assert_eq!(s.decide(&ctx, &mut pos).reason.as_deref(), Some("TAKE_PROFIT"));
    }
}
