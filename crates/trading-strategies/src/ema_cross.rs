//! EMA Cross Strategy.
//!
//! Entries follow a fast/slow EMA golden cross above the base EMA, or, in
//! base-gap mode, a pullback of price below the base EMA. Exits run the full
//! exit filter chain including the stale-position rule.

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};
use trading_core::{
    error::StrategyError,
    traits::{BarContext, StrategyConfig, StrategyDecisionCore},
    types::{Action, Decision, PositionState, RuleCheck},
};
use trading_indicators::{IndicatorConfig, SeparateEmaPeriods};
use trading_risk::{
    DeadCrossFilter, FilterChain, FilterContext, PositionView, SlowEmaSurgeFilter,
    StalePositionFilter, StopLossFilter, TakeProfitFilter, TrailingStopFilter,
};

use crate::conditions::EmaConditions;
use crate::holding::{ExitPath, HoldingPolicy};

/// Configuration for the EMA Cross strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmaCrossConfig {
    pub fast_period: usize,
    pub slow_period: usize,
    pub base_ema_period: usize,
    /// Extra EMA pairs for entries and exits
    pub separate: Option<SeparateEmaPeriods>,
    /// Replace all entry checks with the base EMA gap rule
    pub base_ema_gap_enabled: bool,
    /// Gap ratio at or below which the pullback entry fires (negative)
    pub base_ema_gap_diff: f64,
    pub take_profit: f64,
    pub stop_loss: f64,
    pub trailing_stop_pct: Option<f64>,
    pub min_holding_period: u64,
    pub holding_period_applies_to: HoldingPolicy,
}

impl Default for EmaCrossConfig {
    fn default() -> Self {
        Self {
            fast_period: 20,
            slow_period: 60,
            base_ema_period: 200,
            separate: None,
            base_ema_gap_enabled: false,
            base_ema_gap_diff: -0.005,
            take_profit: 0.03,
            stop_loss: 0.01,
            trailing_stop_pct: None,
            min_holding_period: 0,
            holding_period_applies_to: HoldingPolicy::All,
        }
    }
}

impl EmaCrossConfig {
    /// Indicator periods this strategy reads.
    pub fn indicator_config(&self) -> IndicatorConfig {
        let config = IndicatorConfig::new(self.fast_period, self.slow_period, 9)
            .with_base(self.base_ema_period);
        match self.separate {
            Some(periods) => config.with_separate(periods),
            None => config,
        }
    }
}

impl StrategyConfig for EmaCrossConfig {
    fn validate(&self) -> Result<(), StrategyError> {
        if self.fast_period == 0 || self.slow_period == 0 || self.base_ema_period == 0 {
            return Err(StrategyError::InvalidConfig(
                "Periods must be greater than 0".into(),
            ));
        }
        if self.fast_period >= self.slow_period {
            return Err(StrategyError::InvalidConfig(
                "Fast period must be less than slow period".into(),
            ));
        }
        if let Some(s) = self.separate {
            if s.fast_buy == 0 || s.fast_sell == 0 || s.fast_buy >= s.slow_buy || s.fast_sell >= s.slow_sell {
                return Err(StrategyError::InvalidConfig(
                    "Separate EMA fast periods must be non-zero and less than their slow periods".into(),
                ));
            }
        }
        if self.take_profit <= 0.0 || self.stop_loss <= 0.0 {
            return Err(StrategyError::InvalidConfig(
                "Take-profit and stop-loss must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// EMA Cross decision core.
pub struct EmaCrossStrategy {
    config: EmaCrossConfig,
    conditions: EmaConditions,
    entry_chain: FilterChain,
    exit: ExitPath,
}

impl EmaCrossStrategy {
    /// Create a new EMA Cross strategy.
    pub fn new(config: EmaCrossConfig, conditions: EmaConditions) -> Self {
        let buy = &conditions.buy;
        let sell = &conditions.sell;

        let entry_chain = FilterChain::entry().with(
            SlowEmaSurgeFilter::new(buy.surge_threshold_pct),
            buy.surge_filter_enabled,
        );

        let chain = FilterChain::exit()
            .with(StopLossFilter::new(config.stop_loss), sell.stop_loss)
            .with(TakeProfitFilter::new(config.take_profit), sell.take_profit)
            .with(
                TrailingStopFilter::new(config.trailing_stop_pct),
                sell.trailing_stop && config.trailing_stop_pct.is_some(),
            )
            .with(DeadCrossFilter::ema(), sell.ema_dc)
            .with(
                StalePositionFilter::new(sell.stale_hours, sell.stale_threshold_pct),
                sell.stale_position_check,
            );

        let exit = ExitPath {
            min_holding_period: config.min_holding_period,
            policy: config.holding_period_applies_to,
            emergency_stop: sell.stop_loss.then(|| StopLossFilter::new(config.stop_loss)),
            chain,
        };

        Self {
            config,
            conditions,
            entry_chain,
            exit,
        }
    }

    pub fn config(&self) -> &EmaCrossConfig {
        &self.config
    }

    fn decide_gap_entry(&self, ctx: &BarContext<'_>) -> Decision {
        let price = ctx.bar.close;
        let Some(base) = ctx.entry.ema_base.filter(|b| *b > 0.0) else {
            return Decision::hold()
                .with_reason("NO_BASE_EMA")
                .with_checks(vec![RuleCheck::skipped("base_ema_gap", true).with_detail("base EMA unavailable")]);
        };

        let diff = self.config.base_ema_gap_diff;
        let gap = (price - base) / base;
        let met = gap <= diff;
        let detail_reason = if !met {
            "GAP_INSUFFICIENT"
        } else if gap < diff * 2.0 {
            "GAP_EXCEEDED"
        } else {
            "GAP_MET"
        };
        let gap_details = json!({
            "price": price,
            "base_ema": base,
            "gap_pct": gap,
            "gap_threshold": diff,
            "gap_to_target": gap - diff,
            "price_needed": base * (1.0 + diff),
            "condition_met": met,
        });
        let check = if met {
            RuleCheck::passed("base_ema_gap")
        } else {
            RuleCheck::failed("base_ema_gap")
        }
        .with_detail(detail_reason);

        if met {
            info!(gap_pct = gap * 100.0, threshold = diff * 100.0, detail = detail_reason, "Base EMA gap entry");
            Decision::new(Action::Buy)
                .with_reason("BASE_EMA_GAP")
                .with_detail(detail_reason)
                .with_checks(vec![check])
                .with_metadata(json!({ "gap_details": gap_details }))
        } else {
            debug!(gap_pct = gap * 100.0, threshold = diff * 100.0, "Base EMA gap not reached");
            Decision::hold()
                .with_reason(detail_reason)
                .with_checks(vec![check])
                .with_metadata(json!({ "gap_details": gap_details }))
        }
    }

    fn decide_cross_entry(&self, ctx: &BarContext<'_>, position: &mut PositionState) -> Decision {
        let snap = ctx.entry;
        let bar = ctx.bar;
        let buy = &self.conditions.buy;
        let mut checks = Vec::new();

        let fctx = FilterContext {
            bar,
            snapshot: snap,
            bar_index: ctx.bar_index,
            bars_held: 0,
            interval: ctx.interval,
        };
        if let Some(blocked) =
            self.entry_chain
                .evaluate_traced(&fctx, &mut PositionView::new(position), &mut checks)
        {
            debug!(reason = %blocked.reason, detail = %blocked.detail, "Entry blocked by filter");
            return Decision::hold()
                .with_reason(blocked.reason)
                .with_detail(blocked.detail)
                .with_checks(checks)
                .with_metadata(blocked.metadata);
        }

        let mut active = Vec::new();
        let rules = [
            ("ema_gc", buy.ema_gc, Some(snap.ema_golden_cross())),
            ("above_base_ema", buy.above_base_ema, snap.ema_base.map(|b| bar.close > b)),
            ("bullish_candle", buy.bullish_candle, Some(bar.is_bullish())),
        ];
        for (key, enabled, outcome) in rules {
            if !enabled {
                checks.push(RuleCheck::skipped(key, false));
                continue;
            }
            match outcome {
                Some(true) => {
                    checks.push(RuleCheck::passed(key));
                    active.push(key);
                }
                Some(false) => {
                    checks.push(RuleCheck::failed(key));
                    return Decision::hold()
                        .with_reason(format!("{}_FAILED", key.to_uppercase()))
                        .with_checks(checks);
                }
                None => {
                    checks.push(RuleCheck::skipped(key, true).with_detail("input unavailable"));
                    active.push(key);
                }
            }
        }

        let reason = if active.is_empty() {
            "EMA_GC".to_string()
        } else {
            active.join("+").to_uppercase()
        };
        info!(%reason, ema_fast = ?snap.ema_fast, ema_slow = ?snap.ema_slow, "EMA buy signal");
        Decision::new(Action::Buy)
            .with_reason(reason)
            .with_checks(checks)
            .with_metadata(json!({
                "ema_fast": snap.ema_fast,
                "ema_slow": snap.ema_slow,
                "ema_base": snap.ema_base,
            }))
    }
}

impl StrategyDecisionCore for EmaCrossStrategy {
    fn name(&self) -> &str {
        "EMA"
    }

    fn decide(&mut self, ctx: &BarContext<'_>, position: &mut PositionState) -> Decision {
        if position.has_position {
            self.exit.evaluate(ctx, position)
        } else if self.config.base_ema_gap_enabled {
            self.decide_gap_entry(ctx)
        } else {
            self.decide_cross_entry(ctx, position)
        }
    }
}
