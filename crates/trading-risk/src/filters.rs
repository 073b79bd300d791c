//! Concrete entry and exit filters.

use serde_json::json;

use crate::filter::{Filter, FilterCategory, FilterContext, FilterResult, PositionView};

/// Blocks entries when price runs too far above the slow EMA.
#[derive(Debug, Clone)]
pub struct SlowEmaSurgeFilter {
    threshold: f64,
}

impl SlowEmaSurgeFilter {
    pub const DEFAULT_THRESHOLD: f64 = 0.01;

    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }
}

impl Default for SlowEmaSurgeFilter {
    fn default() -> Self {
        Self::new(Self::DEFAULT_THRESHOLD)
    }
}

impl Filter for SlowEmaSurgeFilter {
    fn key(&self) -> &str {
        "surge_filter"
    }

    fn category(&self) -> FilterCategory {
        FilterCategory::BuyFilter
    }

    fn evaluate(&self, ctx: &FilterContext<'_>, _position: &mut PositionView<'_>) -> FilterResult {
        let Some(slow) = ctx.snapshot.ema_slow.filter(|v| *v > 0.0) else {
            return FilterResult::pass("NO_EMA", "slow EMA unavailable");
        };
        let surge = (ctx.price() - slow) / slow;
        let metadata = json!({ "surge_pct": surge, "threshold": self.threshold, "ema_slow": slow });
        if surge > self.threshold {
            FilterResult::trigger(
                "SURGE_FILTER",
                format!("price {:.2}% above slow EMA (limit {:.2}%)", surge * 100.0, self.threshold * 100.0),
            )
            .with_metadata(metadata)
        } else {
            FilterResult::pass("SURGE_OK", "price within surge limit").with_metadata(metadata)
        }
    }
}

/// Exits when the loss reaches the stop-loss ratio.
#[derive(Debug, Clone)]
pub struct StopLossFilter {
    stop_loss: f64,
}

impl StopLossFilter {
    /// `stop_loss` is a positive ratio, e.g. `0.01` for -1%.
    pub fn new(stop_loss: f64) -> Self {
        Self {
            stop_loss: stop_loss.abs(),
        }
    }
}

impl Filter for StopLossFilter {
    fn key(&self) -> &str {
        "stop_loss"
    }

    fn category(&self) -> FilterCategory {
        FilterCategory::CoreStrategy
    }

    fn evaluate(&self, ctx: &FilterContext<'_>, position: &mut PositionView<'_>) -> FilterResult {
        let Some(pnl) = position.pnl_pct(ctx.price()) else {
            return FilterResult::pass("NO_PNL", "no open position");
        };
        let metadata = json!({ "pnl_pct": pnl, "stop_loss": self.stop_loss });
        if pnl <= -self.stop_loss {
            FilterResult::trigger("STOP_LOSS", format!("pnl {:.2}% hit stop-loss", pnl * 100.0))
                .with_metadata(metadata)
        } else {
            FilterResult::pass("SL_OK", "above stop-loss").with_metadata(metadata)
        }
    }
}

/// Exits when the gain reaches the take-profit ratio.
#[derive(Debug, Clone)]
pub struct TakeProfitFilter {
    take_profit: f64,
}

impl TakeProfitFilter {
    pub fn new(take_profit: f64) -> Self {
        Self { take_profit }
    }
}

impl Filter for TakeProfitFilter {
    fn key(&self) -> &str {
        "take_profit"
    }

    fn category(&self) -> FilterCategory {
        FilterCategory::CoreStrategy
    }

    fn evaluate(&self, ctx: &FilterContext<'_>, position: &mut PositionView<'_>) -> FilterResult {
        let Some(pnl) = position.pnl_pct(ctx.price()) else {
            return FilterResult::pass("NO_PNL", "no open position");
        };
        let metadata = json!({ "pnl_pct": pnl, "take_profit": self.take_profit });
        if pnl >= self.take_profit {
            FilterResult::trigger("TAKE_PROFIT", format!("pnl {:.2}% hit take-profit", pnl * 100.0))
                .with_metadata(metadata)
        } else {
            FilterResult::pass("TP_OK", "below take-profit").with_metadata(metadata)
        }
    }
}

/// Exits on a retracement from the highest price since entry.
#[derive(Debug, Clone)]
pub struct TrailingStopFilter {
    pct: Option<f64>,
}

impl TrailingStopFilter {
    pub fn new(pct: Option<f64>) -> Self {
        Self { pct }
    }
}

impl Filter for TrailingStopFilter {
    fn key(&self) -> &str {
        "trailing_stop"
    }

    fn category(&self) -> FilterCategory {
        FilterCategory::CoreStrategy
    }

    fn evaluate(&self, ctx: &FilterContext<'_>, position: &mut PositionView<'_>) -> FilterResult {
        let Some(pct) = self.pct else {
            return FilterResult::pass("NO_TS_PCT", "trailing stop not configured");
        };
        if !position.has_position {
            return FilterResult::pass("NO_DATA", "no open position");
        }
        let price = ctx.price();
        position.advance_highest(price);
        let highest = position.highest_price_since_entry;
        if position.arm_trailing_stop(pct, price) {
            FilterResult::trigger(
                "TRAILING_STOP",
                format!("retraced {:.2}% from high", pct * 100.0),
            )
            .with_metadata(json!({ "highest": highest, "price": price, "trailing_stop_pct": pct }))
        } else {
            FilterResult::pass("TS_OK", "within trailing band")
        }
    }
}

/// Which pair of series a dead-cross filter watches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrossSource {
    /// Fast EMA under slow EMA (`EMA_DC`)
    Ema,
    /// MACD under its signal line (`DEAD_CROSS`)
    Macd,
}

/// Exits on a dead cross.
#[derive(Debug, Clone)]
pub struct DeadCrossFilter {
    source: CrossSource,
}

impl DeadCrossFilter {
    pub fn ema() -> Self {
        Self {
            source: CrossSource::Ema,
        }
    }

    pub fn macd() -> Self {
        Self {
            source: CrossSource::Macd,
        }
    }
}

impl Filter for DeadCrossFilter {
    fn key(&self) -> &str {
        match self.source {
            CrossSource::Ema => "ema_dc",
            CrossSource::Macd => "dead_cross",
        }
    }

    fn category(&self) -> FilterCategory {
        FilterCategory::CoreStrategy
    }

    fn evaluate(&self, ctx: &FilterContext<'_>, _position: &mut PositionView<'_>) -> FilterResult {
        let snap = ctx.snapshot;
        let (crossed, reason, ready) = match self.source {
            CrossSource::Ema => (
                snap.ema_dead_cross(),
                "EMA_DC",
                snap.prev_ema_fast.is_some() && snap.prev_ema_slow.is_some(),
            ),
            CrossSource::Macd => (
                snap.macd_dead_cross(),
                "DEAD_CROSS",
                snap.prev_macd.is_some() && snap.prev_signal.is_some(),
            ),
        };
        if !ready {
            return FilterResult::pass("NO_EMA", "previous values unavailable");
        }
        if crossed {
            FilterResult::trigger(reason, "dead cross")
        } else {
            FilterResult::pass("DC_OK", "no dead cross")
        }
    }
}

/// Liquidates positions that went nowhere for too long.
#[derive(Debug, Clone)]
pub struct StalePositionFilter {
    hours: f64,
    threshold: f64,
}

impl StalePositionFilter {
    pub const DEFAULT_HOURS: f64 = 2.0;
    pub const DEFAULT_THRESHOLD: f64 = 0.01;

    pub fn new(hours: f64, threshold: f64) -> Self {
        Self { hours, threshold }
    }

    /// Bars that make up `hours` on the given interval.
    pub fn required_bars(&self, interval_minutes: u64) -> i64 {
        if interval_minutes == 0 {
            return i64::MAX;
        }
        (self.hours * 60.0 / interval_minutes as f64).floor() as i64
    }
}

impl Default for StalePositionFilter {
    fn default() -> Self {
        Self::new(Self::DEFAULT_HOURS, Self::DEFAULT_THRESHOLD)
    }
}

impl Filter for StalePositionFilter {
    fn key(&self) -> &str {
        "stale_position_check"
    }

    fn category(&self) -> FilterCategory {
        FilterCategory::SellAuxiliary
    }

    fn evaluate(&self, ctx: &FilterContext<'_>, position: &mut PositionView<'_>) -> FilterResult {
        if !position.has_position {
            return FilterResult::pass("NO_DATA", "no open position");
        }
        position.advance_highest(ctx.price());
        let Some(max_gain) = position.max_gain_since_entry() else {
            return FilterResult::pass("NO_PNL", "entry price unavailable");
        };

        let required = self.required_bars(ctx.interval.as_minutes());
        let metadata = json!({
            "bars_held": ctx.bars_held,
            "required_bars": required,
            "max_gain_pct": max_gain,
            "threshold": self.threshold,
        });
        if ctx.bars_held >= required && max_gain < self.threshold {
            FilterResult::trigger(
                "STALE_POSITION",
                format!(
                    "held {} bars with max gain {:.2}% below {:.2}%",
                    ctx.bars_held,
                    max_gain * 100.0,
                    self.threshold * 100.0
                ),
            )
            .with_metadata(metadata)
        } else {
            FilterResult::pass("STALE_OK", "position still moving").with_metadata(metadata)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trading_core::{Bar, IndicatorSnapshot, Interval, PositionState};

    fn ctx<'a>(bar: &'a Bar, snap: &'a IndicatorSnapshot, bars_held: i64) -> FilterContext<'a> {
        FilterContext {
            bar,
            snapshot: snap,
            bar_index: 100,
            bars_held,
            interval: Interval::Minute10,
        }
    }

    fn open_at(price: f64) -> PositionState {
        let mut pos = PositionState::new();
        pos.open_position(1.0, price, 0, 0);
        pos
    }

    #[test]
    fn test_surge_filter() {
        let snap = IndicatorSnapshot {
            ema_slow: Some(100.0),
            ..Default::default()
        };
        let mut pos = PositionState::new();
        let filter = SlowEmaSurgeFilter::default();

        let bar = Bar::flat(0, 102.0);
        let r = filter.evaluate(&ctx(&bar, &snap, 0), &mut PositionView::new(&mut pos));
        assert!(r.should_block);
        assert_eq!(r.reason, "SURGE_FILTER");

        let bar = Bar::flat(0, 100.5);
        let r = filter.evaluate(&ctx(&bar, &snap, 0), &mut PositionView::new(&mut pos));
        assert!(!r.should_block);
        assert_eq!(r.reason, "SURGE_OK");

        let empty = IndicatorSnapshot::default();
        let r = filter.evaluate(&ctx(&bar, &empty, 0), &mut PositionView::new(&mut pos));
        assert_eq!(r.reason, "NO_EMA");
    }

    #[test]
    fn test_stop_loss_and_take_profit() {
        let snap = IndicatorSnapshot::default();
        let mut pos = open_at(100.0);
        let sl = StopLossFilter::new(0.02);
        let tp = TakeProfitFilter::new(0.03);

        let bar = Bar::flat(0, 98.0);
        let r = sl.evaluate(&ctx(&bar, &snap, 5), &mut PositionView::new(&mut pos));
        assert!(r.should_block);
        assert_eq!(r.reason, "STOP_LOSS");

        let bar = Bar::flat(0, 103.0);
        let r = tp.evaluate(&ctx(&bar, &snap, 5), &mut PositionView::new(&mut pos));
        assert!(r.should_block);
        assert_eq!(r.reason, "TAKE_PROFIT");

        let bar = Bar::flat(0, 101.0);
        assert_eq!(
            sl.evaluate(&ctx(&bar, &snap, 5), &mut PositionView::new(&mut pos)).reason,
            "SL_OK"
        );
        assert_eq!(
            tp.evaluate(&ctx(&bar, &snap, 5), &mut PositionView::new(&mut pos)).reason,
            "TP_OK"
        );
    }

    #[test]
    fn test_missing_position_never_triggers() {
        let snap = IndicatorSnapshot::default();
        let bar = Bar::flat(0, 1.0);
        let mut pos = PositionState::new();
        let filters: Vec<Box<dyn Filter>> = vec![
            Box::new(StopLossFilter::new(0.01)),
            Box::new(TakeProfitFilter::new(0.01)),
            Box::new(TrailingStopFilter::new(Some(0.01))),
            Box::new(DeadCrossFilter::ema()),
            Box::new(StalePositionFilter::default()),
        ];
        for f in &filters {
            let r = f.evaluate(&ctx(&bar, &snap, 0), &mut PositionView::new(&mut pos));
            assert!(!r.should_block, "{} triggered without a position", f.key());
        }
    }

    #[test]
    fn test_trailing_stop() {
        let snap = IndicatorSnapshot::default();
        let mut pos = open_at(100.0);
        let ts = TrailingStopFilter::new(Some(0.05));

        let bar = Bar::flat(0, 120.0);
        assert_eq!(
            ts.evaluate(&ctx(&bar, &snap, 1), &mut PositionView::new(&mut pos)).reason,
            "TS_OK"
        );
        let bar = Bar::flat(0, 113.0);
        let r = ts.evaluate(&ctx(&bar, &snap, 2), &mut PositionView::new(&mut pos));
        assert_eq!(r.reason, "TRAILING_STOP");
        assert!(pos.trailing_armed);

        let none = TrailingStopFilter::new(None);
        assert_eq!(
            none.evaluate(&ctx(&bar, &snap, 2), &mut PositionView::new(&mut pos)).reason,
            "NO_TS_PCT"
        );
    }

    #[test]
    fn test_dead_cross_sources() {
        let snap = IndicatorSnapshot {
            ema_fast: Some(99.0),
            ema_slow: Some(100.0),
            prev_ema_fast: Some(101.0),
            prev_ema_slow: Some(100.0),
            macd: Some(1.0),
            signal: Some(0.5),
            prev_macd: Some(0.8),
            prev_signal: Some(0.4),
            ..Default::default()
        };
        let bar = Bar::flat(0, 100.0);
        let mut pos = open_at(100.0);

        let r = DeadCrossFilter::ema().evaluate(&ctx(&bar, &snap, 3), &mut PositionView::new(&mut pos));
        assert_eq!(r.reason, "EMA_DC");
        let r = DeadCrossFilter::macd().evaluate(&ctx(&bar, &snap, 3), &mut PositionView::new(&mut pos));
        assert_eq!(r.reason, "DC_OK");

        let fresh = IndicatorSnapshot::default();
        let r = DeadCrossFilter::macd().evaluate(&ctx(&bar, &fresh, 3), &mut PositionView::new(&mut pos));
        assert_eq!(r.reason, "NO_EMA");
    }

    #[test]
    fn test_stale_position() {
        // 1h on 10 minute bars = 6 bars
        let filter = StalePositionFilter::new(1.0, 0.01);
        assert_eq!(filter.required_bars(10), 6);

        let snap = IndicatorSnapshot::default();
        let bar = Bar::flat(0, 100.2);
        let mut pos = open_at(100.0);

        let r = filter.evaluate(&ctx(&bar, &snap, 5), &mut PositionView::new(&mut pos));
        assert!(!r.should_block);

        let r = filter.evaluate(&ctx(&bar, &snap, 6), &mut PositionView::new(&mut pos));
        assert!(r.should_block);
        assert_eq!(r.reason, "STALE_POSITION");

        // A position that once ran up is not stale
        let mut pos = open_at(100.0);
        pos.update_highest_price(102.0);
        let r = filter.evaluate(&ctx(&bar, &snap, 10), &mut PositionView::new(&mut pos));
        assert!(!r.should_block);
    }
}
