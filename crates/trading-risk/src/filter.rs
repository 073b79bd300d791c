//! Filter contract shared by entry and exit chains.

use std::fmt;
use std::ops::Deref;

use serde::{Deserialize, Serialize};
use trading_core::{Bar, IndicatorSnapshot, Interval, PositionState};

/// Evaluation tier of a filter. Exit chains run lower tiers first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FilterCategory {
    /// Stop-loss, take-profit, trailing stop, crosses
    CoreStrategy = 1,
    /// Entry gates
    BuyFilter = 2,
    /// Forced liquidation rules such as staleness
    SellAuxiliary = 3,
}

impl fmt::Display for FilterCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterCategory::CoreStrategy => write!(f, "CORE_STRATEGY"),
            FilterCategory::BuyFilter => write!(f, "BUY_FILTER"),
            FilterCategory::SellAuxiliary => write!(f, "SELL_AUXILIARY"),
        }
    }
}

/// Outcome of one filter.
///
/// `should_block` means "triggered": an entry filter blocks the entry, an
/// exit filter forces the exit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterResult {
    pub should_block: bool,
    pub reason: String,
    pub detail: String,
    pub metadata: serde_json::Value,
}

impl FilterResult {
    /// Non-triggering result.
    pub fn pass(reason: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            should_block: false,
            reason: reason.into(),
            detail: detail.into(),
            metadata: serde_json::Value::Null,
        }
    }

    /// Triggering result.
    pub fn trigger(reason: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            should_block: true,
            reason: reason.into(),
            detail: detail.into(),
            metadata: serde_json::Value::Null,
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Inputs a filter reads.
#[derive(Debug, Clone, Copy)]
pub struct FilterContext<'a> {
    pub bar: &'a Bar,
    pub snapshot: &'a IndicatorSnapshot,
    pub bar_index: u64,
    /// Bars held, already corrected from the audit trail if needed
    pub bars_held: i64,
    pub interval: Interval,
}

impl FilterContext<'_> {
    pub fn price(&self) -> f64 {
        self.bar.close
    }
}

/// Read-only view of a position that only allows the trailing state to move.
///
/// Filters receive this instead of `&mut PositionState` so they cannot
/// touch quantity, entry price or the pending flag.
pub struct PositionView<'a> {
    inner: &'a mut PositionState,
}

impl<'a> PositionView<'a> {
    pub fn new(inner: &'a mut PositionState) -> Self {
        Self { inner }
    }

    /// Advance the high-water mark (monotonic).
    pub fn advance_highest(&mut self, price: f64) {
        self.inner.update_highest_price(price);
    }

    /// Arm the trailing stop if the retracement reached `pct`.
    pub fn arm_trailing_stop(&mut self, pct: f64, price: f64) -> bool {
        self.inner.arm_trailing_stop(pct, price)
    }
}

impl Deref for PositionView<'_> {
    type Target = PositionState;

    fn deref(&self) -> &PositionState {
        self.inner
    }
}

/// A single entry or exit rule.
pub trait Filter: Send + Sync {
    /// Condition key, as used in the condition files.
    fn key(&self) -> &str;

    fn category(&self) -> FilterCategory;

    /// Evaluate the rule. Missing inputs yield a non-triggering result.
    fn evaluate(&self, ctx: &FilterContext<'_>, position: &mut PositionView<'_>) -> FilterResult;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_order() {
        assert!(FilterCategory::CoreStrategy < FilterCategory::BuyFilter);
        assert!(FilterCategory::BuyFilter < FilterCategory::SellAuxiliary);
        assert_eq!(FilterCategory::SellAuxiliary as u8, 3);
    }

    #[test]
    fn test_position_view_only_moves_trailing_state() {
        let mut pos = PositionState::new();
        pos.open_position(1.0, 100.0, 0, 0);
        {
            let mut view = PositionView::new(&mut pos);
            view.advance_highest(130.0);
            assert!(view.arm_trailing_stop(0.1, 110.0));
            assert_eq!(view.quantity, 1.0);
        }
        assert_eq!(pos.highest_price_since_entry, Some(130.0));
        assert!(pos.trailing_armed);
        assert_eq!(pos.avg_entry_price, Some(100.0));
    }
}
