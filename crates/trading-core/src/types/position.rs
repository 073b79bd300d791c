//! Per-user position state machine.

use serde::{Deserialize, Serialize};

/// Single-ticker long position held by one engine.
///
/// Lifecycle is `EMPTY -> OPEN -> EMPTY` via [`open_position`] and
/// [`close_position`]. `pending` is an orthogonal flag that is set while an
/// order is in flight; the orchestrator refuses new orders while it is set.
///
/// Only the orchestrator mutates the core fields. Filters may advance
/// `highest_price_since_entry` and `trailing_armed`, never anything else.
///
/// [`open_position`]: PositionState::open_position
/// [`close_position`]: PositionState::close_position
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PositionState {
    pub has_position: bool,
    pub quantity: f64,
    pub avg_entry_price: Option<f64>,
    pub entry_bar_index: Option<u64>,
    /// Entry bar timestamp (ms)
    pub entry_timestamp: Option<i64>,
    pub pending: bool,
    pub highest_price_since_entry: Option<f64>,
    pub trailing_armed: bool,
}

impl PositionState {
    /// Create an empty position.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a position. Clears `pending` and resets the trailing state.
    pub fn open_position(&mut self, quantity: f64, price: f64, bar_index: u64, timestamp: i64) {
        self.has_position = true;
        self.quantity = quantity;
        self.avg_entry_price = Some(price);
        self.entry_bar_index = Some(bar_index);
        self.entry_timestamp = Some(timestamp);
        self.highest_price_since_entry = Some(price);
        self.trailing_armed = false;
        self.pending = false;
    }

    /// Reset to the empty state.
    pub fn close_position(&mut self) {
        *self = Self::default();
    }

    pub fn set_pending(&mut self, pending: bool) {
        self.pending = pending;
    }

    /// Advance the high-water mark. No-op without a position.
    pub fn update_highest_price(&mut self, price: f64) {
        if !self.has_position {
            return;
        }
        self.highest_price_since_entry = Some(match self.highest_price_since_entry {
            Some(h) if h >= price => h,
            _ => price,
        });
    }

    /// Check the retracement from the high-water mark against `pct`.
    ///
    /// Arms the trailing stop once `(highest - price) / highest >= pct`.
    pub fn arm_trailing_stop(&mut self, pct: f64, price: f64) -> bool {
        if !self.has_position {
            return false;
        }
        let Some(highest) = self.highest_price_since_entry else {
            return false;
        };
        if highest <= 0.0 {
            return false;
        }
        if (highest - price) / highest >= pct {
            self.trailing_armed = true;
        }
        self.trailing_armed
    }

    /// Unrealized return relative to the entry price; `None` when empty.
    pub fn pnl_pct(&self, price: f64) -> Option<f64> {
        if !self.has_position {
            return None;
        }
        match self.avg_entry_price {
            Some(avg) if avg > 0.0 => Some((price - avg) / avg),
            _ => None,
        }
    }

    /// Bars elapsed since entry; 0 when empty.
    pub fn bars_held(&self, current_bar_index: u64) -> i64 {
        match (self.has_position, self.entry_bar_index) {
            (true, Some(entry)) => current_bar_index as i64 - entry as i64,
            _ => 0,
        }
    }

    /// Best return seen since entry, based on the high-water mark.
    pub fn max_gain_since_entry(&self) -> Option<f64> {
        let avg = self.avg_entry_price.filter(|a| *a > 0.0)?;
        let highest = self.highest_price_since_entry?;
        Some((highest - avg) / avg)
    }
}
