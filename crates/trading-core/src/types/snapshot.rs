//! Indicator snapshot and cross detection.

use serde::{Deserialize, Serialize};

/// Indicator values after the most recent bar.
///
/// `prev_*` hold the values from one bar earlier and are `None` right after
/// seeding, so no cross can fire on the first update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    pub macd: Option<f64>,
    pub signal: Option<f64>,
    pub histogram: Option<f64>,
    pub prev_macd: Option<f64>,
    pub prev_signal: Option<f64>,
    pub ema_fast: Option<f64>,
    pub ema_slow: Option<f64>,
    pub ema_base: Option<f64>,
    pub prev_ema_fast: Option<f64>,
    pub prev_ema_slow: Option<f64>,
    pub ma20: Option<f64>,
    pub ma60: Option<f64>,
    pub bars_processed: u64,
}

impl IndicatorSnapshot {
    /// MACD crossed above its signal line on this bar.
    pub fn macd_golden_cross(&self) -> bool {
        golden_cross(self.prev_macd, self.prev_signal, self.macd, self.signal)
    }

    /// MACD crossed below its signal line on this bar.
    pub fn macd_dead_cross(&self) -> bool {
        dead_cross(self.prev_macd, self.prev_signal, self.macd, self.signal)
    }

    /// Fast EMA crossed above the slow EMA on this bar.
    pub fn ema_golden_cross(&self) -> bool {
        golden_cross(self.prev_ema_fast, self.prev_ema_slow, self.ema_fast, self.ema_slow)
    }

    /// Fast EMA crossed below the slow EMA on this bar.
    pub fn ema_dead_cross(&self) -> bool {
        dead_cross(self.prev_ema_fast, self.prev_ema_slow, self.ema_fast, self.ema_slow)
    }
}

/// `a` crossed above `b`: `prev_a <= prev_b && a > b`. False on any missing value.
pub fn golden_cross(prev_a: Option<f64>, prev_b: Option<f64>, a: Option<f64>, b: Option<f64>) -> bool {
    match (prev_a, prev_b, a, b) {
        (Some(pa), Some(pb), Some(a), Some(b)) => pa <= pb && a > b,
        _ => false,
    }
}

/// `a` crossed below `b`: `prev_a >= prev_b && a < b`. False on any missing value.
pub fn dead_cross(prev_a: Option<f64>, prev_b: Option<f64>, a: Option<f64>, b: Option<f64>) -> bool {
    match (prev_a, prev_b, a, b) {
        (Some(pa), Some(pb), Some(a), Some(b)) => pa >= pb && a < b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cross_requires_previous_values() {
        assert!(!golden_cross(None, Some(1.0), Some(2.0), Some(1.0)));
        assert!(!dead_cross(Some(2.0), None, Some(0.0), Some(1.0)));
    }

    #[test]
    fn test_equality_on_losing_side() {
        // Touching then crossing counts once
        assert!(golden_cross(Some(1.0), Some(1.0), Some(1.5), Some(1.0)));
        // Equal now is not a cross yet
        assert!(!golden_cross(Some(0.5), Some(1.0), Some(1.0), Some(1.0)));
        // Already above stays above: no cross
        assert!(!golden_cross(Some(1.2), Some(1.0), Some(1.5), Some(1.0)));

        assert!(dead_cross(Some(1.0), Some(1.0), Some(0.5), Some(1.0)));
        assert!(!dead_cross(Some(1.5), Some(1.0), Some(1.0), Some(1.0)));
    }

    #[test]
    fn test_snapshot_helpers() {
        let snap = IndicatorSnapshot {
            macd: Some(0.2),
            signal: Some(0.1),
            prev_macd: Some(-0.1),
            prev_signal: Some(0.0),
            ema_fast: Some(99.0),
            ema_slow: Some(100.0),
            prev_ema_fast: Some(101.0),
            prev_ema_slow: Some(100.0),
            ..Default::default()
        };
        assert!(snap.macd_golden_cross());
        assert!(!snap.macd_dead_cross());
        assert!(snap.ema_dead_cross());
        assert!(!snap.ema_golden_cross());
    }
}
