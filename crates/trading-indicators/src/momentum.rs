//! Momentum indicators.

use serde::{Deserialize, Serialize};
use trading_core::traits::Indicator;

use crate::moving_average::{ema_alpha, Ema};

/// MACD (Moving Average Convergence Divergence) output.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MacdOutput {
    /// MACD line (fast EMA - slow EMA)
    pub macd: f64,
    /// Signal line (EMA of MACD)
    pub signal: f64,
    /// Histogram (MACD - Signal)
    pub histogram: f64,
}

/// Batch MACD.
///
/// Both EMAs are seeded at the end of the first `slow` values (each from the
/// SMA of its own trailing window) and the signal line starts at the first
/// MACD value. This is exactly what the live [`IndicatorState`] does after
/// seeding with `slow` closes, so the two can be compared bar for bar.
///
/// [`IndicatorState`]: crate::IndicatorState
#[derive(Debug, Clone)]
pub struct Macd {
    fast_period: usize,
    slow_period: usize,
    signal_period: usize,
}

impl Macd {
    /// Create a new MACD with default parameters (12, 26, 9).
    pub fn new() -> Self {
        Self::with_periods(12, 26, 9)
    }

    /// Create a MACD with custom periods.
    pub fn with_periods(fast: usize, slow: usize, signal: usize) -> Self {
        assert!(fast > 0 && slow > 0 && signal > 0);
        assert!(fast < slow, "Fast period must be less than slow period");
        Self {
            fast_period: fast,
            slow_period: slow,
            signal_period: signal,
        }
    }

    /// Minimum number of values before the first output.
    pub fn period(&self) -> usize {
        self.slow_period
    }

    /// One output per value from index `slow - 1` on.
    pub fn calculate(&self, data: &[f64]) -> Vec<MacdOutput> {
        if data.len() < self.slow_period {
            return vec![];
        }

        let offset = self.slow_period - self.fast_period;
        let fast = Ema::new(self.fast_period).calculate(&data[offset..]);
        let slow = Ema::new(self.slow_period).calculate(data);

        let alpha = ema_alpha(self.signal_period);
        let mut signal: Option<f64> = None;

        fast.iter()
            .zip(slow.iter())
            .map(|(f, s)| {
                let macd = f - s;
                let next = match signal {
                    None => macd,
                    Some(prev) => alpha * macd + (1.0 - alpha) * prev,
                };
                signal = Some(next);
                MacdOutput {
                    macd,
                    signal: next,
                    histogram: macd - next,
                }
            })
            .collect()
    }
}

impl Default for Macd {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_macd_output_alignment() {
        let macd = Macd::with_periods(3, 5, 2);
        let data: Vec<f64> = (1..=10).map(|i| i as f64).collect();
        let out = macd.calculate(&data);

        assert_eq!(out.len(), 6);
        // First output: signal starts at MACD, histogram zero
        assert!((out[0].macd - out[0].signal).abs() < 1e-12);
        assert!(out[0].histogram.abs() < 1e-12);
        // Rising series keeps the fast EMA above the slow one
        assert!(out.iter().all(|o| o.macd > 0.0));
    }

    #[test]
    fn test_macd_flat_series_is_zero() {
        let macd = Macd::default();
        let out = macd.calculate(&[100.0; 40]);
        assert_eq!(out.len(), 15);
        assert!(out.iter().all(|o| o.macd.abs() < 1e-12 && o.signal.abs() < 1e-12));
    }

    #[test]
    fn test_macd_insufficient_data() {
        assert!(Macd::default().calculate(&[1.0; 10]).is_empty());
    }
}
