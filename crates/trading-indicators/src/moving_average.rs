//! Moving average indicators.
//!
//! The batch [`Ema`] computes over a whole series and serves as the
//! reference implementation. Incremental forms ([`IncrementalEma`],
//! [`RollingSma`]) are what the live pipeline uses.

use std::collections::VecDeque;

use trading_core::traits::{Indicator, StreamingIndicator};
use trading_core::IndicatorError;

/// Exponential Moving Average (EMA).
///
/// Seeded with the SMA of the first `period` values, then
/// `ema = alpha * price + (1 - alpha) * ema` with `alpha = 2 / (period + 1)`.
#[derive(Debug, Clone)]
pub struct Ema {
    period: usize,
    multiplier: f64,
}

impl Ema {
    /// Create a new EMA with the specified period.
    pub fn new(period: usize) -> Self {
        assert!(period > 0, "Period must be greater than 0");
        Self {
            period,
            multiplier: ema_alpha(period),
        }
    }
}

impl Indicator for Ema {
    type Output = f64;

    fn calculate(&self, data: &[f64]) -> Vec<f64> {
        if data.len() < self.period {
            return vec![];
        }

        let mut result = Vec::with_capacity(data.len() - self.period + 1);

        let initial_sma: f64 = data[..self.period].iter().sum::<f64>() / self.period as f64;
        result.push(initial_sma);

        let mut ema = initial_sma;
        let one_minus_mult = 1.0 - self.multiplier;

        for &price in &data[self.period..] {
            ema = price * self.multiplier + ema * one_minus_mult;
            result.push(ema);
        }

        result
    }

    fn period(&self) -> usize {
        self.period
    }

    fn name(&self) -> &str {
        "EMA"
    }
}

/// Smoothing factor of an EMA with the given period.
#[inline]
pub fn ema_alpha(period: usize) -> f64 {
    2.0 / (period as f64 + 1.0)
}

/// EMA that is seeded once from a window of closes and then advanced one
/// value at a time.
///
/// The seed is the SMA of the *last* `period` values of the seed window.
/// The value before the latest update is kept for cross detection and is
/// cleared by seeding.
#[derive(Debug, Clone)]
pub struct IncrementalEma {
    period: usize,
    alpha: f64,
    current: Option<f64>,
    previous: Option<f64>,
}

impl IncrementalEma {
    /// Create an unseeded EMA.
    pub fn new(period: usize) -> Result<Self, IndicatorError> {
        if period == 0 {
            return Err(IndicatorError::InvalidParameter(
                "EMA period must be greater than 0".into(),
            ));
        }
        Ok(Self {
            period,
            alpha: ema_alpha(period),
            current: None,
            previous: None,
        })
    }

    /// Seed from a window of closes, oldest first.
    pub fn seed(&mut self, closes: &[f64]) -> Result<f64, IndicatorError> {
        if closes.len() < self.period {
            return Err(IndicatorError::InsufficientData {
                required: self.period,
                available: closes.len(),
            });
        }
        let window = &closes[closes.len() - self.period..];
        let sma = window.iter().sum::<f64>() / self.period as f64;
        self.current = Some(sma);
        self.previous = None;
        Ok(sma)
    }

    /// Value before the most recent update.
    pub fn previous(&self) -> Option<f64> {
        self.previous
    }

    /// Drop the previous value, as seeding does.
    pub fn forget_previous(&mut self) {
        self.previous = None;
    }
}

impl StreamingIndicator for IncrementalEma {
    type Output = f64;

    /// Advance by one value. Unseeded EMAs ignore the value.
    fn update(&mut self, value: f64) -> Option<f64> {
        let ema = self.current?;
        self.previous = Some(ema);
        let next = self.alpha * value + (1.0 - self.alpha) * ema;
        self.current = Some(next);
        self.current
    }

    fn current(&self) -> Option<f64> {
        self.current
    }

    fn reset(&mut self) {
        self.current = None;
        self.previous = None;
    }

    fn is_ready(&self) -> bool {
        self.current.is_some()
    }

    fn period(&self) -> usize {
        self.period
    }
}

/// Simple moving average over a sliding window, updated per value.
#[derive(Debug, Clone)]
pub struct RollingSma {
    period: usize,
    window: VecDeque<f64>,
    sum: f64,
}

impl RollingSma {
    pub fn new(period: usize) -> Result<Self, IndicatorError> {
        if period == 0 {
            return Err(IndicatorError::InvalidParameter(
                "SMA period must be greater than 0".into(),
            ));
        }
        Ok(Self {
            period,
            window: VecDeque::with_capacity(period),
            sum: 0.0,
        })
    }

    /// Prime the window with the tail of a close series.
    pub fn prime(&mut self, closes: &[f64]) {
        self.reset();
        let start = closes.len().saturating_sub(self.period);
        for &c in &closes[start..] {
            self.update(c);
        }
    }
}

impl StreamingIndicator for RollingSma {
    type Output = f64;

    fn update(&mut self, value: f64) -> Option<f64> {
        self.window.push_back(value);
        self.sum += value;
        if self.window.len() > self.period {
            if let Some(old) = self.window.pop_front() {
                self.sum -= old;
            }
        }
        self.current()
    }

    fn current(&self) -> Option<f64> {
        if self.is_ready() {
            Some(self.sum / self.period as f64)
        } else {
            None
        }
    }

    fn reset(&mut self) {
        self.window.clear();
        self.sum = 0.0;
    }

    fn is_ready(&self) -> bool {
        self.window.len() == self.period
    }

    fn period(&self) -> usize {
        self.period
    }
}
