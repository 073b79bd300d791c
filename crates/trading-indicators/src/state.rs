//! Incrementally maintained indicator state for one engine.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use trading_core::traits::StreamingIndicator;
use trading_core::{IndicatorError, IndicatorSnapshot, Side};

use crate::moving_average::{ema_alpha, IncrementalEma, RollingSma};

/// Periods of the extra EMA pairs used when entries and exits follow
/// different crosses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeparateEmaPeriods {
    pub fast_buy: usize,
    pub slow_buy: usize,
    pub fast_sell: usize,
    pub slow_sell: usize,
}

/// Periods the state is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndicatorConfig {
    pub fast_period: usize,
    pub slow_period: usize,
    pub signal_period: usize,
    pub base_period: Option<usize>,
    pub separate: Option<SeparateEmaPeriods>,
}

impl IndicatorConfig {
    pub fn new(fast_period: usize, slow_period: usize, signal_period: usize) -> Self {
        Self {
            fast_period,
            slow_period,
            signal_period,
            base_period: None,
            separate: None,
        }
    }

    pub fn with_base(mut self, period: usize) -> Self {
        self.base_period = Some(period);
        self
    }

    pub fn with_separate(mut self, periods: SeparateEmaPeriods) -> Self {
        self.separate = Some(periods);
        self
    }

    /// Number of closes `seed` needs.
    pub fn required_closes(&self) -> usize {
        let mut required = self.slow_period.max(self.fast_period);
        if let Some(base) = self.base_period {
            required = required.max(base);
        }
        if let Some(s) = self.separate {
            required = required.max(s.slow_buy).max(s.slow_sell);
        }
        required
    }
}

#[derive(Debug, Clone)]
struct EmaPair {
    fast: IncrementalEma,
    slow: IncrementalEma,
}

impl EmaPair {
    fn new(fast: usize, slow: usize) -> Result<Self, IndicatorError> {
        if fast >= slow {
            return Err(IndicatorError::InvalidParameter(format!(
                "fast period {} must be less than slow period {}",
                fast, slow
            )));
        }
        Ok(Self {
            fast: IncrementalEma::new(fast)?,
            slow: IncrementalEma::new(slow)?,
        })
    }

    fn seed(&mut self, closes: &[f64]) -> Result<(), IndicatorError> {
        self.fast.seed(closes)?;
        self.slow.seed(closes)?;
        Ok(())
    }

    fn update(&mut self, close: f64) {
        self.fast.update(close);
        self.slow.update(close);
    }

    fn forget_previous(&mut self) {
        self.fast.forget_previous();
        self.slow.forget_previous();
    }

    fn apply_to(&self, snap: &mut IndicatorSnapshot) {
        snap.ema_fast = self.fast.current();
        snap.ema_slow = self.slow.current();
        snap.prev_ema_fast = self.fast.previous();
        snap.prev_ema_slow = self.slow.previous();
    }
}

/// EMA/MACD/MA state that is seeded once and then updated one close at a time.
///
/// MACD is `ema_fast - ema_slow` on the main pair; its signal line starts at
/// the seeded MACD value. The state never recomputes from history after
/// seeding.
///
/// Previous values stay unset through the first update after a seed, so a
/// cross needs two live closes.
#[derive(Debug, Clone)]
pub struct IndicatorState {
    config: IndicatorConfig,
    main: EmaPair,
    buy: Option<EmaPair>,
    sell: Option<EmaPair>,
    base: Option<IncrementalEma>,
    signal_alpha: f64,
    macd: Option<f64>,
    prev_macd: Option<f64>,
    signal: Option<f64>,
    prev_signal: Option<f64>,
    ma20: RollingSma,
    ma60: RollingSma,
    bars_processed: u64,
    seeded: bool,
    /// No live close applied since the last seed
    fresh_seed: bool,
}

impl IndicatorState {
    pub fn new(config: IndicatorConfig) -> Result<Self, IndicatorError> {
        if config.signal_period == 0 {
            return Err(IndicatorError::InvalidParameter(
                "signal period must be greater than 0".into(),
            ));
        }
        let (buy, sell) = match config.separate {
            Some(s) => (
                Some(EmaPair::new(s.fast_buy, s.slow_buy)?),
                Some(EmaPair::new(s.fast_sell, s.slow_sell)?),
            ),
            None => (None, None),
        };
        let base = config.base_period.map(IncrementalEma::new).transpose()?;

        Ok(Self {
            config,
            main: EmaPair::new(config.fast_period, config.slow_period)?,
            buy,
            sell,
            base,
            signal_alpha: ema_alpha(config.signal_period),
            macd: None,
            prev_macd: None,
            signal: None,
            prev_signal: None,
            ma20: RollingSma::new(20)?,
            ma60: RollingSma::new(60)?,
            bars_processed: 0,
            seeded: false,
            fresh_seed: false,
        })
    }

    pub fn config(&self) -> &IndicatorConfig {
        &self.config
    }

    pub fn is_seeded(&self) -> bool {
        self.seeded
    }

    pub fn bars_processed(&self) -> u64 {
        self.bars_processed
    }

    /// Seed every indicator from a window of closes, oldest first.
    ///
    /// Each EMA starts at the SMA of its own trailing window; the MACD signal
    /// starts at the MACD value and all previous values are cleared.
    pub fn seed(&mut self, closes: &[f64]) -> Result<(), IndicatorError> {
        let required = self.config.required_closes();
        if closes.len() < required {
            return Err(IndicatorError::InsufficientData {
                required,
                available: closes.len(),
            });
        }

        self.main.seed(closes)?;
        if let Some(pair) = self.buy.as_mut() {
            pair.seed(closes)?;
        }
        if let Some(pair) = self.sell.as_mut() {
            pair.seed(closes)?;
        }
        if let Some(base) = self.base.as_mut() {
            base.seed(closes)?;
        }

        let macd = match (self.main.fast.current(), self.main.slow.current()) {
            (Some(f), Some(s)) => f - s,
            _ => 0.0,
        };
        self.macd = Some(macd);
        self.signal = Some(macd);
        self.prev_macd = None;
        self.prev_signal = None;

        self.ma20.prime(closes);
        self.ma60.prime(closes);

        self.bars_processed = 0;
        self.seeded = true;
        self.fresh_seed = true;
        debug!(
            closes = closes.len(),
            ema_fast = ?self.main.fast.current(),
            ema_slow = ?self.main.slow.current(),
            macd,
            "Indicators seeded"
        );
        Ok(())
    }

    /// Apply one new close.
    ///
    /// Returns `None` (and logs a warning) when called before seeding.
    pub fn update(&mut self, close: f64) -> Option<IndicatorSnapshot> {
        if !self.seeded {
            warn!(close, "Indicator update before seeding ignored");
            return None;
        }

        self.main.update(close);
        if let Some(pair) = self.buy.as_mut() {
            pair.update(close);
        }
        if let Some(pair) = self.sell.as_mut() {
            pair.update(close);
        }
        if let Some(base) = self.base.as_mut() {
            base.update(close);
        }

        if self.fresh_seed {
            // Seeded values are not observations
            self.main.forget_previous();
            for pair in [self.buy.as_mut(), self.sell.as_mut()].into_iter().flatten() {
                pair.forget_previous();
            }
            self.prev_macd = None;
            self.prev_signal = None;
            self.fresh_seed = false;
        } else {
            self.prev_macd = self.macd;
            self.prev_signal = self.signal;
        }
        if let (Some(f), Some(s)) = (self.main.fast.current(), self.main.slow.current()) {
            let macd = f - s;
            let signal = match self.signal {
                Some(prev) => self.signal_alpha * macd + (1.0 - self.signal_alpha) * prev,
                None => macd,
            };
            self.macd = Some(macd);
            self.signal = Some(signal);
        }

        self.ma20.update(close);
        self.ma60.update(close);
        self.bars_processed += 1;

        Some(self.snapshot())
    }

    /// Snapshot using the main EMA pair.
    pub fn snapshot(&self) -> IndicatorSnapshot {
        let mut snap = IndicatorSnapshot {
            macd: self.macd,
            signal: self.signal,
            histogram: match (self.macd, self.signal) {
                (Some(m), Some(s)) => Some(m - s),
                _ => None,
            },
            prev_macd: self.prev_macd,
            prev_signal: self.prev_signal,
            ema_base: self.base.as_ref().and_then(|b| b.current()),
            ma20: self.ma20.current(),
            ma60: self.ma60.current(),
            bars_processed: self.bars_processed,
            ..Default::default()
        };
        self.main.apply_to(&mut snap);
        snap
    }

    /// Snapshot whose EMA pair matches the side being evaluated.
    ///
    /// Without separate pairs this is the same as [`snapshot`](Self::snapshot).
    pub fn snapshot_for(&self, side: Side) -> IndicatorSnapshot {
        let mut snap = self.snapshot();
        let pair = match side {
            Side::Buy => self.buy.as_ref(),
            Side::Sell => self.sell.as_ref(),
        };
        if let Some(pair) = pair {
            pair.apply_to(&mut snap);
        }
        snap
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::momentum::Macd;
    use crate::moving_average::Ema;
    use trading_core::traits::Indicator;

    fn series(n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| 100.0 + (i as f64 * 0.21).sin() * 5.0 + i as f64 * 0.05)
            .collect()
    }

    fn close_rel(a: f64, b: f64) -> bool {
        (a - b).abs() <= 1e-9 * a.abs().max(b.abs()).max(1.0)
    }

    #[test]
    fn test_update_before_seed_is_noop() {
        let mut state = IndicatorState::new(IndicatorConfig::new(12, 26, 9)).unwrap();
        assert!(state.update(100.0).is_none());
        assert_eq!(state.bars_processed(), 0);
        assert!(!state.is_seeded());
    }

    #[test]
    fn test_seed_requires_enough_closes() {
        let mut state = IndicatorState::new(IndicatorConfig::new(12, 26, 9).with_base(50)).unwrap();
        let err = state.seed(&[100.0; 30]).unwrap_err();
        assert_eq!(
            err,
            IndicatorError::InsufficientData {
                required: 50,
                available: 30
            }
        );
    }

    #[test]
    fn test_invalid_periods() {
        assert!(IndicatorState::new(IndicatorConfig::new(26, 12, 9)).is_err());
        assert!(IndicatorState::new(IndicatorConfig::new(12, 26, 0)).is_err());
    }

    #[test]
    fn test_seed_sets_signal_to_macd() {
        let mut state = IndicatorState::new(IndicatorConfig::new(3, 5, 2)).unwrap();
        state.seed(&[1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();
        let snap = state.snapshot();
        // fast = mean(3,4,5) = 4, slow = mean(1..=5) = 3
        assert!(close_rel(snap.macd.unwrap(), 1.0));
        assert_eq!(snap.macd, snap.signal);
        assert_eq!(snap.histogram, Some(0.0));
        assert_eq!(snap.prev_macd, None);
        assert_eq!(snap.prev_ema_fast, None);
    }

    #[test]
    fn test_incremental_macd_matches_batch() {
        let data = series(400);
        let slow = 26;
        let mut state = IndicatorState::new(IndicatorConfig::new(12, slow, 9)).unwrap();
        state.seed(&data[..slow]).unwrap();

        let batch = Macd::with_periods(12, slow, 9).calculate(&data);
        for (i, &close) in data[slow..].iter().enumerate() {
            let snap = state.update(close).unwrap();
            let expected = batch[i + 1];
            assert!(close_rel(snap.macd.unwrap(), expected.macd));
            assert!(close_rel(snap.signal.unwrap(), expected.signal));
            assert!(close_rel(snap.histogram.unwrap(), expected.histogram));
        }
        assert_eq!(state.bars_processed(), (data.len() - slow) as u64);
    }

    #[test]
    fn test_incremental_ema_matches_batch_with_long_seed() {
        let data = series(300);
        let seed_len = 120;
        let mut state = IndicatorState::new(IndicatorConfig::new(12, 26, 9).with_base(100)).unwrap();
        state.seed(&data[..seed_len]).unwrap();
        let mut snap = state.snapshot();
        for &c in &data[seed_len..] {
            snap = state.update(c).unwrap();
        }

        for (period, value) in [(12, snap.ema_fast), (26, snap.ema_slow), (100, snap.ema_base)] {
            let batch = Ema::new(period).calculate(&data[seed_len - period..]);
            assert!(close_rel(value.unwrap(), *batch.last().unwrap()));
        }
    }

    #[test]
    fn test_flat_seed_then_rising_closes() {
        let mut state = IndicatorState::new(IndicatorConfig::new(12, 26, 9)).unwrap();
        state.seed(&[100.0; 30]).unwrap();

        let mut last_macd = state.snapshot().macd.unwrap();
        for close in 101..=110 {
            let snap = state.update(close as f64).unwrap();
            let macd = snap.macd.unwrap();
            assert!(macd > last_macd);
            assert!(!snap.macd_golden_cross());
            last_macd = macd;
        }
    }

    #[test]
    fn test_first_update_after_flat_seed_has_no_previous() {
        let mut state = IndicatorState::new(IndicatorConfig::new(12, 26, 9)).unwrap();
        state.seed(&[100.0; 30]).unwrap();

        let first = state.update(101.0).unwrap();
        assert!(first.macd.unwrap() > first.signal.unwrap());
        assert_eq!(first.prev_macd, None);
        assert_eq!(first.prev_signal, None);
        assert_eq!(first.prev_ema_fast, None);
        assert_eq!(first.prev_ema_slow, None);
        assert!(!first.macd_golden_cross());
        assert!(!first.ema_golden_cross());

        let second = state.update(102.0).unwrap();
        assert_eq!(second.prev_macd, first.macd);
        assert_eq!(second.prev_ema_fast, first.ema_fast);
    }

    #[test]
    fn test_reseed_clears_previous_again() {
        let mut state = IndicatorState::new(IndicatorConfig::new(3, 5, 2)).unwrap();
        state.seed(&[10.0; 5]).unwrap();
        state.update(11.0).unwrap();
        assert!(state.update(12.0).unwrap().prev_macd.is_some());

        state.seed(&[10.0; 5]).unwrap();
        assert_eq!(state.update(11.0).unwrap().prev_macd, None);
    }

    #[test]
    fn test_prev_values_track_previous_bar() {
        let mut state = IndicatorState::new(IndicatorConfig::new(3, 5, 2)).unwrap();
        state.seed(&[10.0; 5]).unwrap();
        let first = state.update(12.0).unwrap();
        let second = state.update(9.0).unwrap();
        assert_eq!(second.prev_macd, first.macd);
        assert_eq!(second.prev_signal, first.signal);
        assert_eq!(second.prev_ema_fast, first.ema_fast);
        assert_eq!(second.prev_ema_slow, first.ema_slow);
    }

    #[test]
    fn test_separate_pairs() {
        let config = IndicatorConfig::new(12, 26, 9).with_separate(SeparateEmaPeriods {
            fast_buy: 5,
            slow_buy: 10,
            fast_sell: 20,
            slow_sell: 40,
        });
        assert_eq!(config.required_closes(), 40);

        let data = series(100);
        let mut state = IndicatorState::new(config).unwrap();
        state.seed(&data[..40]).unwrap();
        state.update(data[40]).unwrap();

        let buy = state.snapshot_for(Side::Buy);
        let sell = state.snapshot_for(Side::Sell);
        let main = state.snapshot();
        assert_ne!(buy.ema_fast, main.ema_fast);
        assert_ne!(sell.ema_slow, main.ema_slow);
        // MACD comes from the main pair on every side
        assert_eq!(buy.macd, main.macd);
        assert_eq!(sell.macd, main.macd);

        let expected = Ema::new(5).calculate(&data[35..41]);
        assert!(close_rel(buy.ema_fast.unwrap(), *expected.last().unwrap()));
    }

    #[test]
    fn test_moving_averages_available_after_enough_bars() {
        let mut state = IndicatorState::new(IndicatorConfig::new(12, 26, 9)).unwrap();
        let data = series(70);
        state.seed(&data[..30]).unwrap();
        assert!(state.snapshot().ma20.is_some());
        assert!(state.snapshot().ma60.is_none());

        let mut snap = state.snapshot();
        for &c in &data[30..] {
            snap = state.update(c).unwrap();
        }
        let expected = data[10..].iter().sum::<f64>() / 60.0;
        assert!(close_rel(snap.ma60.unwrap(), expected));
    }
}
