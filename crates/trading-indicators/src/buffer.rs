//! Bounded bar history.

use std::collections::VecDeque;

use trading_core::Bar;

/// Default number of bars kept per engine.
pub const DEFAULT_BUFFER_CAPACITY: usize = 500;

/// Result of appending a bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Appended,
    /// Same timestamp as the last accepted bar
    Duplicate,
    /// Older than the last accepted bar
    OutOfOrder,
}

/// FIFO window of the most recent confirmed bars.
///
/// The oldest bar is evicted on overflow. A `last_timestamp` guard makes
/// re-delivered bars a no-op.
#[derive(Debug, Clone)]
pub struct BarBuffer {
    bars: VecDeque<Bar>,
    capacity: usize,
    last_timestamp: Option<i64>,
}

impl BarBuffer {
    /// Create a buffer holding at most `capacity` bars (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            bars: VecDeque::with_capacity(capacity),
            capacity,
            last_timestamp: None,
        }
    }

    /// Append a bar unless it was already seen.
    pub fn push(&mut self, bar: Bar) -> AppendOutcome {
        match self.check(bar.timestamp) {
            AppendOutcome::Appended => {}
            other => return other,
        }
        if self.bars.len() == self.capacity {
            self.bars.pop_front();
        }
        self.bars.push_back(bar);
        self.last_timestamp = Some(bar.timestamp);
        AppendOutcome::Appended
    }

    /// Classify a timestamp without appending.
    pub fn check(&self, timestamp: i64) -> AppendOutcome {
        match self.last_timestamp {
            Some(last) if timestamp == last => AppendOutcome::Duplicate,
            Some(last) if timestamp < last => AppendOutcome::OutOfOrder,
            _ => AppendOutcome::Appended,
        }
    }

    /// Load warmup history, keeping only the newest `capacity` bars.
    pub fn fill_history(&mut self, bars: &[Bar]) -> usize {
        bars.iter()
            .filter(|b| self.push(**b) == AppendOutcome::Appended)
            .count()
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn last_timestamp(&self) -> Option<i64> {
        self.last_timestamp
    }

    pub fn last(&self) -> Option<&Bar> {
        self.bars.back()
    }

    pub fn last_close(&self) -> Option<f64> {
        self.bars.back().map(|b| b.close)
    }

    /// Closes of the newest `n` bars, oldest first.
    pub fn last_n_closes(&self, n: usize) -> Vec<f64> {
        let skip = self.bars.len().saturating_sub(n);
        self.bars.iter().skip(skip).map(|b| b.close).collect()
    }

    /// All closes, oldest first.
    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Bar> {
        self.bars.iter()
    }
}

impl Default for BarBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_timestamp_is_rejected() {
        let mut buf = BarBuffer::new(10);
        assert_eq!(buf.push(Bar::flat(60_000, 100.0)), AppendOutcome::Appended);
        assert_eq!(buf.push(Bar::flat(60_000, 101.0)), AppendOutcome::Duplicate);
        assert_eq!(buf.len(), 1);
        assert_eq!(buf.last_close(), Some(100.0));
    }

    #[test]
    fn test_out_of_order_is_rejected() {
        let mut buf = BarBuffer::new(10);
        buf.push(Bar::flat(120_000, 1.0));
        assert_eq!(buf.push(Bar::flat(60_000, 2.0)), AppendOutcome::OutOfOrder);
        assert_eq!(buf.last_timestamp(), Some(120_000));
    }

    #[test]
    fn test_fifo_eviction() {
        let mut buf = BarBuffer::new(3);
        for i in 0..5 {
            buf.push(Bar::flat(i * 60_000, i as f64));
        }
        assert_eq!(buf.len(), 3);
        assert_eq!(buf.closes(), vec![2.0, 3.0, 4.0]);
        assert_eq!(buf.last_n_closes(2), vec![3.0, 4.0]);
        assert_eq!(buf.last_n_closes(10), vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_fill_history_skips_duplicates() {
        let mut buf = BarBuffer::default();
        let bars = vec![Bar::flat(0, 1.0), Bar::flat(0, 1.0), Bar::flat(60_000, 2.0)];
        assert_eq!(buf.fill_history(&bars), 2);
        assert_eq!(buf.capacity(), DEFAULT_BUFFER_CAPACITY);
    }
}
