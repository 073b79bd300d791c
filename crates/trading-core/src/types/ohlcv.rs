//! OHLCV (Open, High, Low, Close, Volume) bar type.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One OHLCV observation for a fixed interval.
///
/// Prices are `f64` for fast indicator arithmetic. A bar is immutable once
/// built; only bars with `is_closed == true` may enter the processing pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    /// Unix timestamp in milliseconds (bar open time)
    pub timestamp: i64,
    /// Opening price
    pub open: f64,
    /// Highest price
    pub high: f64,
    /// Lowest price
    pub low: f64,
    /// Closing price
    pub close: f64,
    /// Trading volume
    pub volume: f64,
    /// Whether the interval has finished
    pub is_closed: bool,
}

impl Bar {
    /// Create a new confirmed (closed) bar.
    pub fn new(timestamp: i64, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
            is_closed: true,
        }
    }

    /// Create a bar for an interval that is still forming.
    pub fn forming(timestamp: i64, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            is_closed: false,
            ..Self::new(timestamp, open, high, low, close, volume)
        }
    }

    /// Convenience constructor for a flat bar at a single price.
    pub fn flat(timestamp: i64, price: f64) -> Self {
        Self::new(timestamp, price, price, price, price, 0.0)
    }

    /// Check if the bar is bullish (close > open).
    #[inline]
    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    /// Get the timestamp as a DateTime.
    pub fn datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.timestamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bar_direction() {
        let bar = Bar::new(1000, 100.0, 110.0, 95.0, 105.0, 1_000_000.0);
        assert!(bar.is_bullish());
        assert!(bar.is_closed);

        let bar = Bar::new(1000, 105.0, 110.0, 95.0, 100.0, 1_000_000.0);
        assert!(!bar.is_bullish());

        // Equal open/close is not bullish
        assert!(!Bar::flat(1000, 100.0).is_bullish());
    }

    #[test]
    fn test_forming_bar() {
        let bar = Bar::forming(60_000, 1.0, 2.0, 0.5, 1.5, 10.0);
        assert!(!bar.is_closed);
        assert_eq!(bar.close, 1.5);
    }

    #[test]
    fn test_bar_datetime() {
        let bar = Bar::flat(1_700_000_000_000, 1.0);
        assert_eq!(bar.datetime().map(|d| d.timestamp()), Some(1_700_000_000));
    }
}
