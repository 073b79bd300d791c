//! How much history an engine fetches before trading.

use tracing::warn;
use trading_core::types::Interval;
use trading_strategies::StrategyKind;

/// Floor applied to every history request.
pub const MIN_HISTORY: usize = 200;

/// History length the variant prefers on an interval.
///
/// MACD keeps more history on short intervals so its slow EMA and signal
/// line settle before the first decision.
pub fn preferred_history(kind: StrategyKind, interval: Interval) -> usize {
    match kind {
        StrategyKind::Ema => 200,
        StrategyKind::Macd => match interval {
            Interval::Minute1 | Interval::Minute3 => 600,
            Interval::Minute5 => 500,
            Interval::Minute10 => 400,
            Interval::Minute15 | Interval::Minute30 | Interval::Minute60 => 300,
            Interval::Day => 200,
        },
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WarmupPlan {
    /// Bars the variant would like
    pub required: usize,
    /// Bars actually requested from the exchange
    pub fetch: usize,
    pub capped: bool,
}

/// `max(table, 2 * slow, 200)`, capped at the exchange fetch limit.
pub fn plan(kind: StrategyKind, interval: Interval, slow_period: usize, fetch_limit: usize) -> WarmupPlan {
    let required = preferred_history(kind, interval)
        .max(slow_period.saturating_mul(2))
        .max(MIN_HISTORY);
    let fetch = required.min(fetch_limit);
    let capped = fetch < required;
    if capped {
        warn!(%kind, %interval, required, fetch, "Warmup history capped by exchange fetch limit");
    }
    WarmupPlan {
        required,
        fetch,
        capped,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_macd_table() {
        assert_eq!(preferred_history(StrategyKind::Macd, Interval::Minute3), 600);
        assert_eq!(preferred_history(StrategyKind::Macd, Interval::Minute10), 400);
        assert_eq!(preferred_history(StrategyKind::Macd, Interval::Day), 200);
        assert_eq!(preferred_history(StrategyKind::Ema, Interval::Minute1), 200);
    }

    #[test]
    fn test_plan_caps_at_fetch_limit() {
        let p = plan(StrategyKind::Macd, Interval::Minute5, 26, 200);
        assert_eq!(p.required, 500);
        assert_eq!(p.fetch, 200);
        assert!(p.capped);

        let p = plan(StrategyKind::Ema, Interval::Minute60, 60, 200);
        assert_eq!(p, WarmupPlan { required: 200, fetch: 200, capped: false });

        // A long slow period drives the requirement
        let p = plan(StrategyKind::Ema, Interval::Day, 150, 1000);
        assert_eq!(p.required, 300);
        assert_eq!(p.fetch, 300);
    }
}
