//! Strategy trait definitions.

use crate::error::StrategyError;
use crate::types::{Bar, Decision, IndicatorSnapshot, Interval, PositionState, Side};

/// Configuration trait for strategies.
pub trait StrategyConfig: Send + Sync + Clone + 'static {
    /// Validate the configuration.
    fn validate(&self) -> Result<(), StrategyError>;
}

/// Everything a decision core sees for one confirmed bar.
#[derive(Debug, Clone, Copy)]
pub struct BarContext<'a> {
    pub bar: &'a Bar,
    /// Snapshot used for entry rules (buy EMA pair when pairs are separate)
    pub entry: &'a IndicatorSnapshot,
    /// Snapshot used for exit rules (sell EMA pair when pairs are separate)
    pub exit: &'a IndicatorSnapshot,
    /// 1-based index of this bar in the engine's stream
    pub bar_index: u64,
    pub interval: Interval,
    /// Bars held estimated from the audit trail, filled in by the
    /// orchestrator when the in-memory entry index looks stale
    pub recovered_bars_held: Option<u64>,
}

impl<'a> BarContext<'a> {
    /// Context where entry and exit rules share one snapshot.
    pub fn new(bar: &'a Bar, snapshot: &'a IndicatorSnapshot, bar_index: u64, interval: Interval) -> Self {
        Self {
            bar,
            entry: snapshot,
            exit: snapshot,
            bar_index,
            interval,
            recovered_bars_held: None,
        }
    }

    /// Snapshot for evaluating rules of the given side.
    pub fn snapshot(&self, side: Side) -> &'a IndicatorSnapshot {
        match side {
            Side::Buy => self.entry,
            Side::Sell => self.exit,
        }
    }

    /// Bars held, falling back to the audit estimate when the in-memory
    /// count is not positive.
    pub fn bars_held(&self, position: &PositionState) -> i64 {
        let held = position.bars_held(self.bar_index);
        if held <= 0 {
            if let Some(recovered) = self.recovered_bars_held {
                return recovered as i64;
            }
        }
        held
    }
}

/// A strategy variant that turns one bar into one decision.
///
/// Implementations are owned by exactly one engine and called strictly
/// sequentially, so they may keep mutable state. Cores are borrowed across
/// `.await` points on spawned tasks.
pub trait StrategyDecisionCore: Send + Sync {
    /// Get the unique name of this strategy.
    fn name(&self) -> &str;

    /// Decide what to do on this bar.
    ///
    /// # Arguments
    /// * `ctx` - Bar, indicator snapshots and bar index
    /// * `position` - Current position; only the trailing state may be advanced
    ///
    /// # Returns
    /// The decision with the full rule trail for the audit record
    fn decide(&mut self, ctx: &BarContext<'_>, position: &mut PositionState) -> Decision;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Action;

    struct AlwaysHold {
        calls: usize,
    }

    impl StrategyDecisionCore for AlwaysHold {
        fn name(&self) -> &str {
            "hold"
        }

        fn decide(&mut self, _ctx: &BarContext<'_>, _position: &mut PositionState) -> Decision {
            self.calls += 1;
            Decision::hold()
        }
    }

    #[test]
    fn test_decision_core_is_object_safe() {
        let bar = Bar::flat(0, 100.0);
        let snap = IndicatorSnapshot::default();
        let ctx = BarContext::new(&bar, &snap, 1, Interval::Minute1);
        let mut core: Box<dyn StrategyDecisionCore> = Box::new(AlwaysHold { calls: 0 });
        let mut pos = PositionState::new();
        assert_eq!(core.decide(&ctx, &mut pos).action, Action::Hold);
        assert_eq!(core.name(), "hold");
    }

    #[test]
    fn test_boxed_core_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync + ?Sized>() {}
        assert_send_sync::<dyn StrategyDecisionCore>();
        assert_send_sync::<Box<dyn StrategyDecisionCore>>();
    }

    #[test]
    fn test_bars_held_fallback() {
        let bar = Bar::flat(0, 100.0);
        let snap = IndicatorSnapshot::default();
        let mut ctx = BarContext::new(&bar, &snap, 5, Interval::Minute1);
        let mut pos = PositionState::new();
        pos.open_position(1.0, 100.0, 5, 0);

        assert_eq!(ctx.bars_held(&pos), 0);
        ctx.recovered_bars_held = Some(12);
        assert_eq!(ctx.bars_held(&pos), 12);

        let ctx = BarContext::new(&bar, &snap, 9, Interval::Minute1);
        assert_eq!(ctx.bars_held(&pos), 4);
    }
}
