//! Minimum holding period and the shared exit path.

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};
use trading_core::{Action, BarContext, Decision, PositionState, RuleCheck};
use trading_risk::{Filter, FilterChain, FilterContext, PositionView, StopLossFilter};

/// Which exits the minimum holding period suppresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HoldingPolicy {
    /// Every exit waits for the holding period
    #[default]
    All,
    /// Stop-loss may exit before the holding period ends
    NonEmergency,
}

/// Exit evaluation shared by the strategy variants.
pub(crate) struct ExitPath {
    pub min_holding_period: u64,
    pub policy: HoldingPolicy,
    /// Stop-loss used for the emergency bypass, when enabled
    pub emergency_stop: Option<StopLossFilter>,
    pub chain: FilterChain,
}

impl ExitPath {
    /// Holding gate, then the exit chain on the exit snapshot.
    ///
    /// The high-water mark follows every close, including those inside the
    /// holding period.
    pub fn evaluate(&self, ctx: &BarContext<'_>, position: &mut PositionState) -> Decision {
        let bars_held = ctx.bars_held(position);
        let fctx = FilterContext {
            bar: ctx.bar,
            snapshot: ctx.exit,
            bar_index: ctx.bar_index,
            bars_held,
            interval: ctx.interval,
        };
        let mut checks = Vec::new();
        position.update_highest_price(ctx.bar.close);

        if bars_held < self.min_holding_period as i64 {
            let hold_check = RuleCheck::failed("min_holding_period")
                .with_detail(format!("held {} of {} bars", bars_held, self.min_holding_period));
            checks.push(hold_check);

            if self.policy == HoldingPolicy::NonEmergency {
                if let Some(stop) = &self.emergency_stop {
                    let result = stop.evaluate(&fctx, &mut PositionView::new(position));
                    if result.should_block {
                        info!(bars_held, reason = %result.reason, "Stop-loss bypasses holding period");
                        checks.push(RuleCheck::passed(stop.key()).with_detail(result.detail.clone()));
                        return Decision::new(Action::Sell)
                            .with_reason(result.reason)
                            .with_detail(result.detail)
                            .with_checks(checks)
                            .with_metadata(result.metadata);
                    }
                }
            }

            debug!(bars_held, required = self.min_holding_period, "Minimum holding period not met");
            return Decision::hold()
                .with_reason("MIN_HOLDING")
                .with_detail(format!("held {} of {} bars", bars_held, self.min_holding_period))
                .with_checks(checks)
                .with_metadata(json!({ "bars_held": bars_held }));
        }
        checks.push(RuleCheck::passed("min_holding_period"));

        let hit = self
            .chain
            .evaluate_traced(&fctx, &mut PositionView::new(position), &mut checks);
        match hit {
            Some(result) => {
                info!(reason = %result.reason, detail = %result.detail, bars_held, "Exit triggered");
                Decision::new(Action::Sell)
                    .with_reason(result.reason)
                    .with_detail(result.detail)
                    .with_checks(checks)
                    .with_metadata(result.metadata)
            }
            None => Decision::hold()
                .with_checks(checks)
                .with_metadata(json!({ "bars_held": bars_held })),
        }
    }
}
