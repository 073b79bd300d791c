//! Entry and exit filter chains.

use tracing::debug;
use trading_core::RuleCheck;

use crate::filter::{Filter, FilterContext, FilterResult, PositionView};

struct Slot {
    filter: Box<dyn Filter>,
    enabled: bool,
}

/// Ordered list of filters; the first triggering one wins.
///
/// Entry chains keep insertion order. Exit chains are stable-sorted by
/// [`FilterCategory`](crate::FilterCategory) so core rules run before
/// auxiliary liquidation rules.
pub struct FilterChain {
    slots: Vec<Slot>,
    by_category: bool,
}

impl FilterChain {
    /// Chain evaluated in insertion order.
    pub fn entry() -> Self {
        Self {
            slots: Vec::new(),
            by_category: false,
        }
    }

    /// Chain evaluated by category, then insertion order.
    pub fn exit() -> Self {
        Self {
            slots: Vec::new(),
            by_category: true,
        }
    }

    /// Add a filter; disabled filters are skipped but still reported.
    pub fn with(mut self, filter: impl Filter + 'static, enabled: bool) -> Self {
        self.push(Box::new(filter), enabled);
        self
    }

    pub fn push(&mut self, filter: Box<dyn Filter>, enabled: bool) {
        self.slots.push(Slot { filter, enabled });
        if self.by_category {
            self.slots.sort_by_key(|s| s.filter.category());
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Keys in evaluation order.
    pub fn keys(&self) -> Vec<&str> {
        self.slots.iter().map(|s| s.filter.key()).collect()
    }

    /// First triggering result, or `None`.
    pub fn evaluate_all(&self, ctx: &FilterContext<'_>, position: &mut PositionView<'_>) -> Option<FilterResult> {
        let mut trace = Vec::new();
        self.evaluate_traced(ctx, position, &mut trace)
    }

    /// Like [`evaluate_all`](Self::evaluate_all), recording every rule looked at.
    pub fn evaluate_traced(
        &self,
        ctx: &FilterContext<'_>,
        position: &mut PositionView<'_>,
        trace: &mut Vec<RuleCheck>,
    ) -> Option<FilterResult> {
        for slot in &self.slots {
            let key = slot.filter.key();
            if !slot.enabled {
                trace.push(RuleCheck::skipped(key, false));
                continue;
            }
            let result = slot.filter.evaluate(ctx, position);
            debug!(filter = key, reason = %result.reason, triggered = result.should_block, "Filter evaluated");
            if result.should_block {
                trace.push(RuleCheck::passed(key).with_detail(result.detail.clone()));
                return Some(result);
            }
            trace.push(RuleCheck::failed(key).with_detail(result.reason.clone()));
        }
        None
    }
}
