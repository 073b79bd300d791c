//! Per-user bar pipeline.
//!
//! [`BarOrchestrator::on_new_bar`] runs one confirmed bar through
//! buffer → indicators → decision core → audit → execution. The orchestrator
//! is the only owner of the user's [`PositionState`]; it is driven strictly
//! sequentially by one engine worker.

use chrono::Utc;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use trading_core::traits::{split_ticker, BarContext, BarEvaluation, ExchangeClient, Store, StrategyDecisionCore};
use trading_core::types::{
    Action, Bar, Decision, ExecutionMode, IndicatorSnapshot, Interval, OrderHandle, PendingOrder, PositionState,
    Side, TradeRecord,
};
use trading_indicators::{AppendOutcome, BarBuffer, IndicatorState};
use trading_strategies::BuiltStrategy;

use crate::error::EngineError;
use crate::events::{EngineEvent, EventBus, EventLevel};
use crate::reconciler::Reconciler;

/// Smallest order the exchange accepts, in quote currency.
pub const DEFAULT_MIN_ORDER_VALUE: i64 = 5000;

/// What an engine trades and how it sizes orders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSettings {
    pub user_id: String,
    pub ticker: String,
    pub interval: Interval,
    pub mode: ExecutionMode,
    /// Share of the quote balance spent per BUY (0.01..=1.0)
    pub order_ratio: Decimal,
    /// Orders and balances below this notional are treated as dust
    pub min_order_value: Decimal,
}

impl EngineSettings {
    pub fn new(user_id: impl Into<String>, ticker: impl Into<String>, interval: Interval, mode: ExecutionMode) -> Self {
        Self {
            user_id: user_id.into(),
            ticker: ticker.into(),
            interval,
            mode,
            order_ratio: Decimal::ONE,
            min_order_value: Decimal::from(DEFAULT_MIN_ORDER_VALUE),
        }
    }
}

/// Collaborators shared by the engine workers.
#[derive(Clone)]
pub struct EngineDeps {
    pub exchange: Arc<dyn ExchangeClient>,
    pub store: Arc<dyn Store>,
    pub events: EventBus,
    /// Settlement tracker for orders that do not settle at placement
    pub reconciler: Option<Reconciler>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    Unclosed,
    Duplicate,
    OutOfOrder,
    NotSeeded,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    Submitted { order_id: String, settled: bool },
    /// An order is already in flight
    SkippedPending,
    SkippedInsufficientFunds,
    /// Action does not apply to the current position
    Ignored(&'static str),
    /// Exchange refused or failed; position untouched
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum BarOutcome {
    Rejected(RejectReason),
    Evaluated {
        action: Action,
        execution: Option<ExecutionOutcome>,
    },
}

impl BarOutcome {
    pub fn action(&self) -> Option<Action> {
        match self {
            BarOutcome::Evaluated { action, .. } => Some(*action),
            BarOutcome::Rejected(_) => None,
        }
    }
}

/// Bar pipeline for one user and ticker.
pub struct BarOrchestrator {
    settings: EngineSettings,
    quote: String,
    base: String,
    core: Box<dyn StrategyDecisionCore>,
    indicators: IndicatorState,
    buffer: BarBuffer,
    position: PositionState,
    bar_count: u64,
    deps: EngineDeps,
}

impl BarOrchestrator {
    /// Build an orchestrator. The buffer always holds at least the closes
    /// the indicators need for seeding.
    pub fn new(
        settings: EngineSettings,
        strategy: BuiltStrategy,
        deps: EngineDeps,
        buffer_capacity: usize,
    ) -> Result<Self, EngineError> {
        let (quote, base) = split_ticker(&settings.ticker)
            .map(|(q, b)| (q.to_string(), b.to_string()))
            .ok_or_else(|| EngineError::InvalidSpec(format!("invalid ticker {}", settings.ticker)))?;
        let indicators = IndicatorState::new(strategy.indicators)?;
        let capacity = buffer_capacity.max(strategy.indicators.required_closes());

        Ok(Self {
            settings,
            quote,
            base,
            core: strategy.core,
            indicators,
            buffer: BarBuffer::new(capacity),
            position: PositionState::new(),
            bar_count: 0,
            deps,
        })
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn strategy_name(&self) -> &str {
        self.core.name()
    }

    pub fn position(&self) -> &PositionState {
        &self.position
    }

    pub fn bar_count(&self) -> u64 {
        self.bar_count
    }

    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_seeded(&self) -> bool {
        self.indicators.is_seeded()
    }

    pub fn snapshot(&self) -> IndicatorSnapshot {
        self.indicators.snapshot()
    }

    /// Timestamp of the newest bar in the buffer.
    pub fn last_timestamp(&self) -> Option<i64> {
        self.buffer.last_timestamp()
    }

    /// Feed history and seed the indicators once enough closed bars are in.
    ///
    /// Returns `false` while history is still short; callers keep feeding
    /// later fetches until it returns `true`.
    pub fn warm(&mut self, bars: &[Bar]) -> Result<bool, EngineError> {
        if self.indicators.is_seeded() {
            return Ok(true);
        }
        for bar in bars.iter().filter(|b| b.is_closed) {
            self.buffer.push(*bar);
        }

        let required = self.indicators.config().required_closes();
        if self.buffer.len() < required {
            info!(
                user_id = %self.settings.user_id,
                have = self.buffer.len(),
                required,
                "Waiting for more history before seeding"
            );
            return Ok(false);
        }

        self.indicators.seed(&self.buffer.closes())?;
        info!(
            user_id = %self.settings.user_id,
            ticker = %self.settings.ticker,
            strategy = self.core.name(),
            bars = self.buffer.len(),
            "Indicators warmed up"
        );
        Ok(true)
    }

    /// Rebuild the position from the exchange balance and the ledger.
    ///
    /// A persisted `pending` flag from an interrupted run is always cleared.
    pub async fn recover_position(&mut self) -> Result<(), EngineError> {
        let user = self.settings.user_id.clone();
        let ticker = self.settings.ticker.clone();
        let stored = self.deps.store.load_position(&user, &ticker).await?;
        let balance = self.deps.exchange.get_balance(&self.base).await?;
        let last_buy = self.deps.store.last_open_buy(&user, &ticker).await?;

        let mark = last_buy
            .as_ref()
            .map(|t| t.price)
            .or_else(|| self.buffer.last_close().and_then(Decimal::from_f64));
        let held = balance > Decimal::ZERO && !mark.is_some_and(|p| self.is_dust(balance * p));

        match (held, last_buy) {
            (true, Some(buy)) => {
                self.position.open_position(
                    to_f64(balance),
                    to_f64(buy.price),
                    buy.bar_index.unwrap_or(0),
                    buy.timestamp.timestamp_millis(),
                );
                if let Some(prev) = stored.as_ref().filter(|p| p.has_position) {
                    if let (Some(h), Some(cur)) = (prev.highest_price_since_entry, self.position.highest_price_since_entry) {
                        self.position.highest_price_since_entry = Some(h.max(cur));
                    }
                    self.position.trailing_armed = prev.trailing_armed;
                }
                info!(
                    user_id = %user,
                    %ticker,
                    quantity = self.position.quantity,
                    entry_price = ?self.position.avg_entry_price,
                    "Position recovered from exchange balance"
                );
            }
            (true, None) => {
                warn!(user_id = %user, %ticker, %balance, "Exchange holds a balance with no recorded buy; staying flat");
            }
            (false, _) => {
                self.position.close_position();
                debug!(user_id = %user, %ticker, "No position to recover");
            }
        }

        if stored.as_ref().is_some_and(|p| p.pending) {
            warn!(user_id = %user, %ticker, "Cleared stale pending flag from previous run");
        }
        self.position.set_pending(false);
        self.deps.store.store_position(&user, &ticker, &self.position).await?;
        Ok(())
    }

    /// Persist the current position.
    pub async fn persist_position(&self) -> Result<(), EngineError> {
        self.deps
            .store
            .store_position(&self.settings.user_id, &self.settings.ticker, &self.position)
            .await?;
        Ok(())
    }

    /// Process one bar.
    ///
    /// Rejections are data-integrity faults and leave all state untouched.
    /// An `Err` is an unhandled fault for the restart policy.
    pub async fn on_new_bar(&mut self, bar: Bar) -> Result<BarOutcome, EngineError> {
        if !bar.is_closed {
            debug!(user_id = %self.settings.user_id, bar = bar.timestamp, "Ignoring unclosed bar");
            return Ok(BarOutcome::Rejected(RejectReason::Unclosed));
        }
        match self.buffer.check(bar.timestamp) {
            AppendOutcome::Appended => {}
            AppendOutcome::Duplicate => {
                debug!(user_id = %self.settings.user_id, bar = bar.timestamp, "Duplicate bar ignored");
                return Ok(BarOutcome::Rejected(RejectReason::Duplicate));
            }
            AppendOutcome::OutOfOrder => {
                warn!(
                    user_id = %self.settings.user_id,
                    bar = bar.timestamp,
                    last = ?self.buffer.last_timestamp(),
                    "Out-of-order bar ignored"
                );
                return Ok(BarOutcome::Rejected(RejectReason::OutOfOrder));
            }
        }
        if !self.indicators.is_seeded() {
            warn!(user_id = %self.settings.user_id, bar = bar.timestamp, "Bar before indicator seeding ignored");
            return Ok(BarOutcome::Rejected(RejectReason::NotSeeded));
        }

        if self.order_in_flight() {
            debug!(user_id = %self.settings.user_id, "Order in flight; wallet sync skipped");
        } else {
            self.sync_wallet(bar.close).await;
        }

        self.buffer.push(bar);
        self.bar_count += 1;
        let bar_index = self.bar_count;
        if self.indicators.update(bar.close).is_none() {
            return Ok(BarOutcome::Rejected(RejectReason::NotSeeded));
        }
        let entry = self.indicators.snapshot_for(Side::Buy);
        let exit = self.indicators.snapshot_for(Side::Sell);

        let recovered_bars_held = if self.position.has_position && self.position.bars_held(bar_index) <= 0 {
            match self
                .deps
                .store
                .estimate_bars_held(&self.settings.user_id, &self.settings.ticker)
                .await
            {
                Ok(estimate) => estimate,
                Err(e) => {
                    warn!(user_id = %self.settings.user_id, error = %e, "Bars-held estimate unavailable");
                    None
                }
            }
        } else {
            None
        };

        let ctx = BarContext {
            bar: &bar,
            entry: &entry,
            exit: &exit,
            bar_index,
            interval: self.settings.interval,
            recovered_bars_held,
        };
        let audited = if self.position.has_position { exit } else { entry };
        let decision = self.core.decide(&ctx, &mut self.position);

        let evaluation = BarEvaluation {
            user_id: self.settings.user_id.clone(),
            ticker: self.settings.ticker.clone(),
            interval: self.settings.interval,
            mode: self.settings.mode,
            bar,
            bar_index,
            snapshot: audited,
            position: self.position.clone(),
            decision: decision.clone(),
            recorded_at: Utc::now(),
        };
        self.deps.store.record_bar_evaluation(&evaluation).await?;

        let summary = format!("bar {} {} {}", bar_index, decision.action, decision.reason_or_action());
        if decision.action.is_actionable() {
            info!(user_id = %self.settings.user_id, bar_index, action = %decision.action, reason = ?decision.reason, "Decision");
        } else {
            debug!(user_id = %self.settings.user_id, bar_index, reason = ?decision.reason, "Decision");
        }
        self.deps
            .events
            .publish(EngineEvent::log(&self.settings.user_id, EventLevel::Info, summary));

        let execution = self.execute(&decision, &bar, bar_index).await?;
        Ok(BarOutcome::Evaluated {
            action: decision.action,
            execution,
        })
    }

    fn is_dust(&self, notional: Decimal) -> bool {
        notional < self.settings.min_order_value
    }

    /// An order of this engine has not settled yet.
    fn order_in_flight(&self) -> bool {
        self.position.pending
            || self
                .deps
                .reconciler
                .as_ref()
                .is_some_and(|r| r.has_inflight(&self.settings.user_id, &self.settings.ticker))
    }

    /// Repair the in-memory position when the exchange balance disagrees.
    async fn sync_wallet(&mut self, close: f64) {
        let balance = match self.deps.exchange.get_balance(&self.base).await {
            Ok(balance) => balance,
            Err(e) => {
                warn!(user_id = %self.settings.user_id, error = %e, "Balance lookup failed; position left as is");
                return;
            }
        };
        let held = balance > Decimal::ZERO && !self.is_dust(balance * from_f64(close));

        match (self.position.has_position, held) {
            (true, false) => {
                warn!(user_id = %self.settings.user_id, ticker = %self.settings.ticker, "Position closed outside the engine; syncing");
                self.position.close_position();
                self.publish_warning("position closed outside the engine");
            }
            (false, true) => {
                let last_buy = self
                    .deps
                    .store
                    .last_open_buy(&self.settings.user_id, &self.settings.ticker)
                    .await;
                match last_buy {
                    Ok(Some(buy)) => {
                        self.position.open_position(
                            to_f64(balance),
                            to_f64(buy.price),
                            buy.bar_index.unwrap_or(0),
                            buy.timestamp.timestamp_millis(),
                        );
                        warn!(user_id = %self.settings.user_id, %balance, "Position opened outside the engine; syncing");
                        self.publish_warning("position opened outside the engine");
                    }
                    Ok(None) => {
                        debug!(user_id = %self.settings.user_id, %balance, "Untracked balance without a recorded buy");
                    }
                    Err(e) => warn!(user_id = %self.settings.user_id, error = %e, "Ledger lookup failed during sync"),
                }
            }
            (true, true) => {
                let quantity = to_f64(balance);
                if (quantity - self.position.quantity).abs() > 1e-9 {
                    debug!(user_id = %self.settings.user_id, from = self.position.quantity, to = quantity, "Position quantity synced");
                    self.position.quantity = quantity;
                }
            }
            (false, false) => {}
        }
    }

    fn publish_warning(&self, message: &str) {
        self.deps
            .events
            .publish(EngineEvent::log(&self.settings.user_id, EventLevel::Warn, message));
    }

    async fn execute(
        &mut self,
        decision: &Decision,
        bar: &Bar,
        bar_index: u64,
    ) -> Result<Option<ExecutionOutcome>, EngineError> {
        if !decision.action.is_actionable() {
            return Ok(None);
        }
        if self.order_in_flight() {
            warn!(user_id = %self.settings.user_id, action = %decision.action, "Order already in flight; skipping");
            return Ok(Some(ExecutionOutcome::SkippedPending));
        }
        let outcome = match decision.action {
            Action::Buy if self.position.has_position => ExecutionOutcome::Ignored("already holding a position"),
            Action::Buy => self.buy(decision, bar, bar_index).await?,
            Action::Sell | Action::Close if !self.position.has_position => ExecutionOutcome::Ignored("no open position"),
            _ => self.sell(decision, bar, bar_index).await?,
        };
        Ok(Some(outcome))
    }

    async fn buy(&mut self, decision: &Decision, bar: &Bar, bar_index: u64) -> Result<ExecutionOutcome, EngineError> {
        let quote_balance = match self.deps.exchange.get_balance(&self.quote).await {
            Ok(balance) => balance,
            Err(e) => return Ok(self.failed(Side::Buy, e.to_string())),
        };
        let amount = (quote_balance * self.settings.order_ratio)
            .round_dp_with_strategy(8, RoundingStrategy::ToZero);
        if self.is_dust(amount) {
            info!(user_id = %self.settings.user_id, %amount, min = %self.settings.min_order_value, "Buy amount below minimum order");
            return Ok(ExecutionOutcome::SkippedInsufficientFunds);
        }

        self.position.set_pending(true);
        let handle = match self.deps.exchange.place_market_buy(&self.settings.ticker, amount).await {
            Ok(handle) => handle,
            Err(e) => {
                self.position.set_pending(false);
                return Ok(self.failed(Side::Buy, e.to_string()));
            }
        };

        let settled = handle.is_settled();
        if settled {
            let price = handle.avg_price.unwrap_or_else(|| from_f64(bar.close));
            self.position
                .open_position(to_f64(handle.executed_volume), to_f64(price), bar_index, bar.timestamp);
            self.record_fill(&handle, price, decision, bar_index).await?;
        } else {
            let price = handle.avg_price.map(to_f64).unwrap_or(bar.close);
            let quantity = if handle.executed_volume > Decimal::ZERO {
                to_f64(handle.executed_volume)
            } else {
                to_f64(amount) / price
            };
            self.position.open_position(quantity, price, bar_index, bar.timestamp);
            self.track(&handle).await?;
        }
        self.persist_position().await?;

        info!(
            user_id = %self.settings.user_id,
            order_id = %handle.order_id,
            %amount,
            settled,
            "Buy order placed"
        );
        Ok(ExecutionOutcome::Submitted {
            order_id: handle.order_id,
            settled,
        })
    }

    async fn sell(&mut self, decision: &Decision, bar: &Bar, bar_index: u64) -> Result<ExecutionOutcome, EngineError> {
        let held = match self.deps.exchange.get_balance(&self.base).await {
            Ok(balance) => balance,
            Err(e) => return Ok(self.failed(Side::Sell, e.to_string())),
        };
        let quantity = from_f64(self.position.quantity)
            .min(held)
            .round_dp_with_strategy(8, RoundingStrategy::ToZero);
        if quantity <= Decimal::ZERO {
            info!(user_id = %self.settings.user_id, "Nothing to sell on the exchange");
            return Ok(ExecutionOutcome::SkippedInsufficientFunds);
        }

        self.position.set_pending(true);
        let handle = match self.deps.exchange.place_market_sell(&self.settings.ticker, quantity).await {
            Ok(handle) => handle,
            Err(e) => {
                self.position.set_pending(false);
                return Ok(self.failed(Side::Sell, e.to_string()));
            }
        };

        let settled = handle.is_settled();
        let pnl = self.position.pnl_pct(handle.avg_price.map(to_f64).unwrap_or(bar.close));
        if settled {
            let price = handle.avg_price.unwrap_or_else(|| from_f64(bar.close));
            self.record_fill(&handle, price, decision, bar_index).await?;
        } else {
            self.track(&handle).await?;
        }
        self.position.close_position();
        self.persist_position().await?;

        info!(
            user_id = %self.settings.user_id,
            order_id = %handle.order_id,
            %quantity,
            reason = ?decision.reason,
            pnl_pct = ?pnl,
            settled,
            "Sell order placed"
        );
        Ok(ExecutionOutcome::Submitted {
            order_id: handle.order_id,
            settled,
        })
    }

    fn failed(&self, side: Side, message: String) -> ExecutionOutcome {
        error!(user_id = %self.settings.user_id, %side, error = %message, "Order not placed");
        self.deps.events.publish(EngineEvent::log(
            &self.settings.user_id,
            EventLevel::Error,
            format!("{} order failed: {}", side, message),
        ));
        ExecutionOutcome::Failed(message)
    }

    async fn record_fill(
        &self,
        handle: &OrderHandle,
        price: Decimal,
        decision: &Decision,
        bar_index: u64,
    ) -> Result<(), EngineError> {
        let trade = TradeRecord {
            user_id: self.settings.user_id.clone(),
            ticker: self.settings.ticker.clone(),
            side: handle.side,
            order_id: handle.order_id.clone(),
            price,
            quantity: handle.executed_volume,
            fee: handle.paid_fee,
            reason: decision.reason.clone(),
            bar_index: Some(bar_index),
            mode: self.settings.mode,
            timestamp: Utc::now(),
        };
        self.deps.store.record_trade(&trade).await?;
        self.deps.store.apply_fill(&trade).await?;
        self.deps.events.publish(EngineEvent::Trade(trade));
        Ok(())
    }

    async fn track(&self, handle: &OrderHandle) -> Result<(), EngineError> {
        match &self.deps.reconciler {
            Some(reconciler) => {
                let order = PendingOrder::requested(
                    handle.order_id.clone(),
                    self.settings.user_id.clone(),
                    self.settings.ticker.clone(),
                    handle.side,
                )
                .with_mode(self.settings.mode);
                reconciler.enqueue(order).await?;
            }
            None => warn!(
                user_id = %self.settings.user_id,
                order_id = %handle.order_id,
                "Order did not settle and no reconciler is running"
            ),
        }
        Ok(())
    }
}

fn to_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(0.0)
}

fn from_f64(value: f64) -> Decimal {
    Decimal::from_f64(value).unwrap_or_default()
}
