//! Order settlement reconciler.
//!
//! One background worker polls the exchange for every order still in
//! flight, records fill progress and finalizes terminal orders exactly once.
//! The in-flight set is the only state shared between engine workers and the
//! reconciler; it sits behind a single lock that is never held across an
//! `.await`.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};
use trading_core::error::PersistenceError;
use trading_core::traits::{ExchangeClient, Store};
use trading_core::types::{OrderState, PendingOrder, TradeRecord};

use crate::events::{EngineEvent, EventBus};

/// Reconciler timing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcilerConfig {
    /// Pause between two order-status queries
    pub poll_interval_ms: u64,
    /// Pause when nothing is in flight
    pub idle_sleep_ms: u64,
    pub stop_timeout_ms: u64,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            idle_sleep_ms: 5000,
            stop_timeout_ms: 10_000,
        }
    }
}

/// What one status query did to an order.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// Still open; progress recorded
    Progress(OrderState),
    /// Terminal; finalized and removed from tracking
    Finalized(OrderState),
    /// Not tracked (already finalized)
    Untracked,
    /// Query failed; kept for the next tick
    Failed(String),
}

struct Shared {
    exchange: Arc<dyn ExchangeClient>,
    store: Arc<dyn Store>,
    events: EventBus,
    config: ReconcilerConfig,
    inflight: Mutex<HashMap<String, PendingOrder>>,
}

/// Shared handle to the reconciler state. Cheap to clone.
#[derive(Clone)]
pub struct Reconciler {
    shared: Arc<Shared>,
}

impl Reconciler {
    pub fn new(
        exchange: Arc<dyn ExchangeClient>,
        store: Arc<dyn Store>,
        events: EventBus,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                exchange,
                store,
                events,
                config,
                inflight: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.shared.config
    }

    /// Start tracking an order. The REQUESTED state is persisted first so a
    /// restart can pick it up again.
    pub async fn enqueue(&self, order: PendingOrder) -> Result<(), PersistenceError> {
        self.shared.store.upsert_order_progress(&order).await?;
        info!(order_id = %order.order_id, user_id = %order.user_id, side = %order.side, "Order queued for settlement");
        self.shared
            .inflight
            .lock()
            .insert(order.order_id.clone(), order);
        Ok(())
    }

    /// Reload orders left in flight by a previous run.
    pub async fn rehydrate(&self) -> Result<usize, PersistenceError> {
        let orders = self.shared.store.list_inflight_orders().await?;
        let mut inflight = self.shared.inflight.lock();
        let before = inflight.len();
        for order in orders {
            inflight.entry(order.order_id.clone()).or_insert(order);
        }
        let added = inflight.len() - before;
        if added > 0 {
            info!(orders = added, "In-flight orders rehydrated");
        }
        Ok(added)
    }

    pub fn inflight_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.shared.inflight.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn inflight_len(&self) -> usize {
        self.shared.inflight.lock().len()
    }

    /// Whether any order for this user and ticker is still tracked.
    pub fn has_inflight(&self, user_id: &str, ticker: &str) -> bool {
        self.shared
            .inflight
            .lock()
            .values()
            .any(|o| o.user_id == user_id && o.ticker == ticker)
    }

    pub fn get(&self, order_id: &str) -> Option<PendingOrder> {
        self.shared.inflight.lock().get(order_id).cloned()
    }

    /// Query one order and apply the result.
    pub async fn poll_order(&self, order_id: &str) -> PollOutcome {
        if !self.shared.inflight.lock().contains_key(order_id) {
            return PollOutcome::Untracked;
        }

        let report = match self.shared.exchange.get_order_status(order_id).await {
            Ok(report) => report,
            Err(e) => {
                warn!(order_id, error = %e, "Order status query failed, will retry");
                return PollOutcome::Failed(e.to_string());
            }
        };
        let summary = report.fill_summary();
        let state = report.internal_state();

        let updated = {
            let mut inflight = self.shared.inflight.lock();
            let Some(order) = inflight.get_mut(order_id) else {
                return PollOutcome::Untracked;
            };
            order.apply(&summary, state);
            order.clone()
        };

        if state.is_inflight() {
            debug!(order_id, %state, filled = %updated.filled_qty, "Order progress");
            if let Err(e) = self.shared.store.upsert_order_progress(&updated).await {
                warn!(order_id, error = %e, "Failed to persist order progress");
            }
            return PollOutcome::Progress(state);
        }

        match self.finalize(&updated).await {
            Ok(()) => {
                self.shared.inflight.lock().remove(order_id);
                PollOutcome::Finalized(state)
            }
            Err(e) => {
                warn!(order_id, error = %e, "Failed to finalize order, will retry");
                PollOutcome::Failed(e.to_string())
            }
        }
    }

    async fn finalize(&self, order: &PendingOrder) -> Result<(), PersistenceError> {
        let store = &self.shared.store;
        if !store.finalize_order(order).await? {
            debug!(order_id = %order.order_id, "Order already finalized");
            return Ok(());
        }

        info!(
            order_id = %order.order_id,
            user_id = %order.user_id,
            state = %order.state,
            filled = %order.filled_qty,
            avg_price = ?order.avg_fill_price,
            "Order finalized"
        );

        if let (true, Some(price)) = (order.filled_qty > rust_decimal::Decimal::ZERO, order.avg_fill_price) {
            let trade = TradeRecord {
                user_id: order.user_id.clone(),
                ticker: order.ticker.clone(),
                side: order.side,
                order_id: order.order_id.clone(),
                price,
                quantity: order.filled_qty,
                fee: order.paid_fee,
                reason: None,
                bar_index: None,
                mode: order.mode,
                timestamp: order.updated_at,
            };
            store.record_trade(&trade).await?;
            store.apply_fill(&trade).await?;
            self.shared.events.publish(EngineEvent::Trade(trade));
        }
        Ok(())
    }

    /// One pass over every tracked order, without pauses.
    pub async fn poll_all(&self) -> Vec<(String, PollOutcome)> {
        let mut outcomes = Vec::new();
        for id in self.inflight_ids() {
            let outcome = self.poll_order(&id).await;
            outcomes.push((id, outcome));
        }
        outcomes
    }

    /// Spawn the polling worker.
    pub fn start(&self) -> ReconcilerHandle {
        let (stop_tx, stop_rx) = watch::channel(false);
        let this = self.clone();
        let join = tokio::spawn(async move { this.run(stop_rx).await });
        info!("Settlement reconciler started");
        ReconcilerHandle {
            stop_tx,
            join,
            stop_timeout: Duration::from_millis(self.shared.config.stop_timeout_ms),
        }
    }

    async fn run(self, mut stop: watch::Receiver<bool>) {
        if let Err(e) = self.rehydrate().await {
            error!(error = %e, "Failed to rehydrate in-flight orders");
        }
        let poll = Duration::from_millis(self.shared.config.poll_interval_ms);
        let idle = Duration::from_millis(self.shared.config.idle_sleep_ms);

        loop {
            if *stop.borrow() {
                break;
            }
            let ids = self.inflight_ids();
            let pause = if ids.is_empty() { idle } else { poll };
            for id in ids {
                if *stop.borrow() {
                    break;
                }
                self.poll_order(&id).await;
                if wait_or_stop(&mut stop, poll).await {
                    return self.log_stopped();
                }
            }
            if wait_or_stop(&mut stop, pause).await {
                break;
            }
        }
        self.log_stopped();
    }

    fn log_stopped(&self) {
        info!(inflight = self.inflight_len(), "Settlement reconciler stopped");
    }
}

/// Sleep for `pause`; `true` when a stop was requested meanwhile.
async fn wait_or_stop(stop: &mut watch::Receiver<bool>, pause: Duration) -> bool {
    tokio::select! {
        _ = sleep(pause) => *stop.borrow(),
        changed = stop.changed() => changed.is_err() || *stop.borrow(),
    }
}

/// Running reconciler worker.
pub struct ReconcilerHandle {
    stop_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
    stop_timeout: Duration,
}

impl ReconcilerHandle {
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Request a stop and wait for the worker, up to the stop timeout.
    pub async fn stop(self) {
        let _ = self.stop_tx.send(true);
        match timeout(self.stop_timeout, self.join).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(error = %e, "Reconciler worker ended abnormally"),
            Err(_) => warn!(
                timeout_ms = self.stop_timeout.as_millis() as u64,
                "Reconciler did not stop in time"
            ),
        }
    }
}
