//! In-memory store implementing every persistence seam.

use async_trait::async_trait;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::debug;
use trading_core::error::PersistenceError;
use trading_core::traits::{split_ticker, AccountLedger, AuditSink, BarEvaluation, OrderLedger};
use trading_core::types::{PendingOrder, PositionState, Side, TradeRecord};

type Key = (String, String);

fn key(a: &str, b: &str) -> Key {
    (a.to_string(), b.to_string())
}

#[derive(Default)]
struct Inner {
    evaluations: Vec<BarEvaluation>,
    /// Evaluations recorded since the last BUY, per (user, ticker)
    since_buy: HashMap<Key, u64>,
    audit_trades: Vec<TradeRecord>,
    ledger_trades: Vec<TradeRecord>,
    balances: HashMap<Key, Decimal>,
    positions: HashMap<Key, PositionState>,
    inflight: HashMap<String, PendingOrder>,
    finalized: HashMap<String, PendingOrder>,
}

/// Thread-safe store kept entirely in memory.
///
/// Every user starts with `initial_cash` of the quote currency in the book.
pub struct MemoryStore {
    inner: RwLock<Inner>,
    initial_cash: Decimal,
    quote_currency: String,
}

impl MemoryStore {
    pub fn new(initial_cash: Decimal, quote_currency: impl Into<String>) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            initial_cash,
            quote_currency: quote_currency.into(),
        }
    }

    fn opening_balance(&self, currency: &str) -> Decimal {
        if currency == self.quote_currency {
            self.initial_cash
        } else {
            Decimal::ZERO
        }
    }

    /// Audit records for one user, oldest first.
    pub fn evaluations(&self, user_id: &str) -> Vec<BarEvaluation> {
        self.inner
            .read()
            .evaluations
            .iter()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect()
    }

    /// Audited trades, oldest first.
    pub fn trades(&self) -> Vec<TradeRecord> {
        self.inner.read().audit_trades.clone()
    }

    /// Last known state of an order, in flight or finalized.
    pub fn order(&self, order_id: &str) -> Option<PendingOrder> {
        let inner = self.inner.read();
        inner
            .finalized
            .get(order_id)
            .or_else(|| inner.inflight.get(order_id))
            .cloned()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(Decimal::ZERO, "KRW")
    }
}

#[async_trait]
impl AuditSink for MemoryStore {
    async fn record_bar_evaluation(&self, evaluation: &BarEvaluation) -> Result<(), PersistenceError> {
        let mut inner = self.inner.write();
        if let Some(count) = inner
            .since_buy
            .get_mut(&key(&evaluation.user_id, &evaluation.ticker))
        {
            *count += 1;
        }
        inner.evaluations.push(evaluation.clone());
        Ok(())
    }

    async fn record_trade(&self, trade: &TradeRecord) -> Result<(), PersistenceError> {
        let mut inner = self.inner.write();
        let k = key(&trade.user_id, &trade.ticker);
        match trade.side {
            Side::Buy => {
                inner.since_buy.insert(k, 0);
            }
            Side::Sell => {
                inner.since_buy.remove(&k);
            }
        }
        inner.audit_trades.push(trade.clone());
        Ok(())
    }

    async fn estimate_bars_held(&self, user_id: &str, ticker: &str) -> Result<Option<u64>, PersistenceError> {
        Ok(self.inner.read().since_buy.get(&key(user_id, ticker)).copied())
    }
}

#[async_trait]
impl AccountLedger for MemoryStore {
    async fn get_balance(&self, user_id: &str, currency: &str) -> Result<Decimal, PersistenceError> {
        Ok(self
            .inner
            .read()
            .balances
            .get(&key(user_id, currency))
            .copied()
            .unwrap_or_else(|| self.opening_balance(currency)))
    }

    async fn apply_fill(&self, trade: &TradeRecord) -> Result<(), PersistenceError> {
        let (quote, base) = split_ticker(&trade.ticker)
            .ok_or_else(|| PersistenceError::Storage(format!("invalid ticker {}", trade.ticker)))?;
        let quote_open = self.opening_balance(quote);
        let base_open = self.opening_balance(base);

        let mut inner = self.inner.write();
        let quote_delta = match trade.side {
            Side::Buy => -(trade.notional() + trade.fee),
            Side::Sell => trade.notional() - trade.fee,
        };
        let base_delta = match trade.side {
            Side::Buy => trade.quantity,
            Side::Sell => -trade.quantity,
        };

        let q = inner
            .balances
            .entry(key(&trade.user_id, quote))
            .or_insert(quote_open);
        *q += quote_delta;
        let b = inner
            .balances
            .entry(key(&trade.user_id, base))
            .or_insert(base_open);
        *b = (*b + base_delta).max(Decimal::ZERO);

        inner.ledger_trades.push(trade.clone());
        debug!(user_id = %trade.user_id, ticker = %trade.ticker, side = %trade.side, "Fill applied to ledger");
        Ok(())
    }

    async fn last_open_buy(&self, user_id: &str, ticker: &str) -> Result<Option<TradeRecord>, PersistenceError> {
        let inner = self.inner.read();
        let last = inner
            .ledger_trades
            .iter()
            .rev()
            .find(|t| t.user_id == user_id && t.ticker == ticker);
        Ok(last.filter(|t| t.side == Side::Buy).cloned())
    }

    async fn store_position(&self, user_id: &str, ticker: &str, position: &PositionState) -> Result<(), PersistenceError> {
        self.inner
            .write()
            .positions
            .insert(key(user_id, ticker), position.clone());
        Ok(())
    }

    async fn load_position(&self, user_id: &str, ticker: &str) -> Result<Option<PositionState>, PersistenceError> {
        Ok(self.inner.read().positions.get(&key(user_id, ticker)).cloned())
    }
}

#[async_trait]
impl OrderLedger for MemoryStore {
    async fn upsert_order_progress(&self, order: &PendingOrder) -> Result<(), PersistenceError> {
        let mut inner = self.inner.write();
        if inner.finalized.contains_key(&order.order_id) {
            return Ok(());
        }
        inner.inflight.insert(order.order_id.clone(), order.clone());
        Ok(())
    }

    async fn finalize_order(&self, order: &PendingOrder) -> Result<bool, PersistenceError> {
        let mut inner = self.inner.write();
        if inner.finalized.contains_key(&order.order_id) {
            return Ok(false);
        }
        inner.inflight.remove(&order.order_id);
        inner.finalized.insert(order.order_id.clone(), order.clone());
        Ok(true)
    }

    async fn list_inflight_orders(&self) -> Result<Vec<PendingOrder>, PersistenceError> {
        let inner = self.inner.read();
        let mut orders: Vec<PendingOrder> = inner
            .inflight
            .values()
            .filter(|o| o.state.is_inflight())
            .cloned()
            .collect();
        orders.sort_by_key(|o| o.updated_at);
        Ok(orders)
    }
}
