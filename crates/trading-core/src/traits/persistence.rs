//! Persistence collaborator traits.
//!
//! The engine never talks to a database directly. It writes an append-only
//! audit trail, keeps a small account ledger and tracks order progress
//! through these three seams.

use crate::error::PersistenceError;
use crate::types::{
    Bar, Decision, ExecutionMode, IndicatorSnapshot, Interval, PendingOrder, PositionState,
    TradeRecord,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One audit record per evaluated bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarEvaluation {
    pub user_id: String,
    pub ticker: String,
    pub interval: Interval,
    pub mode: ExecutionMode,
    pub bar: Bar,
    pub bar_index: u64,
    pub snapshot: IndicatorSnapshot,
    /// Position as seen by the decision core
    pub position: PositionState,
    pub decision: Decision,
    pub recorded_at: DateTime<Utc>,
}

/// Append-only audit writer.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Record one bar evaluation, whatever its outcome.
    async fn record_bar_evaluation(&self, evaluation: &BarEvaluation) -> Result<(), PersistenceError>;

    /// Record an executed trade.
    async fn record_trade(&self, trade: &TradeRecord) -> Result<(), PersistenceError>;

    /// Estimate bars held from the audit trail: the number of bar evaluations
    /// recorded since the most recent BUY trade. `None` when no open BUY exists.
    async fn estimate_bars_held(&self, user_id: &str, ticker: &str) -> Result<Option<u64>, PersistenceError>;
}

/// Account and position ledger.
#[async_trait]
pub trait AccountLedger: Send + Sync {
    /// Book balance of a currency.
    async fn get_balance(&self, user_id: &str, currency: &str) -> Result<Decimal, PersistenceError>;

    /// Apply an executed trade to the book balances.
    async fn apply_fill(&self, trade: &TradeRecord) -> Result<(), PersistenceError>;

    /// Most recent BUY not followed by a SELL for this ticker.
    async fn last_open_buy(&self, user_id: &str, ticker: &str) -> Result<Option<TradeRecord>, PersistenceError>;

    /// Persist the in-memory position (for restart recovery).
    async fn store_position(&self, user_id: &str, ticker: &str, position: &PositionState) -> Result<(), PersistenceError>;

    /// Load the last persisted position, if any.
    async fn load_position(&self, user_id: &str, ticker: &str) -> Result<Option<PositionState>, PersistenceError>;
}

/// Order progress ledger used by the settlement reconciler.
#[async_trait]
pub trait OrderLedger: Send + Sync {
    /// Insert or update the progress of an in-flight order.
    async fn upsert_order_progress(&self, order: &PendingOrder) -> Result<(), PersistenceError>;

    /// Mark an order terminal.
    ///
    /// # Returns
    /// `true` the first time an order id is finalized, `false` on any repeat.
    /// Repeats leave the ledger unchanged.
    async fn finalize_order(&self, order: &PendingOrder) -> Result<bool, PersistenceError>;

    /// Orders whose last known state is REQUESTED or PARTIALLY_FILLED.
    async fn list_inflight_orders(&self) -> Result<Vec<PendingOrder>, PersistenceError>;
}

/// Everything the engine needs from storage.
pub trait Store: AuditSink + AccountLedger + OrderLedger {}

impl<T: AuditSink + AccountLedger + OrderLedger> Store for T {}
