//! Append-only audit files in front of another store.
//!
//! Bar evaluations go to `evaluations.jsonl` (one JSON object per line) and
//! trades to `trades.csv`. Ledger and order-progress calls pass through to
//! the wrapped store untouched.

use async_trait::async_trait;
use csv::WriterBuilder;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;
use trading_core::error::PersistenceError;
use trading_core::traits::{AccountLedger, AuditSink, BarEvaluation, OrderLedger};
use trading_core::types::{ExecutionMode, PendingOrder, PositionState, Side, TradeRecord};

const EVALUATIONS_FILE: &str = "evaluations.jsonl";
const TRADES_FILE: &str = "trades.csv";

/// Flat CSV row for one trade.
#[derive(Debug, Serialize)]
struct TradeRow<'a> {
    timestamp: String,
    user_id: &'a str,
    ticker: &'a str,
    side: Side,
    order_id: &'a str,
    price: Decimal,
    quantity: Decimal,
    fee: Decimal,
    reason: Option<&'a str>,
    bar_index: Option<u64>,
    mode: ExecutionMode,
}

impl<'a> From<&'a TradeRecord> for TradeRow<'a> {
    fn from(t: &'a TradeRecord) -> Self {
        Self {
            timestamp: t.timestamp.to_rfc3339(),
            user_id: &t.user_id,
            ticker: &t.ticker,
            side: t.side,
            order_id: &t.order_id,
            price: t.price,
            quantity: t.quantity,
            fee: t.fee,
            reason: t.reason.as_deref(),
            bar_index: t.bar_index,
            mode: t.mode,
        }
    }
}

/// Audit sink writing to files under one directory.
pub struct FileAuditSink<S> {
    inner: S,
    dir: PathBuf,
    evaluations: Mutex<BufWriter<File>>,
    trades: Mutex<csv::Writer<File>>,
}

impl<S> FileAuditSink<S> {
    /// Open (or create) the audit files in `dir`, appending to existing ones.
    pub fn open(dir: impl AsRef<Path>, inner: S) -> Result<Self, PersistenceError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let evaluations = OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join(EVALUATIONS_FILE))?;

        let trades_path = dir.join(TRADES_FILE);
        let needs_header = fs::metadata(&trades_path).map(|m| m.len() == 0).unwrap_or(true);
        let trades_file = OpenOptions::new().create(true).append(true).open(&trades_path)?;
        let trades = WriterBuilder::new()
            .has_headers(needs_header)
            .from_writer(trades_file);

        info!(dir = %dir.display(), "Audit files opened");
        Ok(Self {
            inner,
            dir,
            evaluations: Mutex::new(BufWriter::new(evaluations)),
            trades: Mutex::new(trades),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

fn csv_error(e: csv::Error) -> PersistenceError {
    PersistenceError::Storage(e.to_string())
}

#[async_trait]
impl<S: AuditSink> AuditSink for FileAuditSink<S> {
    async fn record_bar_evaluation(&self, evaluation: &BarEvaluation) -> Result<(), PersistenceError> {
        {
            let line = serde_json::to_string(evaluation)?;
            let mut out = self.evaluations.lock();
            writeln!(out, "{}", line)?;
            out.flush()?;
        }
        self.inner.record_bar_evaluation(evaluation).await
    }

    async fn record_trade(&self, trade: &TradeRecord) -> Result<(), PersistenceError> {
        {
            let mut out = self.trades.lock();
            out.serialize(TradeRow::from(trade)).map_err(csv_error)?;
            out.flush()?;
        }
        self.inner.record_trade(trade).await
    }

    async fn estimate_bars_held(&self, user_id: &str, ticker: &str) -> Result<Option<u64>, PersistenceError> {
        self.inner.estimate_bars_held(user_id, ticker).await
    }
}

#[async_trait]
impl<S: AccountLedger> AccountLedger for FileAuditSink<S> {
    async fn get_balance(&self, user_id: &str, currency: &str) -> Result<Decimal, PersistenceError> {
        self.inner.get_balance(user_id, currency).await
    }

    async fn apply_fill(&self, trade: &TradeRecord) -> Result<(), PersistenceError> {
        self.inner.apply_fill(trade).await
    }

    async fn last_open_buy(&self, user_id: &str, ticker: &str) -> Result<Option<TradeRecord>, PersistenceError> {
        self.inner.last_open_buy(user_id, ticker).await
    }

    async fn store_position(&self, user_id: &str, ticker: &str, position: &PositionState) -> Result<(), PersistenceError> {
        self.inner.store_position(user_id, ticker, position).await
    }

    async fn load_position(&self, user_id: &str, ticker: &str) -> Result<Option<PositionState>, PersistenceError> {
        self.inner.load_position(user_id, ticker).await
    }
}

#[async_trait]
impl<S: OrderLedger> OrderLedger for FileAuditSink<S> {
    async fn upsert_order_progress(&self, order: &PendingOrder) -> Result<(), PersistenceError> {
        self.inner.upsert_order_progress(order).await
    }

    async fn finalize_order(&self, order: &PendingOrder) -> Result<bool, PersistenceError> {
        self.inner.finalize_order(order).await
    }

    async fn list_inflight_orders(&self) -> Result<Vec<PendingOrder>, PersistenceError> {
        self.inner.list_inflight_orders().await
    }
}
