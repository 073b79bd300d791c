//! Order, fill and settlement types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::ExecutionMode;

/// Order side (buy or sell).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Get the opposite side.
    pub fn opposite(&self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// Internal settlement state of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderState {
    /// Placed, nothing filled yet
    Requested,
    /// Some volume executed, still open on the exchange
    PartiallyFilled,
    /// Completely executed
    Filled,
    /// Closed by the exchange without (further) execution
    Canceled,
}

impl OrderState {
    /// Check if the order is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderState::Filled | OrderState::Canceled)
    }

    /// Check if the order still needs to be tracked.
    pub fn is_inflight(&self) -> bool {
        !self.is_terminal()
    }
}

impl std::fmt::Display for OrderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderState::Requested => write!(f, "REQUESTED"),
            OrderState::PartiallyFilled => write!(f, "PARTIALLY_FILLED"),
            OrderState::Filled => write!(f, "FILLED"),
            OrderState::Canceled => write!(f, "CANCELED"),
        }
    }
}

/// Order state as reported by the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExternalOrderState {
    /// Open on the book (`wait` / `watch`)
    #[serde(alias = "watch")]
    Wait,
    /// Fully processed
    Done,
    /// Canceled by the user or the exchange
    Cancel,
}

impl ExternalOrderState {
    /// Map an exchange state plus executed volume to the internal state.
    pub fn to_internal(self, filled_qty: Decimal) -> OrderState {
        let filled = filled_qty > Decimal::ZERO;
        match self {
            ExternalOrderState::Wait if filled => OrderState::PartiallyFilled,
            ExternalOrderState::Wait => OrderState::Requested,
            ExternalOrderState::Done if filled => OrderState::Filled,
            ExternalOrderState::Done | ExternalOrderState::Cancel => OrderState::Canceled,
        }
    }
}

/// Handle returned by the exchange when a market order is placed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderHandle {
    /// Provider order identifier
    pub order_id: String,
    pub ticker: String,
    pub side: Side,
    /// Settlement state at the time of placement
    pub state: OrderState,
    /// Average execution price if already known
    pub avg_price: Option<Decimal>,
    /// Executed base quantity so far
    pub executed_volume: Decimal,
    /// Fee paid so far (quote currency)
    pub paid_fee: Decimal,
    pub created_at: DateTime<Utc>,
}

impl OrderHandle {
    /// Whether the order was settled synchronously at placement.
    pub fn is_settled(&self) -> bool {
        self.state == OrderState::Filled && self.avg_price.is_some()
    }
}

/// One constituent trade of an order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TradeFill {
    pub price: Decimal,
    pub volume: Decimal,
    /// `price * volume` in quote currency
    pub funds: Decimal,
    pub fee: Decimal,
}

/// Order status returned by `get_order_status`.
///
/// Exchanges report either summary fields directly or only the list of
/// constituent trades; [`OrderStatusReport::fill_summary`] handles both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderStatusReport {
    pub order_id: String,
    pub state: ExternalOrderState,
    pub avg_price: Option<Decimal>,
    pub executed_volume: Option<Decimal>,
    pub paid_fee: Option<Decimal>,
    #[serde(default)]
    pub trades: Vec<TradeFill>,
}

/// Cumulative execution figures of an order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FillSummary {
    pub filled_qty: Decimal,
    pub avg_price: Option<Decimal>,
    pub paid_fee: Decimal,
}

impl OrderStatusReport {
    /// Cumulative filled quantity, average price and fee.
    ///
    /// Direct fields win; when the average price or volume is missing the
    /// figures are aggregated from the constituent trades.
    pub fn fill_summary(&self) -> FillSummary {
        let direct_complete = self.avg_price.is_some() && self.executed_volume.is_some();
        if !direct_complete && !self.trades.is_empty() {
            let volume: Decimal = self.trades.iter().map(|t| t.volume).sum();
            let funds: Decimal = self.trades.iter().map(|t| t.funds).sum();
            let fee: Decimal = self.trades.iter().map(|t| t.fee).sum();
            let avg_price = if volume > Decimal::ZERO {
                Some(funds / volume)
            } else {
                None
            };
            return FillSummary {
                filled_qty: volume,
                avg_price,
                paid_fee: fee,
            };
        }

        FillSummary {
            filled_qty: self.executed_volume.unwrap_or(Decimal::ZERO),
            avg_price: self.avg_price,
            paid_fee: self.paid_fee.unwrap_or(Decimal::ZERO),
        }
    }

    /// Internal state implied by this report.
    pub fn internal_state(&self) -> OrderState {
        self.state.to_internal(self.fill_summary().filled_qty)
    }
}

/// An order tracked by the settlement reconciler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingOrder {
    pub order_id: String,
    pub user_id: String,
    pub ticker: String,
    pub side: Side,
    pub filled_qty: Decimal,
    pub avg_fill_price: Option<Decimal>,
    pub paid_fee: Decimal,
    pub state: OrderState,
    /// Mode of the engine that placed the order
    #[serde(default)]
    pub mode: ExecutionMode,
    pub updated_at: DateTime<Utc>,
}

impl PendingOrder {
    /// Start tracking a freshly placed order.
    pub fn requested(
        order_id: impl Into<String>,
        user_id: impl Into<String>,
        ticker: impl Into<String>,
        side: Side,
    ) -> Self {
        Self {
            order_id: order_id.into(),
            user_id: user_id.into(),
            ticker: ticker.into(),
            side,
            filled_qty: Decimal::ZERO,
            avg_fill_price: None,
            paid_fee: Decimal::ZERO,
            state: OrderState::Requested,
            mode: ExecutionMode::default(),
            updated_at: Utc::now(),
        }
    }

    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Apply an observed fill summary and state.
    pub fn apply(&mut self, summary: &FillSummary, state: OrderState) {
        self.filled_qty = summary.filled_qty;
        if summary.avg_price.is_some() {
            self.avg_fill_price = summary.avg_price;
        }
        self.paid_fee = summary.paid_fee;
        self.state = state;
        self.updated_at = Utc::now();
    }
}

/// A completed (or synchronously settled) trade, as written to the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub user_id: String,
    pub ticker: String,
    pub side: Side,
    pub order_id: String,
    pub price: Decimal,
    pub quantity: Decimal,
    pub fee: Decimal,
    /// Decision reason that produced the order
    pub reason: Option<String>,
    /// Bar index the order was decided on
    pub bar_index: Option<u64>,
    pub mode: ExecutionMode,
    pub timestamp: DateTime<Utc>,
}

impl TradeRecord {
    /// Quote amount exchanged, excluding fees.
    pub fn notional(&self) -> Decimal {
        self.price * self.quantity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn report(state: ExternalOrderState) -> OrderStatusReport {
        OrderStatusReport {
            order_id: "o-1".into(),
            state,
            avg_price: None,
            executed_volume: None,
            paid_fee: None,
            trades: Vec::new(),
        }
    }

    #[test]
    fn test_external_state_mapping() {
        assert_eq!(
            ExternalOrderState::Wait.to_internal(Decimal::ZERO),
            OrderState::Requested
        );
        assert_eq!(
            ExternalOrderState::Wait.to_internal(dec!(0.4)),
            OrderState::PartiallyFilled
        );
        assert_eq!(ExternalOrderState::Done.to_internal(dec!(1)), OrderState::Filled);
        assert_eq!(
            ExternalOrderState::Done.to_internal(Decimal::ZERO),
            OrderState::Canceled
        );
        assert_eq!(
            ExternalOrderState::Cancel.to_internal(dec!(0.5)),
            OrderState::Canceled
        );
    }

    #[test]
    fn test_fill_summary_direct_fields() {
        let mut r = report(ExternalOrderState::Done);
        r.avg_price = Some(dec!(100));
        r.executed_volume = Some(dec!(2));
        r.paid_fee = Some(dec!(0.1));
        r.trades.push(TradeFill {
            price: dec!(1),
            volume: dec!(1),
            funds: dec!(1),
            fee: dec!(0),
        });

        let s = r.fill_summary();
        assert_eq!(s.filled_qty, dec!(2));
        assert_eq!(s.avg_price, Some(dec!(100)));
        assert_eq!(s.paid_fee, dec!(0.1));
    }

    #[test]
    fn test_fill_summary_aggregates_trades() {
        let mut r = report(ExternalOrderState::Wait);
        r.trades = vec![
            TradeFill {
                price: dec!(100),
                volume: dec!(1),
                funds: dec!(100),
                fee: dec!(0.05),
            },
            TradeFill {
                price: dec!(103),
                volume: dec!(3),
                funds: dec!(309),
                fee: dec!(0.15),
            },
        ];

        let s = r.fill_summary();
        assert_eq!(s.filled_qty, dec!(4));
        assert_eq!(s.avg_price, Some(dec!(102.25)));
        assert_eq!(s.paid_fee, dec!(0.20));
        assert_eq!(r.internal_state(), OrderState::PartiallyFilled);
    }

    #[test]
    fn test_pending_order_apply() {
        let mut p = PendingOrder::requested("o-1", "alice", "KRW-BTC", Side::Buy).with_mode(ExecutionMode::Live);
        assert_eq!(p.state, OrderState::Requested);
        assert_eq!(p.mode, ExecutionMode::Live);

        let summary = FillSummary {
            filled_qty: dec!(0.4),
            avg_price: Some(dec!(50)),
            paid_fee: dec!(0.01),
        };
        p.apply(&summary, OrderState::PartiallyFilled);
        assert_eq!(p.filled_qty, dec!(0.4));
        assert_eq!(p.avg_fill_price, Some(dec!(50)));
        assert!(p.state.is_inflight());

        // A later report without a price keeps the last known one
        let summary = FillSummary {
            filled_qty: dec!(0.4),
            avg_price: None,
            paid_fee: dec!(0.01),
        };
        p.apply(&summary, OrderState::Canceled);
        assert_eq!(p.avg_fill_price, Some(dec!(50)));
        assert!(p.state.is_terminal());
    }
}
