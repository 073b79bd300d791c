//! Paper exchange for TEST mode and simulation.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, info};
use trading_core::error::ExchangeError;
use trading_core::traits::{split_ticker, ExchangeClient};
use trading_core::types::{
    Bar, ExternalOrderState, Interval, OrderHandle, OrderState, OrderStatusReport, Side, TradeFill,
};
use uuid::Uuid;

/// Most bars a single fetch returns, like the real exchange.
pub const MAX_FETCH_COUNT: usize = 200;

/// When placed orders report their fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Settlement {
    /// Filled synchronously; the handle carries the average price
    #[default]
    Immediate,
    /// Reported as `wait` on the first status poll, `done` afterwards
    Deferred,
}

/// Paper exchange settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaperConfig {
    /// Starting quote balance
    pub initial_cash: Decimal,
    /// Fee ratio charged on both sides (0.0005 = 0.05%)
    pub fee_ratio: Decimal,
    pub settlement: Settlement,
    pub quote_currency: String,
}

impl Default for PaperConfig {
    fn default() -> Self {
        Self {
            initial_cash: dec!(1000000),
            fee_ratio: dec!(0.0005),
            settlement: Settlement::Immediate,
            quote_currency: "KRW".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
struct PaperOrder {
    report: OrderStatusReport,
    polls: u32,
}

/// Recorded bars replayed one at a time.
#[derive(Debug, Clone)]
struct Replay {
    bars: Vec<Bar>,
    cursor: usize,
}

#[derive(Debug, Default)]
struct PaperState {
    balances: HashMap<String, Decimal>,
    orders: HashMap<String, PaperOrder>,
    marks: HashMap<String, Decimal>,
    replays: HashMap<String, Replay>,
    failures: VecDeque<ExchangeError>,
}

/// In-process exchange that fills market orders at the last seen price.
///
/// Bars come either from a replay (see [`PaperExchange::replay_bars`]) or
/// from a deterministic synthetic series aligned to wall-clock time.
#[derive(Clone)]
pub struct PaperExchange {
    config: PaperConfig,
    state: Arc<Mutex<PaperState>>,
}

impl PaperExchange {
    pub fn new(config: PaperConfig) -> Self {
        let mut state = PaperState::default();
        state
            .balances
            .insert(config.quote_currency.clone(), config.initial_cash);
        Self {
            config,
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub fn config(&self) -> &PaperConfig {
        &self.config
    }

    /// Replay `bars` for `ticker`. The first fetch sees `visible` bars,
    /// every later fetch reveals one more.
    pub fn replay_bars(&self, ticker: &str, bars: Vec<Bar>, visible: usize) {
        let cursor = visible.min(bars.len());
        self.state
            .lock()
            .replays
            .insert(ticker.to_string(), Replay { bars, cursor });
    }

    /// Override the price used to fill the next orders on `ticker`.
    pub fn set_mark_price(&self, ticker: &str, price: Decimal) {
        self.state.lock().marks.insert(ticker.to_string(), price);
    }

    pub fn set_balance(&self, currency: &str, amount: Decimal) {
        self.state.lock().balances.insert(currency.to_string(), amount);
    }

    /// Replace what `get_order_status` returns for an order.
    pub fn set_order_status(&self, report: OrderStatusReport) {
        let mut state = self.state.lock();
        let id = report.order_id.clone();
        state.orders.insert(id, PaperOrder { report, polls: u32::MAX });
    }

    /// Fail the next calls with the given errors, in order.
    pub fn inject_failures(&self, errors: impl IntoIterator<Item = ExchangeError>) {
        self.state.lock().failures.extend(errors);
    }

    fn take_failure(&self) -> Result<(), ExchangeError> {
        match self.state.lock().failures.pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn mark_price(&self, ticker: &str) -> Result<Decimal, ExchangeError> {
        if let Some(price) = self.state.lock().marks.get(ticker) {
            return Ok(*price);
        }
        if split_ticker(ticker).is_none() {
            return Err(ExchangeError::UnknownTicker(ticker.to_string()));
        }
        let bar = synthetic_bars(ticker, Interval::Minute1, 1, Utc::now().timestamp_millis());
        bar.last()
            .and_then(|b| Decimal::from_f64(b.close))
            .ok_or_else(|| ExchangeError::EmptyResponse(ticker.to_string()))
    }

    fn store_order(&self, handle: &OrderHandle, fill: TradeFill) {
        let report = OrderStatusReport {
            order_id: handle.order_id.clone(),
            state: ExternalOrderState::Done,
            avg_price: Some(fill.price),
            executed_volume: Some(fill.volume),
            paid_fee: Some(fill.fee),
            trades: vec![fill],
        };
        self.state.lock().orders.insert(
            handle.order_id.clone(),
            PaperOrder { report, polls: 0 },
        );
    }

    fn handle_for(&self, ticker: &str, side: Side, fill: &TradeFill) -> OrderHandle {
        let settled = self.config.settlement == Settlement::Immediate;
        OrderHandle {
            order_id: Uuid::new_v4().to_string(),
            ticker: ticker.to_string(),
            side,
            state: if settled { OrderState::Filled } else { OrderState::Requested },
            avg_price: settled.then_some(fill.price),
            executed_volume: if settled { fill.volume } else { Decimal::ZERO },
            paid_fee: if settled { fill.fee } else { Decimal::ZERO },
            created_at: Utc::now(),
        }
    }
}

impl Default for PaperExchange {
    fn default() -> Self {
        Self::new(PaperConfig::default())
    }
}

#[async_trait]
impl ExchangeClient for PaperExchange {
    async fn fetch_bars(
        &self,
        ticker: &str,
        interval: Interval,
        count: usize,
    ) -> Result<Vec<Bar>, ExchangeError> {
        self.take_failure()?;
        let count = count.min(MAX_FETCH_COUNT);

        let mut state = self.state.lock();
        let bars = if let Some(replay) = state.replays.get_mut(ticker) {
            let end = replay.cursor;
            let start = end.saturating_sub(count);
            let window = replay.bars[start..end].to_vec();
            replay.cursor = (replay.cursor + 1).min(replay.bars.len());
            window
        } else {
            if split_ticker(ticker).is_none() {
                return Err(ExchangeError::UnknownTicker(ticker.to_string()));
            }
            synthetic_bars(ticker, interval, count, Utc::now().timestamp_millis())
        };

        let Some(last) = bars.last() else {
            return Err(ExchangeError::EmptyResponse(ticker.to_string()));
        };
        if let Some(price) = Decimal::from_f64(last.close) {
            state.marks.insert(ticker.to_string(), price);
        }
        debug!(ticker, %interval, count = bars.len(), "Paper bars fetched");
        Ok(bars)
    }

    async fn place_market_buy(
        &self,
        ticker: &str,
        quote_amount: Decimal,
    ) -> Result<OrderHandle, ExchangeError> {
        self.take_failure()?;
        let (quote, base) =
            split_ticker(ticker).ok_or_else(|| ExchangeError::UnknownTicker(ticker.to_string()))?;
        if quote_amount <= Decimal::ZERO {
            return Err(ExchangeError::OrderRejected(format!(
                "buy amount must be positive, got {}",
                quote_amount
            )));
        }
        let price = self.mark_price(ticker)?;
        let fee_ratio = self.config.fee_ratio;
        let volume = (quote_amount / (price * (Decimal::ONE + fee_ratio))).round_dp(8);
        let fee = (volume * price * fee_ratio).round_dp(8);
        let fill = TradeFill {
            price,
            volume,
            funds: volume * price,
            fee,
        };

        {
            let mut state = self.state.lock();
            let available = state.balances.get(quote).copied().unwrap_or(Decimal::ZERO);
            if available < quote_amount {
                return Err(ExchangeError::InsufficientFunds {
                    required: quote_amount,
                    available,
                });
            }
            state.balances.insert(quote.to_string(), available - quote_amount);
            *state.balances.entry(base.to_string()).or_insert(Decimal::ZERO) += volume;
        }

        let handle = self.handle_for(ticker, Side::Buy, &fill);
        self.store_order(&handle, fill);
        info!(ticker, order_id = %handle.order_id, %price, %volume, "Paper market buy");
        Ok(handle)
    }

    async fn place_market_sell(
        &self,
        ticker: &str,
        base_quantity: Decimal,
    ) -> Result<OrderHandle, ExchangeError> {
        self.take_failure()?;
        let (quote, base) =
            split_ticker(ticker).ok_or_else(|| ExchangeError::UnknownTicker(ticker.to_string()))?;
        if base_quantity <= Decimal::ZERO {
            return Err(ExchangeError::OrderRejected(format!(
                "sell quantity must be positive, got {}",
                base_quantity
            )));
        }
        let price = self.mark_price(ticker)?;
        let funds = base_quantity * price;
        let fee = (funds * self.config.fee_ratio).round_dp(8);
        let fill = TradeFill {
            price,
            volume: base_quantity,
            funds,
            fee,
        };

        {
            let mut state = self.state.lock();
            let held = state.balances.get(base).copied().unwrap_or(Decimal::ZERO);
            if held < base_quantity {
                return Err(ExchangeError::InsufficientFunds {
                    required: base_quantity,
                    available: held,
                });
            }
            state.balances.insert(base.to_string(), held - base_quantity);
            *state.balances.entry(quote.to_string()).or_insert(Decimal::ZERO) += funds - fee;
        }

        let handle = self.handle_for(ticker, Side::Sell, &fill);
        self.store_order(&handle, fill);
        info!(ticker, order_id = %handle.order_id, %price, volume = %base_quantity, "Paper market sell");
        Ok(handle)
    }

    async fn get_order_status(&self, order_id: &str) -> Result<OrderStatusReport, ExchangeError> {
        self.take_failure()?;
        let deferred = self.config.settlement == Settlement::Deferred;
        let mut state = self.state.lock();
        let order = state
            .orders
            .get_mut(order_id)
            .ok_or_else(|| ExchangeError::OrderNotFound(order_id.to_string()))?;

        let first_poll = order.polls == 0;
        order.polls = order.polls.saturating_add(1);
        if deferred && first_poll {
            return Ok(OrderStatusReport {
                order_id: order_id.to_string(),
                state: ExternalOrderState::Wait,
                avg_price: None,
                executed_volume: Some(Decimal::ZERO),
                paid_fee: Some(Decimal::ZERO),
                trades: Vec::new(),
            });
        }
        Ok(order.report.clone())
    }

    async fn get_balance(&self, currency: &str) -> Result<Decimal, ExchangeError> {
        self.take_failure()?;
        Ok(self
            .state
            .lock()
            .balances
            .get(currency)
            .copied()
            .unwrap_or(Decimal::ZERO))
    }

    fn name(&self) -> &str {
        "Paper Exchange"
    }
}

/// Deterministic bar series ending with the bar that contains `now_ms`.
///
/// Prices depend only on the ticker and the bar timestamp, so overlapping
/// fetches agree. The last bar is still forming.
pub fn synthetic_bars(ticker: &str, interval: Interval, count: usize, now_ms: i64) -> Vec<Bar> {
    let step = interval.as_millis();
    let current_open = now_ms - now_ms.rem_euclid(step);
    let base = 1000.0 + (ticker.bytes().map(u64::from).sum::<u64>() % 9000) as f64;

    let price_at = |ts: i64| {
        let k = (ts / step) as f64;
        base * (1.0 + 0.02 * (k / 17.0).sin() + 0.008 * (k / 5.0).sin())
    };

    (0..count)
        .map(|i| {
            let ts = current_open - (count - 1 - i) as i64 * step;
            let open = price_at(ts - step);
            let close = price_at(ts);
            let high = open.max(close) * 1.001;
            let low = open.min(close) * 0.999;
            let volume = 1.0 + (ts / step).rem_euclid(7) as f64;
            if ts == current_open {
                Bar::forming(ts, open, high, low, close, volume)
            } else {
                Bar::new(ts, open, high, low, close, volume)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exchange(settlement: Settlement) -> PaperExchange {
        let ex = PaperExchange::new(PaperConfig {
            settlement,
            ..Default::default()
        });
        ex.set_mark_price("KRW-BTC", dec!(100));
        ex
    }

    #[tokio::test]
    async fn test_market_buy_applies_fee_to_quantity() {
        let ex = exchange(Settlement::Immediate);
        let handle = ex.place_market_buy("KRW-BTC", dec!(10050)).await.unwrap();

        assert!(handle.is_settled());
        assert_eq!(handle.avg_price, Some(dec!(100)));
        // 10050 / (100 * 1.0005) = 100.4497...
        assert_eq!(handle.executed_volume, dec!(100.44977511));
        assert_eq!(ex.get_balance("KRW").await.unwrap(), dec!(989950));
        assert_eq!(ex.get_balance("BTC").await.unwrap(), handle.executed_volume);
    }

    #[tokio::test]
    async fn test_sell_requires_holdings() {
        let ex = exchange(Settlement::Immediate);
        let err = ex.place_market_sell("KRW-BTC", dec!(1)).await.unwrap_err();
        assert!(matches!(err, ExchangeError::InsufficientFunds { .. }));

        ex.set_balance("BTC", dec!(2));
        let handle = ex.place_market_sell("KRW-BTC", dec!(2)).await.unwrap();
        assert_eq!(handle.state, OrderState::Filled);
        assert_eq!(ex.get_balance("BTC").await.unwrap(), Decimal::ZERO);
        // 200 proceeds minus 0.1 fee
        assert_eq!(ex.get_balance("KRW").await.unwrap(), dec!(1000199.9));
    }

    #[tokio::test]
    async fn test_deferred_settlement_reports_wait_first() {
        let ex = exchange(Settlement::Deferred);
        let handle = ex.place_market_buy("KRW-BTC", dec!(1000)).await.unwrap();
        assert!(!handle.is_settled());
        assert_eq!(handle.state, OrderState::Requested);

        let first = ex.get_order_status(&handle.order_id).await.unwrap();
        assert_eq!(first.state, ExternalOrderState::Wait);
        assert_eq!(first.internal_state(), OrderState::Requested);

        let second = ex.get_order_status(&handle.order_id).await.unwrap();
        assert_eq!(second.internal_state(), OrderState::Filled);
        assert_eq!(second.fill_summary().avg_price, Some(dec!(100)));
    }

    #[tokio::test]
    async fn test_replay_reveals_one_bar_per_fetch() {
        let ex = PaperExchange::default();
        let bars: Vec<Bar> = (0..5).map(|i| Bar::flat(i * 60_000, 100.0 + i as f64)).collect();
        ex.replay_bars("KRW-ETH", bars, 3);

        let first = ex.fetch_bars("KRW-ETH", Interval::Minute1, 200).await.unwrap();
        assert_eq!(first.len(), 3);
        let second = ex.fetch_bars("KRW-ETH", Interval::Minute1, 2).await.unwrap();
        assert_eq!(second.len(), 2);
        assert_eq!(second[1].close, 103.0);
    }

    #[tokio::test]
    async fn test_injected_failures_are_consumed_in_order() {
        let ex = exchange(Settlement::Immediate);
        ex.inject_failures([ExchangeError::Timeout(100)]);
        assert!(ex.get_balance("KRW").await.is_err());
        assert!(ex.get_balance("KRW").await.is_ok());
    }

    #[tokio::test]
    async fn test_unknown_order_and_ticker() {
        let ex = PaperExchange::default();
        assert!(matches!(
            ex.get_order_status("missing").await,
            Err(ExchangeError::OrderNotFound(_))
        ));
        assert!(matches!(
            ex.fetch_bars("BTC", Interval::Minute1, 10).await,
            Err(ExchangeError::UnknownTicker(_))
        ));
    }

    #[test]
    fn test_synthetic_bars_are_aligned_and_stable() {
        let now = 1_700_000_123_456;
        let a = synthetic_bars("KRW-BTC", Interval::Minute5, 10, now);
        let b = synthetic_bars("KRW-BTC", Interval::Minute5, 3, now);
        assert_eq!(a.len(), 10);
        assert!(!a[9].is_closed);
        assert!(a[8].is_closed);
        assert_eq!(a[9].timestamp % Interval::Minute5.as_millis(), 0);
        assert_eq!(a[9], b[2]);
        assert!(a.windows(2).all(|w| w[1].timestamp - w[0].timestamp == 300_000));
    }
}
