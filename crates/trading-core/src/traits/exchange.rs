//! Exchange client trait definition.

use crate::error::ExchangeError;
use crate::types::{Bar, Interval, OrderHandle, OrderStatusReport};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;

/// Capability interface of a spot exchange.
///
/// Implementations are expected to apply their own bounded retry before
/// surfacing a failure; callers treat every error as final for this attempt.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// Fetch the most recent bars, oldest first.
    ///
    /// # Arguments
    /// * `ticker` - Market code, e.g. `KRW-BTC`
    /// * `interval` - Bar interval
    /// * `count` - Number of bars requested (capped by the exchange)
    async fn fetch_bars(
        &self,
        ticker: &str,
        interval: Interval,
        count: usize,
    ) -> Result<Vec<Bar>, ExchangeError>;

    /// Place a market buy spending `quote_amount` of the quote currency.
    async fn place_market_buy(
        &self,
        ticker: &str,
        quote_amount: Decimal,
    ) -> Result<OrderHandle, ExchangeError>;

    /// Place a market sell of `base_quantity` units.
    async fn place_market_sell(
        &self,
        ticker: &str,
        base_quantity: Decimal,
    ) -> Result<OrderHandle, ExchangeError>;

    /// Get the current status of an order.
    async fn get_order_status(&self, order_id: &str) -> Result<OrderStatusReport, ExchangeError>;

    /// Get the free balance of a currency (`KRW`, `BTC`, ...).
    async fn get_balance(&self, currency: &str) -> Result<Decimal, ExchangeError>;

    /// Name of the exchange, for logs.
    fn name(&self) -> &str;
}

#[async_trait]
impl<T: ExchangeClient + ?Sized> ExchangeClient for Arc<T> {
    async fn fetch_bars(
        &self,
        ticker: &str,
        interval: Interval,
        count: usize,
    ) -> Result<Vec<Bar>, ExchangeError> {
        (**self).fetch_bars(ticker, interval, count).await
    }

    async fn place_market_buy(
        &self,
        ticker: &str,
        quote_amount: Decimal,
    ) -> Result<OrderHandle, ExchangeError> {
        (**self).place_market_buy(ticker, quote_amount).await
    }

    async fn place_market_sell(
        &self,
        ticker: &str,
        base_quantity: Decimal,
    ) -> Result<OrderHandle, ExchangeError> {
        (**self).place_market_sell(ticker, base_quantity).await
    }

    async fn get_order_status(&self, order_id: &str) -> Result<OrderStatusReport, ExchangeError> {
        (**self).get_order_status(order_id).await
    }

    async fn get_balance(&self, currency: &str) -> Result<Decimal, ExchangeError> {
        (**self).get_balance(currency).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Split a market code into `(quote, base)`, e.g. `KRW-BTC` -> `("KRW", "BTC")`.
pub fn split_ticker(ticker: &str) -> Option<(&str, &str)> {
    let (quote, base) = ticker.split_once('-')?;
    if quote.is_empty() || base.is_empty() {
        return None;
    }
    Some((quote, base))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_ticker() {
        assert_eq!(split_ticker("KRW-BTC"), Some(("KRW", "BTC")));
        assert_eq!(split_ticker("KRW-"), None);
        assert_eq!(split_ticker("BTC"), None);
    }
}
