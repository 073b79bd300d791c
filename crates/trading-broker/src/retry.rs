//! Bounded retry with exponential backoff around any exchange client.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{error, warn};
use trading_core::error::ExchangeError;
use trading_core::traits::ExchangeClient;
use trading_core::types::{Bar, Interval, OrderHandle, OrderStatusReport};

/// Retry settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 1000,
            backoff_multiplier: 2.0,
            max_delay_ms: 30_000,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = self.backoff_multiplier.powi(retry.saturating_sub(1) as i32);
        let ms = (self.initial_delay_ms as f64 * factor) as u64;
        Duration::from_millis(ms.min(self.max_delay_ms))
    }
}

/// Which failures an operation may retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Idempotency {
    /// Reads: retry every transient failure
    Safe,
    /// Order placement: retry only failures that never reached the book
    Placement,
}

impl Idempotency {
    fn should_retry(self, err: &ExchangeError) -> bool {
        match self {
            Idempotency::Safe => err.is_transient(),
            Idempotency::Placement => matches!(
                err,
                ExchangeError::Connection(_) | ExchangeError::RateLimited { .. }
            ),
        }
    }
}

/// Wrapper that retries transient failures of the inner client.
pub struct RetryingExchange<E> {
    inner: E,
    policy: RetryPolicy,
}

impl<E: ExchangeClient> RetryingExchange<E> {
    pub fn new(inner: E, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &E {
        &self.inner
    }

    async fn run<T, F, Fut>(&self, op: &str, idempotency: Idempotency, mut call: F) -> Result<T, ExchangeError>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<T, ExchangeError>> + Send,
        T: Send,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(e) if !idempotency.should_retry(&e) => return Err(e),
                Err(e) if attempt >= max_attempts => {
                    error!(op, attempts = attempt, error = %e, "Exchange call failed, retries exhausted");
                    return Err(ExchangeError::RetriesExhausted {
                        attempts: attempt,
                        last: Box::new(e),
                    });
                }
                Err(e) => {
                    let mut delay = self.policy.delay_for(attempt);
                    if let ExchangeError::RateLimited { retry_after_secs } = &e {
                        delay = delay.max(Duration::from_secs(*retry_after_secs));
                    }
                    warn!(op, attempt, delay_ms = delay.as_millis() as u64, error = %e, "Exchange call failed, retrying");
                    sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[async_trait]
impl<E: ExchangeClient> ExchangeClient for RetryingExchange<E> {
    async fn fetch_bars(
        &self,
        ticker: &str,
        interval: Interval,
        count: usize,
    ) -> Result<Vec<Bar>, ExchangeError> {
        self.run("fetch_bars", Idempotency::Safe, || {
            self.inner.fetch_bars(ticker, interval, count)
        })
        .await
    }

    async fn place_market_buy(
        &self,
        ticker: &str,
        quote_amount: Decimal,
    ) -> Result<OrderHandle, ExchangeError> {
        self.run("place_market_buy", Idempotency::Placement, || {
            self.inner.place_market_buy(ticker, quote_amount)
        })
        .await
    }

    async fn place_market_sell(
        &self,
        ticker: &str,
        base_quantity: Decimal,
    ) -> Result<OrderHandle, ExchangeError> {
        self.run("place_market_sell", Idempotency::Placement, || {
            self.inner.place_market_sell(ticker, base_quantity)
        })
        .await
    }

    async fn get_order_status(&self, order_id: &str) -> Result<OrderStatusReport, ExchangeError> {
        self.run("get_order_status", Idempotency::Safe, || {
            self.inner.get_order_status(order_id)
        })
        .await
    }

    async fn get_balance(&self, currency: &str) -> Result<Decimal, ExchangeError> {
        self.run("get_balance", Idempotency::Safe, || self.inner.get_balance(currency))
            .await
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}
