//! Error types for the trading engine.

use thiserror::Error;

/// Top-level trading engine error.
#[derive(Error, Debug)]
pub enum TradingError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Strategy error: {0}")]
    Strategy(#[from] StrategyError),

    #[error("Exchange error: {0}")]
    Exchange(#[from] ExchangeError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Indicator error: {0}")]
    Indicator(#[from] IndicatorError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Strategy-specific errors.
#[derive(Error, Debug)]
pub enum StrategyError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Strategy not found: {0}")]
    NotFound(String),
}

/// Errors surfaced by an exchange client.
#[derive(Error, Debug, Clone)]
pub enum ExchangeError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Request timed out after {0} ms")]
    Timeout(u64),

    #[error("Empty response for {0}")]
    EmptyResponse(String),

    #[error("Rate limited: retry after {retry_after_secs} seconds")]
    RateLimited { retry_after_secs: u64 },

    #[error("Order rejected: {0}")]
    OrderRejected(String),

    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds {
        required: rust_decimal::Decimal,
        available: rust_decimal::Decimal,
    },

    #[error("Order not found: {0}")]
    OrderNotFound(String),

    #[error("Unknown ticker: {0}")]
    UnknownTicker(String),

    #[error("Retries exhausted after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: Box<ExchangeError> },
}

impl ExchangeError {
    /// Whether the failure is worth retrying (timeouts, empty responses, throttling).
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ExchangeError::Connection(_)
                | ExchangeError::Timeout(_)
                | ExchangeError::EmptyResponse(_)
                | ExchangeError::RateLimited { .. }
        )
    }
}

/// Persistence collaborator errors.
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Indicator state errors.
#[derive(Error, Debug, PartialEq)]
pub enum IndicatorError {
    #[error("Insufficient data: need {required} closes, have {available}")]
    InsufficientData { required: usize, available: usize },

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

/// Result type alias for trading operations.
pub type TradingResult<T> = Result<T, TradingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(ExchangeError::Timeout(500).is_transient());
        assert!(ExchangeError::EmptyResponse("KRW-BTC".into()).is_transient());
        assert!(ExchangeError::RateLimited { retry_after_secs: 1 }.is_transient());
        assert!(!ExchangeError::OrderRejected("min notional".into()).is_transient());
        assert!(!ExchangeError::OrderNotFound("abc".into()).is_transient());
    }

    #[test]
    fn test_error_conversion() {
        let err: TradingError = ExchangeError::Timeout(10).into();
        assert!(matches!(err, TradingError::Exchange(_)));
    }
}
