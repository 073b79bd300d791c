//! Engine worker errors.
//!
//! Anything returned from a worker as [`EngineError`] counts as an unhandled
//! fault and goes through the restart policy.

use thiserror::Error;
use trading_core::error::{ExchangeError, IndicatorError, PersistenceError, StrategyError};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Exchange error: {0}")]
    Exchange(#[from] ExchangeError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Indicator error: {0}")]
    Indicator(#[from] IndicatorError),

    #[error("Strategy error: {0}")]
    Strategy(#[from] StrategyError),

    #[error("Invalid engine spec: {0}")]
    InvalidSpec(String),

    #[error("Engine worker panicked: {0}")]
    Panicked(String),
}
