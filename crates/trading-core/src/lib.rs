//! Core types and traits for the trading engine.
//!
//! This crate provides the foundational building blocks including:
//! - Market data types (Bar, Interval) and the indicator snapshot
//! - The per-user position state machine
//! - Order, fill and settlement types
//! - Collaborator traits for exchanges, persistence and decision cores

pub mod error;
pub mod traits;
pub mod types;

pub use error::{
    ExchangeError, IndicatorError, PersistenceError, StrategyError, TradingError, TradingResult,
};
pub use traits::*;
pub use types::*;
