//! Collaborator traits of the trading engine.

mod exchange;
mod indicator;
mod persistence;
mod strategy;

pub use exchange::{split_ticker, ExchangeClient};
pub use indicator::{Indicator, StreamingIndicator};
pub use persistence::{AccountLedger, AuditSink, BarEvaluation, OrderLedger, Store};
pub use strategy::{BarContext, StrategyConfig, StrategyDecisionCore};
