//! Core data types for the trading engine.

mod action;
mod interval;
mod mode;
mod ohlcv;
mod order;
mod position;
mod snapshot;

pub use action::{Action, Decision, RuleCheck};
pub use interval::Interval;
pub use mode::ExecutionMode;
pub use ohlcv::Bar;
pub use order::{
    ExternalOrderState, FillSummary, OrderHandle, OrderState, OrderStatusReport, PendingOrder,
    Side, TradeFill, TradeRecord,
};
pub use position::PositionState;
pub use snapshot::{dead_cross, golden_cross, IndicatorSnapshot};
