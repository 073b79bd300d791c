//! Trading strategy implementations.
//!
//! Two decision cores share the same bar contract:
//! - MACD Cross: golden-cross entries, SL/TP/trailing/dead-cross exits
//! - EMA Cross: EMA cross or base-EMA pullback entries, plus stale-position exits
//!
//! Per-rule enable flags live in [`conditions`].

pub mod conditions;
mod ema_cross;
mod holding;
mod macd_cross;
mod registry;

pub use conditions::{
    Conditions, EmaBuyConditions, EmaConditions, EmaSellConditions, MacdBuyConditions, MacdConditions,
    MacdSellConditions,
};
pub use ema_cross::{EmaCrossConfig, EmaCrossStrategy};
pub use holding::HoldingPolicy;
pub use macd_cross::{MacdCrossConfig, MacdCrossStrategy};
pub use registry::{BuiltStrategy, StrategyInfo, StrategyKind, StrategyRegistry};
