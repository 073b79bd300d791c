//! Incremental technical indicators.
//!
//! This crate provides:
//! - A bounded bar buffer with a duplicate-timestamp guard
//! - Incrementally maintained EMA/MACD/MA state with cross detection inputs
//! - Batch EMA/MACD reference implementations

pub mod buffer;
pub mod momentum;
pub mod moving_average;
pub mod state;

pub use buffer::{AppendOutcome, BarBuffer, DEFAULT_BUFFER_CAPACITY};
pub use momentum::{Macd, MacdOutput};
pub use moving_average::{ema_alpha, Ema, IncrementalEma, RollingSma};
pub use state::{IndicatorConfig, IndicatorState, SeparateEmaPeriods};
pub use trading_core::{dead_cross, golden_cross, IndicatorSnapshot};
