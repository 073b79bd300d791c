//! Policy filter chains for entries and exits.
//!
//! Provides the filter contract, ordered entry/exit chains and the concrete
//! stop-loss, take-profit, trailing-stop, dead-cross, surge and staleness rules.

mod chain;
mod filter;
mod filters;

pub use chain::FilterChain;
pub use filter::{Filter, FilterCategory, FilterContext, FilterResult, PositionView};
pub use filters::{
    CrossSource, DeadCrossFilter, SlowEmaSurgeFilter, StalePositionFilter, StopLossFilter,
    TakeProfitFilter, TrailingStopFilter,
};
