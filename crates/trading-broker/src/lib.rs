//! Exchange client implementations.
//!
//! - [`PaperExchange`]: in-process exchange used in TEST mode
//! - [`RetryingExchange`]: bounded exponential-backoff decorator for any client

mod paper;
mod retry;

pub use paper::{synthetic_bars, PaperConfig, PaperExchange, Settlement, MAX_FETCH_COUNT};
pub use retry::{RetryPolicy, RetryingExchange};
