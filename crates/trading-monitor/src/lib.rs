//! Logging setup and engine event consumers.

mod drain;
mod logging;

pub use drain::{spawn_event_logger, EventStats};
pub use logging::setup_logging;
