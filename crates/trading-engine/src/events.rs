//! Outbound engine events.
//!
//! Events go out on a bounded broadcast channel. Publishing never blocks and
//! works with no subscriber attached; a subscriber that falls behind loses
//! the oldest events first.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;
use trading_core::types::TradeRecord;

pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Lifecycle state of one user's engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EngineStatus {
    Starting,
    Running,
    /// Waiting to restart after failure number `attempt`
    Restarting { attempt: u32 },
    Stopped,
    /// Restarts exhausted; needs an operator
    Failed { reason: String },
}

impl EngineStatus {
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            EngineStatus::Starting | EngineStatus::Running | EngineStatus::Restarting { .. }
        )
    }
}

impl fmt::Display for EngineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineStatus::Starting => write!(f, "STARTING"),
            EngineStatus::Running => write!(f, "RUNNING"),
            EngineStatus::Restarting { attempt } => write!(f, "RESTARTING({})", attempt),
            EngineStatus::Stopped => write!(f, "STOPPED"),
            EngineStatus::Failed { reason } => write!(f, "FAILED: {}", reason),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventLevel {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EngineEvent {
    Log {
        user_id: String,
        level: EventLevel,
        message: String,
    },
    Trade(TradeRecord),
    Exception {
        user_id: String,
        message: String,
        /// Restarts exhausted
        critical: bool,
    },
    Status {
        user_id: String,
        status: EngineStatus,
    },
}

impl EngineEvent {
    pub fn log(user_id: &str, level: EventLevel, message: impl Into<String>) -> Self {
        EngineEvent::Log {
            user_id: user_id.to_string(),
            level,
            message: message.into(),
        }
    }

    pub fn status(user_id: &str, status: EngineStatus) -> Self {
        EngineEvent::Status {
            user_id: user_id.to_string(),
            status,
        }
    }

    pub fn user_id(&self) -> &str {
        match self {
            EngineEvent::Log { user_id, .. }
            | EngineEvent::Exception { user_id, .. }
            | EngineEvent::Status { user_id, .. } => user_id,
            EngineEvent::Trade(trade) => &trade.user_id,
        }
    }
}

/// Cloneable publisher side of the event channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish an event; dropped silently when nobody listens.
    pub fn publish(&self, event: EngineEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}
