//! Event channel consumer that turns engine events into log lines.

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::broadcast::Receiver;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use trading_engine::{EngineEvent, EventLevel};

/// What a drain saw before the channel closed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventStats {
    pub logs: u64,
    pub trades: u64,
    pub exceptions: u64,
    pub status_changes: u64,
    /// Events lost because the drain fell behind
    pub dropped: u64,
}

/// Log every event until all publishers are gone.
pub fn spawn_event_logger(mut rx: Receiver<EngineEvent>) -> JoinHandle<EventStats> {
    tokio::spawn(async move {
        let mut stats = EventStats::default();
        loop {
            match rx.recv().await {
                Ok(event) => record(&event, &mut stats),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event drain lagging; oldest events dropped");
                    stats.dropped += skipped;
                }
                Err(RecvError::Closed) => break,
            }
        }
        debug!(?stats, "Event drain closed");
        stats
    })
}

fn record(event: &EngineEvent, stats: &mut EventStats) {
    match event {
        EngineEvent::Log { user_id, level, message } => {
            stats.logs += 1;
            match level {
                EventLevel::Info => debug!(%user_id, %message, "engine"),
                EventLevel::Warn => warn!(%user_id, %message, "engine"),
                EventLevel::Error => error!(%user_id, %message, "engine"),
            }
        }
        EngineEvent::Trade(trade) => {
            stats.trades += 1;
            info!(
                user_id = %trade.user_id,
                ticker = %trade.ticker,
                side = %trade.side,
                price = %trade.price,
                quantity = %trade.quantity,
                reason = ?trade.reason,
                "Trade"
            );
        }
        EngineEvent::Exception { user_id, message, critical } => {
            stats.exceptions += 1;
            if *critical {
                error!(%user_id, %message, "CRITICAL engine exception");
            } else {
                warn!(%user_id, %message, "Engine exception");
            }
        }
        EngineEvent::Status { user_id, status } => {
            stats.status_changes += 1;
            info!(%user_id, %status, "Engine status");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use trading_core::types::{ExecutionMode, Side, TradeRecord};
    use trading_engine::{EngineStatus, EventBus};

    #[tokio::test]
    async fn test_counts_until_closed() {
        let bus = EventBus::new(16);
        let drain = spawn_event_logger(bus.subscribe());

        bus.publish(EngineEvent::log("alice", EventLevel::Info, "bar 1 HOLD"));
        bus.publish(EngineEvent::status("alice", EngineStatus::Running));
        bus.publish(EngineEvent::Trade(TradeRecord {
            user_id: "alice".into(),
            ticker: "KRW-BTC".into(),
            side: Side::Buy,
            order_id: "o-1".into(),
            price: dec!(100),
            quantity: dec!(1),
            fee: dec!(0.05),
            reason: Some("GOLDEN_CROSS".into()),
            bar_index: Some(1),
            mode: ExecutionMode::Test,
            timestamp: Utc::now(),
        }));
        bus.publish(EngineEvent::Exception {
            user_id: "alice".into(),
            message: "boom".into(),
            critical: true,
        });
        drop(bus);

        let stats = drain.await.unwrap();
        assert_eq!(
            stats,
            EventStats {
                logs: 1,
                trades: 1,
                exceptions: 1,
                status_changes: 1,
                dropped: 0,
            }
        );
    }
}
